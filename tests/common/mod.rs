//! Shared harness for election integration tests.
//!
//! Contenders run real electors against an [`InMemoryRecordStore`] under a
//! paused tokio runtime, so every timing below is virtual and deterministic
//! up to poll jitter.

#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;
use shardlease_election::ElectionCallbacks;
use shardlease_election::ElectionConfig;
use shardlease_election::ElectionError;
use shardlease_election::LeaderElector;
use shardlease_election::LeaseRecord;
use shardlease_election::LocalElectionState;
use shardlease_store::InMemoryRecordStore;
use shardlease_store::StoreOp;
use shardlease_time::Clock;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Timings used by most scenarios: 1s lease, 600ms deadline, 200ms polls.
pub fn fast_config() -> ElectionConfig {
    ElectionConfig::new(1000, 600, 200)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Start,
    Stop,
}

/// One callback, stamped with the clock reading at delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub at_ms: u64,
    pub transition: Transition,
    pub term: u64,
}

/// Callbacks that remember every transition.
pub struct Recorder {
    clock: Arc<dyn Clock>,
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn transitions(&self) -> Vec<(Transition, u64)> {
        self.events().into_iter().map(|e| (e.transition, e.term)).collect()
    }

    pub fn count(&self, transition: Transition) -> usize {
        self.events().iter().filter(|e| e.transition == transition).count()
    }

    /// Leadership intervals as half-open `[start, stop)` ranges. An interval
    /// still open is closed at `end_ms`.
    pub fn intervals(&self, end_ms: u64) -> Vec<(u64, u64)> {
        let mut out = Vec::new();
        let mut open = None;
        for event in self.events() {
            match event.transition {
                Transition::Start => open = Some(event.at_ms),
                Transition::Stop => {
                    if let Some(start) = open.take() {
                        out.push((start, event.at_ms));
                    }
                }
            }
        }
        if let Some(start) = open {
            out.push((start, end_ms));
        }
        out
    }

    fn push(&self, transition: Transition, term: u64) {
        let at_ms = self.clock.now_ms();
        self.events.lock().push(Event { at_ms, transition, term });
    }
}

impl ElectionCallbacks for Recorder {
    fn on_start(&self, term: u64) {
        self.push(Transition::Start, term);
    }

    fn on_stop(&self, term: u64) {
        self.push(Transition::Stop, term);
    }
}

/// A running elector and the handles to observe and stop it.
pub struct Contender {
    pub identity: String,
    pub recorder: Arc<Recorder>,
    pub state: watch::Receiver<LocalElectionState>,
    pub cancel: CancellationToken,
    pub task: JoinHandle<Result<(), ElectionError>>,
}

impl Contender {
    pub fn spawn(
        store: &InMemoryRecordStore,
        clock: &Arc<dyn Clock>,
        lease_id: &str,
        identity: &str,
        config: ElectionConfig,
    ) -> Self {
        let elector = LeaderElector::new(Arc::new(store.client(identity)), clock.clone(), lease_id, identity, config);
        let state = elector.subscribe();
        let recorder = Arc::new(Recorder::new(clock.clone()));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(elector.run(recorder.clone(), cancel.clone()));
        Self {
            identity: identity.to_string(),
            recorder,
            state,
            cancel,
            task,
        }
    }

    pub fn is_leading(&self) -> bool {
        self.state.borrow().is_leading_locally
    }

    /// Cancel and wait for the elector to finish.
    pub async fn stop(self) -> Arc<Recorder> {
        self.cancel.cancel();
        self.task.await.expect("elector task panicked").expect("elector returned an error");
        self.recorder
    }
}

/// Decoded current record for `lease_id`.
pub fn current_record(store: &InMemoryRecordStore, lease_id: &str) -> LeaseRecord {
    let stored = store.peek(lease_id).expect("lease record exists");
    LeaseRecord::decode(lease_id, &stored.value).expect("lease record decodes")
}

/// Every lease record written by `client`'s conditional updates, in order.
pub fn conditional_writes_by(store: &InMemoryRecordStore, lease_id: &str, client: &str) -> Vec<LeaseRecord> {
    store
        .history()
        .into_iter()
        .filter(|w| w.id == lease_id && w.client == client && w.op == StoreOp::CompareAndSwap)
        .map(|w| LeaseRecord::decode(lease_id, &w.value).expect("written record decodes"))
        .collect()
}

/// Every lease record ever written for `lease_id`, in apply order.
pub fn all_writes(store: &InMemoryRecordStore, lease_id: &str) -> Vec<LeaseRecord> {
    store
        .history()
        .into_iter()
        .filter(|w| w.id == lease_id)
        .map(|w| LeaseRecord::decode(lease_id, &w.value).expect("written record decodes"))
        .collect()
}

/// Whether any two intervals from different contenders overlap.
pub fn overlapping(intervals: &[(String, u64, u64)]) -> Option<((String, u64, u64), (String, u64, u64))> {
    for (i, a) in intervals.iter().enumerate() {
        for b in &intervals[i + 1..] {
            if a.0 != b.0 && a.1 < b.2 && b.1 < a.2 {
                return Some((a.clone(), b.clone()));
            }
        }
    }
    None
}

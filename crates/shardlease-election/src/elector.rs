//! Single-lease leader elector.
//!
//! One elector owns exactly one lease id and runs the acquire, renew and
//! release protocol against its record until cancelled.
//!
//! # Safety argument
//!
//! - Leadership is only ever granted by a successful conditional write, so
//!   the store's compare-and-swap is the sole tie-breaker.
//! - A challenger only contends once its own clock shows `lease_duration_ms`
//!   since it first saw the holder's latest version.
//! - The holder steps down once `renew_deadline_ms` has passed since the start
//!   of its last successful renewal. Since `renew_deadline_ms` is smaller,
//!   the holder has stopped before any challenger can have started.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use shardlease_store::StoreError;
use shardlease_store::VersionedRecordStore;
use shardlease_time::Clock;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::config::ElectionConfig;
use crate::config::validate_name;
use crate::error::ElectionError;
use crate::lease_store::LeaseStore;
use crate::pure::BackoffResult;
use crate::pure::ObservationDecision;
use crate::pure::compute_backoff_with_jitter;
use crate::pure::compute_poll_delay_ms;
use crate::pure::compute_renew_budget_ms;
use crate::pure::decide_observation;
use crate::pure::is_renew_deadline_exceeded;
use crate::record::LeaseRecord;
use crate::record::ObservedLease;
use crate::sink::ElectionCallbacks;
use crate::state::ElectionPhase;
use crate::state::LocalElectionState;

/// Leader elector for one lease id.
///
/// # Example
///
/// ```ignore
/// let elector = LeaderElector::new(store, clock, "orders-0", "worker-a", ElectionConfig::default());
/// let mut state = elector.subscribe();
/// let cancel = CancellationToken::new();
/// tokio::spawn(elector.run(callbacks, cancel.clone()));
/// ```
pub struct LeaderElector<S: VersionedRecordStore + ?Sized + 'static> {
    leases: LeaseStore<S>,
    clock: Arc<dyn Clock>,
    lease_id: String,
    identity: String,
    config: ElectionConfig,
    state_tx: watch::Sender<LocalElectionState>,
}

/// Everything the elector remembers between steps. Lives on the elector's own
/// task only.
struct Session {
    /// Last record read or written, with its version.
    observed: Option<ObservedLease>,
    /// Local time at which `observed.version` was first seen.
    observed_at_ms: u64,
    /// Term we are leading under, if any.
    leading_term: Option<u64>,
    /// Start time of the last successful renewal (or acquisition).
    last_renew_ms: u64,
    /// Start time of the last renewal attempt.
    last_attempt_ms: u64,
    /// Current backoff base for unavailable-store retries.
    backoff_ms: u64,
    /// When the elector next acts.
    next_action_deadline_ms: u64,
}

impl Session {
    fn new(retry_period_ms: u64) -> Self {
        Self {
            observed: None,
            observed_at_ms: 0,
            leading_term: None,
            last_renew_ms: 0,
            last_attempt_ms: 0,
            backoff_ms: retry_period_ms,
            next_action_deadline_ms: 0,
        }
    }

    /// Remember a record, restarting the expiry clock only if it changed.
    fn note(&mut self, observed: ObservedLease, seen_at_ms: u64) {
        let changed = self.observed.as_ref().is_none_or(|previous| previous.version != observed.version);
        if changed {
            self.observed_at_ms = seen_at_ms;
        }
        self.observed = Some(observed);
    }
}

/// Outcome of racing a store call against cancellation.
enum Call<T> {
    Done(Result<T, ElectionError>),
    Cancelled,
}

impl<S: VersionedRecordStore + ?Sized + 'static> LeaderElector<S> {
    /// Create an elector. Configuration is checked when [`run`](Self::run) starts.
    pub fn new(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        lease_id: impl Into<String>,
        identity: impl Into<String>,
        config: ElectionConfig,
    ) -> Self {
        let lease_id = lease_id.into();
        let (state_tx, _) = watch::channel(LocalElectionState::default());
        Self {
            leases: LeaseStore::new(store, clock.clone(), lease_id.clone()),
            clock,
            lease_id,
            identity: identity.into(),
            config,
            state_tx,
        }
    }

    /// Check configuration, lease id and identity.
    pub fn validate(&self) -> Result<(), ElectionError> {
        self.config.validate()?;
        validate_name("lease id", &self.lease_id)?;
        validate_name("identity", &self.identity)
    }

    /// Watch this elector's local state.
    pub fn subscribe(&self) -> watch::Receiver<LocalElectionState> {
        self.state_tx.subscribe()
    }

    /// Lease id this elector contends for.
    pub fn lease_id(&self) -> &str {
        &self.lease_id
    }

    /// Identity written as holder.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Run the election until `cancel` fires.
    ///
    /// Returns `Misconfiguration` immediately if the settings are unsafe, and
    /// `Ok(())` after cancellation. Loss of leadership is reported through
    /// `callbacks`, never as an error.
    pub async fn run<C: ElectionCallbacks>(self, callbacks: C, cancel: CancellationToken) -> Result<(), ElectionError> {
        if let Err(e) = self.validate() {
            error!(lease_id = %self.lease_id, identity = %self.identity, error = %e, "refusing to run elector");
            self.publish(ElectionPhase::Stopped, &Session::new(self.config.retry_period_ms));
            return Err(e);
        }

        debug!(lease_id = %self.lease_id, identity = %self.identity, "elector started");
        let mut session = Session::new(self.config.retry_period_ms);
        let mut phase = ElectionPhase::Observing;

        loop {
            if cancel.is_cancelled() {
                phase = ElectionPhase::Releasing;
            }
            phase = match phase {
                ElectionPhase::Observing => self.observe(&mut session, &callbacks, &cancel).await,
                ElectionPhase::Acquiring => self.acquire(&mut session, &callbacks, &cancel).await,
                ElectionPhase::Leading => self.lead(&mut session, &cancel).await,
                ElectionPhase::Renewing => self.renew(&mut session, &callbacks, &cancel).await,
                ElectionPhase::Releasing | ElectionPhase::Stopped => break,
            };
        }

        self.release(&mut session, &callbacks).await;
        self.publish(ElectionPhase::Stopped, &session);
        debug!(lease_id = %self.lease_id, identity = %self.identity, "elector stopped");
        Ok(())
    }

    // ========================================================================
    // Phases
    // ========================================================================

    async fn observe<C: ElectionCallbacks>(
        &self,
        session: &mut Session,
        callbacks: &C,
        cancel: &CancellationToken,
    ) -> ElectionPhase {
        self.publish(ElectionPhase::Observing, session);

        let read = match self.call(cancel, self.leases.read(self.config.retry_period())).await {
            Call::Cancelled => return ElectionPhase::Releasing,
            Call::Done(read) => read,
        };

        match read {
            Ok(Some(observed)) => {
                session.backoff_ms = self.config.retry_period_ms;
                let now_ms = self.clock.now_ms();
                callbacks.on_observe(&observed.record.holder_identity, observed.record.term);
                session.note(observed, now_ms);

                let Some(current) = session.observed.as_ref() else {
                    return ElectionPhase::Observing;
                };
                match decide_observation(&current.record, &self.identity, session.observed_at_ms, now_ms) {
                    ObservationDecision::Resume => ElectionPhase::Renewing,
                    ObservationDecision::Acquire => ElectionPhase::Acquiring,
                    ObservationDecision::Wait => {
                        let seed: u64 = rand::rng().random();
                        let delay_ms = compute_poll_delay_ms(self.config.retry_period_ms, seed);
                        self.pause(session, delay_ms, ElectionPhase::Observing, cancel).await
                    }
                }
            }
            Ok(None) => self.create(session, cancel).await,
            Err(e) => self.back_off(session, e, cancel).await,
        }
    }

    async fn create(&self, session: &mut Session, cancel: &CancellationToken) -> ElectionPhase {
        let record = LeaseRecord::unheld(self.lease_id.clone(), self.config.lease_duration_ms);
        match self.call(cancel, self.leases.create(record, self.config.retry_period())).await {
            Call::Cancelled => ElectionPhase::Releasing,
            Call::Done(Ok(observed)) => {
                info!(lease_id = %self.lease_id, identity = %self.identity, "created lease record");
                session.backoff_ms = self.config.retry_period_ms;
                session.note(observed, self.clock.now_ms());
                ElectionPhase::Acquiring
            }
            Call::Done(Err(e)) if is_conflict(&e) => {
                debug!(lease_id = %self.lease_id, "lease record created concurrently");
                ElectionPhase::Observing
            }
            Call::Done(Err(e)) => self.back_off(session, e, cancel).await,
        }
    }

    async fn acquire<C: ElectionCallbacks>(
        &self,
        session: &mut Session,
        callbacks: &C,
        cancel: &CancellationToken,
    ) -> ElectionPhase {
        self.publish(ElectionPhase::Acquiring, session);
        let Some(current) = session.observed.clone() else {
            return ElectionPhase::Observing;
        };

        let attempt_ms = self.clock.now_ms();
        let next = current.record.acquired_by(&self.identity, self.config.lease_duration_ms, attempt_ms);
        match self.call(cancel, self.leases.update(&current, next, self.config.retry_period())).await {
            Call::Cancelled => ElectionPhase::Releasing,
            Call::Done(Ok(observed)) => {
                let term = observed.record.term;
                session.note(observed, attempt_ms);
                session.backoff_ms = self.config.retry_period_ms;
                session.leading_term = Some(term);
                session.last_renew_ms = attempt_ms;
                session.last_attempt_ms = attempt_ms;
                info!(lease_id = %self.lease_id, identity = %self.identity, term, "acquired leadership");
                self.publish(ElectionPhase::Leading, session);
                callbacks.on_start(term);
                ElectionPhase::Leading
            }
            Call::Done(Err(e)) if is_conflict(&e) || is_not_found(&e) => {
                debug!(lease_id = %self.lease_id, identity = %self.identity, "lost acquisition race");
                ElectionPhase::Observing
            }
            Call::Done(Err(e)) => self.back_off(session, e, cancel).await,
        }
    }

    async fn lead(&self, session: &mut Session, cancel: &CancellationToken) -> ElectionPhase {
        let deadline_ms = session.last_renew_ms.saturating_add(self.config.renew_deadline_ms);
        let next_ms = session.last_attempt_ms.saturating_add(self.config.renew_interval_ms()).min(deadline_ms);
        let delay_ms = next_ms.saturating_sub(self.clock.now_ms());
        match self.pause(session, delay_ms, ElectionPhase::Leading, cancel).await {
            ElectionPhase::Leading => ElectionPhase::Renewing,
            other => other,
        }
    }

    async fn renew<C: ElectionCallbacks>(
        &self,
        session: &mut Session,
        callbacks: &C,
        cancel: &CancellationToken,
    ) -> ElectionPhase {
        self.publish(ElectionPhase::Renewing, session);
        let Some(current) = session.observed.clone() else {
            return ElectionPhase::Observing;
        };

        let attempt_ms = self.clock.now_ms();
        session.last_attempt_ms = attempt_ms;
        let bound_ms = match session.leading_term {
            Some(_) => compute_renew_budget_ms(session.last_renew_ms, attempt_ms, self.config.renew_deadline_ms),
            None => self.config.renew_deadline_ms,
        };
        if bound_ms == 0 {
            self.step_down(session, callbacks, "renew deadline exceeded");
            return ElectionPhase::Observing;
        }

        let next = current.record.renewed(attempt_ms);
        let result = match self.call(cancel, self.leases.update(&current, next, Duration::from_millis(bound_ms))).await
        {
            Call::Cancelled => return ElectionPhase::Releasing,
            Call::Done(result) => result,
        };

        match result {
            Ok(observed) => {
                let term = observed.record.term;
                session.note(observed, attempt_ms);
                session.backoff_ms = self.config.retry_period_ms;
                session.last_renew_ms = attempt_ms;
                if session.leading_term.is_none() {
                    session.leading_term = Some(term);
                    info!(lease_id = %self.lease_id, identity = %self.identity, term, "resumed leadership");
                    self.publish(ElectionPhase::Leading, session);
                    callbacks.on_start(term);
                } else {
                    debug!(lease_id = %self.lease_id, identity = %self.identity, term, "renewed lease");
                }
                ElectionPhase::Leading
            }
            Err(e) if is_conflict(&e) => {
                self.step_down(session, callbacks, "lease was taken over");
                ElectionPhase::Observing
            }
            Err(e) if is_not_found(&e) => {
                warn!(
                    lease_id = %self.lease_id,
                    identity = %self.identity,
                    "lease record deleted externally; fencing terms restart from zero"
                );
                session.observed = None;
                self.step_down(session, callbacks, "lease record deleted");
                ElectionPhase::Observing
            }
            Err(e) if session.leading_term.is_none() => self.back_off(session, e, cancel).await,
            Err(e) => {
                let now_ms = self.clock.now_ms();
                warn!(lease_id = %self.lease_id, identity = %self.identity, error = %e, "lease renewal failed");
                if is_renew_deadline_exceeded(session.last_renew_ms, now_ms, self.config.renew_deadline_ms) {
                    self.step_down(session, callbacks, "renew deadline exceeded");
                    ElectionPhase::Observing
                } else {
                    ElectionPhase::Leading
                }
            }
        }
    }

    /// Best-effort release on cancellation. Failures are logged, never returned:
    /// other contenders reclaim the lease by expiry anyway.
    async fn release<C: ElectionCallbacks>(&self, session: &mut Session, callbacks: &C) {
        let leading_term = session.leading_term.take();
        self.publish(ElectionPhase::Releasing, session);
        let Some(term) = leading_term else {
            return;
        };

        info!(lease_id = %self.lease_id, identity = %self.identity, term, "stepping down for shutdown");
        callbacks.on_stop(term);

        let Some(current) = session.observed.clone() else {
            return;
        };
        if !current.record.is_held_by(&self.identity) {
            return;
        }
        let next = current.record.released(self.clock.now_ms());
        match self.leases.update(&current, next, self.config.renew_deadline()).await {
            Ok(observed) => {
                info!(lease_id = %self.lease_id, identity = %self.identity, term, "released lease");
                session.note(observed, self.clock.now_ms());
            }
            Err(e) => {
                warn!(lease_id = %self.lease_id, identity = %self.identity, error = %e, "best-effort release failed");
            }
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn step_down<C: ElectionCallbacks>(&self, session: &mut Session, callbacks: &C, reason: &str) {
        if let Some(term) = session.leading_term.take() {
            warn!(lease_id = %self.lease_id, identity = %self.identity, term, reason, "lost leadership");
            self.publish(ElectionPhase::Observing, session);
            callbacks.on_stop(term);
        }
    }

    async fn back_off(&self, session: &mut Session, err: ElectionError, cancel: &CancellationToken) -> ElectionPhase {
        match &err {
            ElectionError::CorruptedRecord { .. } | ElectionError::Serialization { .. } => {
                error!(lease_id = %self.lease_id, identity = %self.identity, error = %err, "cannot use lease record");
            }
            _ => {
                warn!(lease_id = %self.lease_id, identity = %self.identity, error = %err, "lease store call failed");
            }
        }

        let seed: u64 = rand::rng().random();
        let BackoffResult {
            sleep_ms,
            next_backoff_ms,
        } = compute_backoff_with_jitter(session.backoff_ms, self.config.max_backoff_ms(), seed);
        session.backoff_ms = next_backoff_ms;
        self.pause(session, sleep_ms, ElectionPhase::Observing, cancel).await
    }

    /// Sleep `delay_ms`, publishing the deadline. Returns `resume` unless cancelled.
    async fn pause(
        &self,
        session: &mut Session,
        delay_ms: u64,
        resume: ElectionPhase,
        cancel: &CancellationToken,
    ) -> ElectionPhase {
        session.next_action_deadline_ms = self.clock.now_ms().saturating_add(delay_ms);
        self.publish(resume, session);
        tokio::select! {
            _ = cancel.cancelled() => ElectionPhase::Releasing,
            _ = self.clock.sleep(Duration::from_millis(delay_ms)) => resume,
        }
    }

    async fn call<T, F>(&self, cancel: &CancellationToken, call: F) -> Call<T>
    where
        F: std::future::Future<Output = Result<T, ElectionError>>,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Call::Cancelled,
            result = call => Call::Done(result),
        }
    }

    fn publish(&self, phase: ElectionPhase, session: &Session) {
        let (last_observed_term, observed_holder) = session
            .observed
            .as_ref()
            .map(|o| (o.record.term, o.record.holder_identity.clone()))
            .unwrap_or_default();
        self.state_tx.send_replace(LocalElectionState {
            phase,
            last_observed_term,
            observed_holder,
            is_leading_locally: session.leading_term.is_some(),
            next_action_deadline_ms: session.next_action_deadline_ms,
        });
    }
}

fn is_conflict(err: &ElectionError) -> bool {
    err.store_error().is_some_and(StoreError::is_conflict)
}

fn is_not_found(err: &ElectionError) -> bool {
    matches!(err.store_error(), Some(StoreError::NotFound { .. }))
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use shardlease_store::InMemoryRecordStore;
    use shardlease_store::StoreOp;
    use shardlease_time::MonotonicClock;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Start(u64),
        Stop(u64),
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<Event>>,
        observed: Mutex<Vec<(String, u64)>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<Event> {
            self.events.lock().clone()
        }
    }

    impl ElectionCallbacks for Recorder {
        fn on_start(&self, term: u64) {
            self.events.lock().push(Event::Start(term));
        }

        fn on_stop(&self, term: u64) {
            self.events.lock().push(Event::Stop(term));
        }

        fn on_observe(&self, holder: &str, term: u64) {
            self.observed.lock().push((holder.to_string(), term));
        }
    }

    fn config() -> ElectionConfig {
        ElectionConfig::new(1000, 600, 200)
    }

    fn clock() -> Arc<dyn Clock> {
        Arc::new(MonotonicClock::with_epoch_ms(0))
    }

    fn spawn_elector(
        store: &InMemoryRecordStore,
        clock: &Arc<dyn Clock>,
        identity: &str,
    ) -> (
        Arc<Recorder>,
        watch::Receiver<LocalElectionState>,
        CancellationToken,
        tokio::task::JoinHandle<Result<(), ElectionError>>,
    ) {
        let elector = LeaderElector::new(Arc::new(store.client(identity)), clock.clone(), "p-0", identity, config());
        let state = elector.subscribe();
        let recorder = Arc::new(Recorder::default());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(elector.run(recorder.clone(), cancel.clone()));
        (recorder, state, cancel, task)
    }

    fn stored(store: &InMemoryRecordStore) -> LeaseRecord {
        LeaseRecord::decode("p-0", &store.peek("p-0").unwrap().value).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn misconfiguration_fails_fast() {
        let store = InMemoryRecordStore::new();
        let elector = LeaderElector::new(Arc::new(store.clone()), clock(), "p-0", "a", ElectionConfig::new(1000, 1000, 200));
        let state = elector.subscribe();
        assert_eq!((elector.lease_id(), elector.identity()), ("p-0", "a"));

        let err = elector.run(Arc::new(Recorder::default()), CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ElectionError::Misconfiguration { .. }));
        assert_eq!(state.borrow().phase, ElectionPhase::Stopped);
        assert!(store.history().is_empty(), "misconfigured elector must not touch the store");
    }

    #[tokio::test(start_paused = true)]
    async fn empty_identity_is_rejected() {
        let store = InMemoryRecordStore::new();
        let elector = LeaderElector::new(Arc::new(store), clock(), "p-0", "", config());
        let err = elector.run(Arc::new(Recorder::default()), CancellationToken::new()).await.unwrap_err();
        assert!(err.to_string().contains("identity must not be empty"));
    }

    #[tokio::test(start_paused = true)]
    async fn absent_lease_is_created_and_acquired_at_term_one() {
        let store = InMemoryRecordStore::new();
        let clock = clock();
        let (recorder, state, cancel, task) = spawn_elector(&store, &clock, "a");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(recorder.events(), vec![Event::Start(1)]);
        assert!(state.borrow().is_leading_locally);

        let record = stored(&store);
        assert_eq!(record.holder_identity, "a");
        assert_eq!(record.term, 1);

        cancel.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn renewals_keep_term_and_advance_renew_time() {
        let store = InMemoryRecordStore::new();
        let clock = clock();
        let (recorder, _state, cancel, task) = spawn_elector(&store, &clock, "a");

        tokio::time::sleep(Duration::from_millis(1_100)).await;

        let renewals: Vec<LeaseRecord> = store
            .history()
            .iter()
            .filter(|w| w.op == StoreOp::CompareAndSwap)
            .map(|w| LeaseRecord::decode("p-0", &w.value).unwrap())
            .skip(1)
            .collect();
        assert!(renewals.len() >= 5, "expected at least 5 renewals, got {}", renewals.len());
        for pair in renewals.windows(2) {
            assert_eq!(pair[1].term, 1);
            assert!(pair[1].renew_time_ms > pair[0].renew_time_ms);
        }
        assert_eq!(recorder.events(), vec![Event::Start(1)]);

        cancel.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_releases_and_keeps_term() {
        let store = InMemoryRecordStore::new();
        let clock = clock();
        let (recorder, state, cancel, task) = spawn_elector(&store, &clock, "a");

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        task.await.unwrap().unwrap();

        assert_eq!(recorder.events(), vec![Event::Start(1), Event::Stop(1)]);
        let record = stored(&store);
        assert!(!record.is_held());
        assert_eq!(record.term, 1);
        assert_eq!(state.borrow().phase, ElectionPhase::Stopped);
        assert!(!state.borrow().is_leading_locally);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_release_is_swallowed() {
        let store = InMemoryRecordStore::new();
        let clock = clock();
        let (recorder, _state, cancel, task) = spawn_elector(&store, &clock, "a");

        tokio::time::sleep(Duration::from_millis(50)).await;
        store.partition("a", true);
        cancel.cancel();
        task.await.unwrap().unwrap();

        assert_eq!(recorder.events(), vec![Event::Start(1), Event::Stop(1)]);
        assert!(stored(&store).is_held_by("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn released_lease_is_taken_with_next_term() {
        let store = InMemoryRecordStore::new();
        let clock = clock();
        let (_a, _sa, cancel_a, task_a) = spawn_elector(&store, &clock, "a");
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel_a.cancel();
        task_a.await.unwrap().unwrap();

        let (b, _sb, cancel_b, task_b) = spawn_elector(&store, &clock, "b");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(b.events(), vec![Event::Start(2)]);

        cancel_b.cancel();
        task_b.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn restart_with_same_identity_resumes_term() {
        let store = InMemoryRecordStore::new();
        let clock = clock();
        store.put(
            "p-0",
            LeaseRecord::unheld("p-0", 1000).acquired_by("a", 1000, 0).encode().unwrap(),
        );

        let (recorder, _state, cancel, task) = spawn_elector(&store, &clock, "a");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(recorder.events(), vec![Event::Start(1)]);
        assert_eq!(stored(&store).term, 1);

        cancel.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn observer_reports_foreign_holder() {
        let store = InMemoryRecordStore::new();
        let clock = clock();
        let (a, _sa, cancel_a, task_a) = spawn_elector(&store, &clock, "a");
        tokio::time::sleep(Duration::from_millis(10)).await;
        let (b, state_b, cancel_b, task_b) = spawn_elector(&store, &clock, "b");
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(a.events(), vec![Event::Start(1)]);
        assert!(b.events().is_empty());
        assert!(b.observed.lock().iter().all(|(holder, term)| holder == "a" && *term == 1));
        assert!(!b.observed.lock().is_empty());
        assert_eq!(state_b.borrow().phase, ElectionPhase::Observing);
        assert_eq!(state_b.borrow().observed_holder, "a");

        cancel_a.cancel();
        cancel_b.cancel();
        task_a.await.unwrap().unwrap();
        task_b.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn version_conflict_on_renewal_loses_leadership() {
        let store = InMemoryRecordStore::new();
        let clock = clock();
        let (recorder, _state, cancel, task) = spawn_elector(&store, &clock, "a");
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Another process legitimately took over with a higher term.
        let current = stored(&store);
        store.put("p-0", current.acquired_by("b", 1000, 5_000).encode().unwrap());
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(recorder.events(), vec![Event::Start(1), Event::Stop(1)]);
        assert_eq!(stored(&store).holder_identity, "b");
        assert_eq!(stored(&store).term, 2);

        cancel.cancel();
        task.await.unwrap().unwrap();
        assert_eq!(recorder.events().len(), 2, "no release or stop after losing");
    }

    #[tokio::test(start_paused = true)]
    async fn renewal_is_not_attempted_once_deadline_is_reached() {
        let store = InMemoryRecordStore::new();
        let clock = clock();
        let (recorder, _state, cancel, task) = spawn_elector(&store, &clock, "a");
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Attempts at +200 and +400 fail; the +600 attempt lands on the deadline.
        store.fail_next("a", StoreOp::CompareAndSwap, 2);
        tokio::time::sleep(Duration::from_millis(1_000)).await;

        // The holder steps down at the deadline, then resumes through a fresh write.
        assert_eq!(recorder.events(), vec![Event::Start(1), Event::Stop(1), Event::Start(1)]);
        assert!(stored(&store).is_held_by("a"));
        assert_eq!(stored(&store).term, 1);

        cancel.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn operator_delete_restarts_terms() {
        let store = InMemoryRecordStore::new();
        let clock = clock();
        let (recorder, _state, cancel, task) = spawn_elector(&store, &clock, "a");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.remove("p-0"));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(recorder.events(), vec![Event::Start(1), Event::Stop(1), Event::Start(1)]);
        assert!(stored(&store).is_held_by("a"));

        cancel.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn corrupted_record_is_never_overwritten() {
        let store = InMemoryRecordStore::new();
        let clock = clock();
        store.put("p-0", "not a lease");
        let (recorder, state, cancel, task) = spawn_elector(&store, &clock, "a");

        tokio::time::sleep(Duration::from_millis(2_000)).await;
        assert!(recorder.events().is_empty());
        assert_eq!(store.peek("p-0").unwrap().value, "not a lease");
        assert_eq!(state.borrow().phase, ElectionPhase::Observing);

        cancel.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_reads_back_off_without_losing_term_knowledge() {
        let store = InMemoryRecordStore::new();
        let clock = clock();
        let (a, _sa, cancel_a, task_a) = spawn_elector(&store, &clock, "a");
        tokio::time::sleep(Duration::from_millis(10)).await;
        let (_b, state_b, cancel_b, task_b) = spawn_elector(&store, &clock, "b");
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(state_b.borrow().last_observed_term, 1);

        store.partition("b", true);
        tokio::time::sleep(Duration::from_millis(3_000)).await;
        assert_eq!(state_b.borrow().last_observed_term, 1);
        assert_eq!(state_b.borrow().phase, ElectionPhase::Observing);
        assert_eq!(a.events(), vec![Event::Start(1)]);

        cancel_a.cancel();
        cancel_b.cancel();
        task_a.await.unwrap().unwrap();
        task_b.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn simulated_clock_drives_expiry() {
        let store = InMemoryRecordStore::new();
        store.put(
            "p-0",
            LeaseRecord::unheld("p-0", 1000).acquired_by("a", 1000, 0).encode().unwrap(),
        );
        let clock = shardlease_time::SimulatedClock::new(0);
        let elector = LeaderElector::new(Arc::new(store.client("b")), Arc::new(clock.clone()), "p-0", "b", config());
        let recorder = Arc::new(Recorder::default());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(elector.run(recorder.clone(), cancel.clone()));

        let mut started_at = None;
        while clock.now_ms() < 2_000 && started_at.is_none() {
            clock.advance_ms(10);
            for _ in 0..20 {
                tokio::task::yield_now().await;
            }
            if !recorder.events().is_empty() {
                started_at = Some(clock.now_ms());
            }
        }

        let started_at = started_at.unwrap();
        assert!((1000..1300).contains(&started_at), "acquired at {started_at}ms");
        assert_eq!(recorder.events(), vec![Event::Start(2)]);

        cancel.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_while_observing_stops_without_callbacks() {
        let store = InMemoryRecordStore::new();
        let clock = clock();
        store.hang("a", true);
        let (recorder, state, cancel, task) = spawn_elector(&store, &clock, "a");
        tokio::time::sleep(Duration::from_millis(50)).await;

        cancel.cancel();
        task.await.unwrap().unwrap();
        assert!(recorder.events().is_empty());
        assert_eq!(state.borrow().phase, ElectionPhase::Stopped);
    }
}

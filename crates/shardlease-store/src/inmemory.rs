//! In-memory deterministic implementation of [`VersionedRecordStore`].
//!
//! All records live in one map behind a short critical section, which makes
//! every operation linearizable. Versions come from a single counter and are
//! never reused, even across deletes, so a version read before an operator
//! delete can never match the recreated record.
//!
//! Simulated processes each take their own [`InMemoryClient`] so faults can be
//! injected per process: a partition fails every call of one client, a hang
//! makes its calls never complete, and `fail_next` fails a fixed number of
//! calls of one kind. `hang_record` instead suspends every call that names one
//! record, whichever client issues it.
//!
//! The write history keeps at most [`MAX_HISTORY_ENTRIES`] entries, dropping
//! the oldest; [`InMemoryRecordStore::write_count`] counts every write.

use std::collections::HashMap;
use std::collections::HashSet;
use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::StoreError;
use crate::traits::VersionedRecordStore;
use crate::types::StoreOp;
use crate::types::Version;
use crate::types::VersionedValue;

/// Client name used for calls made directly on the store handle.
const DIRECT_CLIENT: &str = "";

/// Client name recorded for writes made through the operator methods.
const OPERATOR_CLIENT: &str = "operator";

/// Maximum number of write events retained by the history.
pub const MAX_HISTORY_ENTRIES: usize = 65_536;

/// An accepted write, in apply order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteEvent {
    /// Record name.
    pub id: String,
    /// Version assigned by this write.
    pub version: Version,
    /// Payload written.
    pub value: String,
    /// Client that issued the write.
    pub client: String,
    /// Which operation produced it.
    pub op: StoreOp,
}

#[derive(Debug, Default)]
struct ClientFaults {
    partitioned: bool,
    hung: bool,
    fail_next: HashMap<StoreOp, u32>,
}

#[derive(Debug, Default)]
struct State {
    records: HashMap<String, VersionedValue>,
    last_version: u64,
    history: VecDeque<WriteEvent>,
    write_count: u64,
    faults: HashMap<String, ClientFaults>,
    hung_records: HashSet<String>,
}

impl State {
    fn next_version(&mut self) -> Version {
        self.last_version = self.last_version.saturating_add(1);
        Version::new(self.last_version.to_string())
    }

    fn record_write(&mut self, id: &str, version: &Version, value: &str, client: &str, op: StoreOp) {
        self.write_count = self.write_count.saturating_add(1);
        if self.history.len() >= MAX_HISTORY_ENTRIES {
            self.history.pop_front();
        }
        self.history.push_back(WriteEvent {
            id: id.to_string(),
            version: version.clone(),
            value: value.to_string(),
            client: client.to_string(),
            op,
        });
    }
}

enum Fault {
    None,
    Fail(String),
    Hang,
}

/// Shared in-memory store. Cloning yields another handle to the same records.
///
/// # Example
///
/// ```ignore
/// let store = InMemoryRecordStore::new();
/// let a = store.client("process-a");
/// store.partition("process-a", true);
/// assert!(a.get("partition-0").await.is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecordStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryRecordStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle whose calls are attributed to `name` for fault injection.
    pub fn client(&self, name: impl Into<String>) -> InMemoryClient {
        InMemoryClient {
            state: self.state.clone(),
            name: name.into(),
        }
    }

    /// Make every call from `client` fail with `Unavailable` (or stop doing so).
    pub fn partition(&self, client: &str, partitioned: bool) {
        self.state.lock().faults.entry(client.to_string()).or_default().partitioned = partitioned;
    }

    /// Make every call from `client` never complete (or stop doing so).
    ///
    /// Calls already suspended stay suspended; callers are expected to time out.
    pub fn hang(&self, client: &str, hung: bool) {
        self.state.lock().faults.entry(client.to_string()).or_default().hung = hung;
    }

    /// Fail the next `count` calls of kind `op` from `client` with `Unavailable`.
    pub fn fail_next(&self, client: &str, op: StoreOp, count: u32) {
        let mut state = self.state.lock();
        let pending = state.faults.entry(client.to_string()).or_default().fail_next.entry(op).or_insert(0);
        *pending = pending.saturating_add(count);
    }

    /// Remove every fault configured for `client`.
    pub fn heal(&self, client: &str) {
        self.state.lock().faults.remove(client);
    }

    /// Make every call naming record `id` never complete (or stop doing so),
    /// regardless of the calling client. Calls on other records are unaffected.
    pub fn hang_record(&self, id: &str, hung: bool) {
        let mut state = self.state.lock();
        if hung {
            state.hung_records.insert(id.to_string());
        } else {
            state.hung_records.remove(id);
        }
    }

    /// Retained writes in apply order: the most recent
    /// [`MAX_HISTORY_ENTRIES`] at most.
    pub fn history(&self) -> Vec<WriteEvent> {
        self.state.lock().history.iter().cloned().collect()
    }

    /// Number of writes accepted since the store was created.
    pub fn write_count(&self) -> u64 {
        self.state.lock().write_count
    }

    /// Current payload and version of `id`, bypassing fault injection.
    pub fn peek(&self, id: &str) -> Option<VersionedValue> {
        self.state.lock().records.get(id).cloned()
    }

    /// Write `value` unconditionally, as an operator would.
    pub fn put(&self, id: &str, value: impl Into<String>) -> Version {
        let value = value.into();
        let mut state = self.state.lock();
        let version = state.next_version();
        state.record_write(id, &version, &value, OPERATOR_CLIENT, StoreOp::Put);
        state.records.insert(id.to_string(), VersionedValue {
            value,
            version: version.clone(),
        });
        version
    }

    /// Delete `id`, as an operator would. Returns whether it existed.
    pub fn remove(&self, id: &str) -> bool {
        let removed = self.state.lock().records.remove(id).is_some();
        if removed {
            debug!(record = %id, "record removed by operator");
        }
        removed
    }
}

fn check_fault(state: &Mutex<State>, client: &str, id: &str, op: StoreOp) -> Fault {
    let mut state = state.lock();
    if state.hung_records.contains(id) {
        return Fault::Hang;
    }
    let Some(faults) = state.faults.get_mut(client) else {
        return Fault::None;
    };
    if faults.hung {
        return Fault::Hang;
    }
    if faults.partitioned {
        return Fault::Fail(format!("client '{client}' is partitioned"));
    }
    if let Some(pending) = faults.fail_next.get_mut(&op) {
        if *pending > 0 {
            *pending -= 1;
            return Fault::Fail(format!("injected {op} failure for client '{client}'"));
        }
    }
    Fault::None
}

async fn admit(state: &Mutex<State>, client: &str, id: &str, op: StoreOp) -> Result<(), StoreError> {
    match check_fault(state, client, id, op) {
        Fault::None => Ok(()),
        Fault::Fail(reason) => {
            debug!(client, %op, "injecting store failure");
            Err(StoreError::Unavailable { reason })
        }
        Fault::Hang => {
            debug!(client, record = %id, %op, "injecting store hang");
            std::future::pending::<()>().await;
            Ok(())
        }
    }
}

async fn get_as(state: &Mutex<State>, client: &str, id: &str) -> Result<Option<VersionedValue>, StoreError> {
    admit(state, client, id, StoreOp::Get).await?;
    Ok(state.lock().records.get(id).cloned())
}

async fn create_as(state: &Mutex<State>, client: &str, id: &str, value: String) -> Result<Version, StoreError> {
    admit(state, client, id, StoreOp::Create).await?;
    let mut state = state.lock();
    if state.records.contains_key(id) {
        return Err(StoreError::AlreadyExists { id: id.to_string() });
    }
    let version = state.next_version();
    state.record_write(id, &version, &value, client, StoreOp::Create);
    state.records.insert(id.to_string(), VersionedValue {
        value,
        version: version.clone(),
    });
    Ok(version)
}

async fn compare_and_swap_as(
    state: &Mutex<State>,
    client: &str,
    id: &str,
    expected: &Version,
    value: String,
) -> Result<Version, StoreError> {
    admit(state, client, id, StoreOp::CompareAndSwap).await?;
    let mut state = state.lock();
    match state.records.get(id) {
        None => return Err(StoreError::NotFound { id: id.to_string() }),
        Some(current) if &current.version != expected => {
            return Err(StoreError::VersionConflict { id: id.to_string() });
        }
        Some(_) => {}
    }
    let version = state.next_version();
    state.record_write(id, &version, &value, client, StoreOp::CompareAndSwap);
    state.records.insert(id.to_string(), VersionedValue {
        value,
        version: version.clone(),
    });
    Ok(version)
}

#[async_trait]
impl VersionedRecordStore for InMemoryRecordStore {
    async fn get(&self, id: &str) -> Result<Option<VersionedValue>, StoreError> {
        get_as(&self.state, DIRECT_CLIENT, id).await
    }

    async fn create(&self, id: &str, value: String) -> Result<Version, StoreError> {
        create_as(&self.state, DIRECT_CLIENT, id, value).await
    }

    async fn compare_and_swap(&self, id: &str, expected: &Version, value: String) -> Result<Version, StoreError> {
        compare_and_swap_as(&self.state, DIRECT_CLIENT, id, expected, value).await
    }
}

/// A per-process view of an [`InMemoryRecordStore`].
#[derive(Debug, Clone)]
pub struct InMemoryClient {
    state: Arc<Mutex<State>>,
    name: String,
}

#[async_trait]
impl VersionedRecordStore for InMemoryClient {
    async fn get(&self, id: &str) -> Result<Option<VersionedValue>, StoreError> {
        get_as(&self.state, &self.name, id).await
    }

    async fn create(&self, id: &str, value: String) -> Result<Version, StoreError> {
        create_as(&self.state, &self.name, id, value).await
    }

    async fn compare_and_swap(&self, id: &str, expected: &Version, value: String) -> Result<Version, StoreError> {
        compare_and_swap_as(&self.state, &self.name, id, expected, value).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn get_missing_returns_none() {
        let store = InMemoryRecordStore::new();
        assert_eq!(store.get("p-0").await.unwrap(), None);
    }

    #[tokio::test]
    async fn create_then_get() {
        let store = InMemoryRecordStore::new();
        let version = store.create("p-0", "a".into()).await.unwrap();
        let read = store.get("p-0").await.unwrap().unwrap();
        assert_eq!(read.value, "a");
        assert_eq!(read.version, version);
    }

    #[tokio::test]
    async fn create_twice_fails() {
        let store = InMemoryRecordStore::new();
        store.create("p-0", "a".into()).await.unwrap();
        let err = store.create("p-0", "b".into()).await.unwrap_err();
        assert_eq!(err, StoreError::AlreadyExists { id: "p-0".into() });
        assert_eq!(store.peek("p-0").unwrap().value, "a");
    }

    #[tokio::test]
    async fn cas_with_current_version_succeeds() {
        let store = InMemoryRecordStore::new();
        let v1 = store.create("p-0", "a".into()).await.unwrap();
        let v2 = store.compare_and_swap("p-0", &v1, "b".into()).await.unwrap();
        assert_ne!(v1, v2);
        assert_eq!(store.peek("p-0").unwrap().value, "b");
    }

    #[tokio::test]
    async fn cas_with_stale_version_conflicts() {
        let store = InMemoryRecordStore::new();
        let v1 = store.create("p-0", "a".into()).await.unwrap();
        store.compare_and_swap("p-0", &v1, "b".into()).await.unwrap();

        let err = store.compare_and_swap("p-0", &v1, "c".into()).await.unwrap_err();
        assert_eq!(err, StoreError::VersionConflict { id: "p-0".into() });
        assert_eq!(store.peek("p-0").unwrap().value, "b");
    }

    #[tokio::test]
    async fn cas_on_missing_record_is_not_found() {
        let store = InMemoryRecordStore::new();
        let err = store.compare_and_swap("p-0", &Version::new("1"), "a".into()).await.unwrap_err();
        assert_eq!(err, StoreError::NotFound { id: "p-0".into() });
    }

    #[tokio::test]
    async fn versions_are_not_reused_after_remove() {
        let store = InMemoryRecordStore::new();
        let v1 = store.create("p-0", "a".into()).await.unwrap();
        assert!(store.remove("p-0"));
        let v2 = store.create("p-0", "a".into()).await.unwrap();
        assert_ne!(v1, v2);

        let err = store.compare_and_swap("p-0", &v1, "b".into()).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn partition_affects_only_that_client() {
        let store = InMemoryRecordStore::new();
        let a = store.client("a");
        let b = store.client("b");
        store.partition("a", true);

        assert!(a.get("p-0").await.unwrap_err().is_retryable());
        assert!(b.get("p-0").await.is_ok());

        store.partition("a", false);
        assert!(a.get("p-0").await.is_ok());
    }

    #[tokio::test]
    async fn fail_next_counts_down_per_op() {
        let store = InMemoryRecordStore::new();
        let a = store.client("a");
        let version = a.create("p-0", "x".into()).await.unwrap();
        store.fail_next("a", StoreOp::CompareAndSwap, 2);

        assert!(a.get("p-0").await.is_ok());
        assert!(a.compare_and_swap("p-0", &version, "y".into()).await.is_err());
        assert!(a.compare_and_swap("p-0", &version, "y".into()).await.is_err());
        assert!(a.compare_and_swap("p-0", &version, "y".into()).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn hung_client_never_completes() {
        let store = InMemoryRecordStore::new();
        let a = store.client("a");
        store.hang("a", true);

        let result = tokio::time::timeout(Duration::from_millis(50), a.get("p-0")).await;
        assert!(result.is_err());

        store.heal("a");
        assert!(a.get("p-0").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn hung_record_blocks_only_that_record() {
        let store = InMemoryRecordStore::new();
        let a = store.client("a");
        let b = store.client("b");
        store.hang_record("slow", true);

        let slow_a = tokio::time::timeout(Duration::from_millis(50), a.get("slow")).await;
        let slow_b = tokio::time::timeout(Duration::from_millis(50), b.create("slow", "x".into())).await;
        assert!(slow_a.is_err());
        assert!(slow_b.is_err());
        assert!(store.peek("slow").is_none());
        assert!(a.create("fast", "x".into()).await.is_ok());

        store.hang_record("slow", false);
        assert!(a.get("slow").await.is_ok());
    }

    #[tokio::test]
    async fn history_records_accepted_writes_in_order() {
        let store = InMemoryRecordStore::new();
        let a = store.client("a");
        let v1 = a.create("p-0", "1".into()).await.unwrap();
        let _ = a.compare_and_swap("p-0", &Version::new("stale"), "x".into()).await;
        a.compare_and_swap("p-0", &v1, "2".into()).await.unwrap();

        let history = store.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].value, "1");
        assert_eq!(history[0].op, StoreOp::Create);
        assert_eq!(history[1].value, "2");
        assert_eq!(history[1].client, "a");
    }

    #[tokio::test]
    async fn put_overwrites_unconditionally() {
        let store = InMemoryRecordStore::new();
        let v1 = store.create("p-0", "a".into()).await.unwrap();
        let v2 = store.put("p-0", "operator-value");
        assert_ne!(v1, v2);
        assert_eq!(store.peek("p-0").unwrap().version, v2);
        let last = store.history().last().cloned().unwrap();
        assert_eq!(last.client, "operator");
        assert_eq!(last.op, StoreOp::Put);
        assert_eq!(store.history()[0].op, StoreOp::Create);
    }

    #[tokio::test]
    async fn history_is_capped_but_write_count_is_not() {
        let store = InMemoryRecordStore::new();
        let total = MAX_HISTORY_ENTRIES + 10;
        for i in 0..total {
            store.put("p-0", i.to_string());
        }

        let history = store.history();
        assert_eq!(history.len(), MAX_HISTORY_ENTRIES);
        assert_eq!(history[0].value, "10");
        assert_eq!(history.last().unwrap().value, (total - 1).to_string());
        assert_eq!(store.write_count(), total as u64);
    }
}

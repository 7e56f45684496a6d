//! Typed, time-bounded access to one lease record.
//!
//! Wraps a raw [`VersionedRecordStore`] with the JSON codec for
//! [`LeaseRecord`] and bounds every call with the elector's clock, so a store
//! that stops answering surfaces as `Unavailable` instead of stalling.

use std::sync::Arc;
use std::time::Duration;

use shardlease_store::StoreError;
use shardlease_store::VersionedRecordStore;
use shardlease_time::Clock;
use shardlease_time::timeout;

use crate::error::ElectionError;
use crate::record::LeaseRecord;
use crate::record::ObservedLease;

/// Record access for a single lease id.
pub struct LeaseStore<S: ?Sized> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    lease_id: String,
}

impl<S: VersionedRecordStore + ?Sized> LeaseStore<S> {
    /// Bind `store` to the record named `lease_id`.
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, lease_id: impl Into<String>) -> Self {
        Self {
            store,
            clock,
            lease_id: lease_id.into(),
        }
    }

    /// Read the record. `Ok(None)` if it does not exist.
    pub async fn read(&self, bound: Duration) -> Result<Option<ObservedLease>, ElectionError> {
        let read = self.bounded(bound, self.store.get(&self.lease_id)).await?;
        read.map(|versioned| {
            Ok(ObservedLease {
                record: LeaseRecord::decode(&self.lease_id, &versioned.value)?,
                version: versioned.version,
            })
        })
        .transpose()
    }

    /// Create the record. Fails with `AlreadyExists` if someone else did first.
    pub async fn create(&self, record: LeaseRecord, bound: Duration) -> Result<ObservedLease, ElectionError> {
        let payload = record.encode()?;
        let version = self.bounded(bound, self.store.create(&self.lease_id, payload)).await?;
        Ok(ObservedLease { record, version })
    }

    /// Replace `current` with `next` if `current` is still the latest version.
    pub async fn update(
        &self,
        current: &ObservedLease,
        next: LeaseRecord,
        bound: Duration,
    ) -> Result<ObservedLease, ElectionError> {
        let payload = next.encode()?;
        let version = self
            .bounded(bound, self.store.compare_and_swap(&self.lease_id, &current.version, payload))
            .await?;
        Ok(ObservedLease { record: next, version })
    }

    async fn bounded<T, F>(&self, bound: Duration, call: F) -> Result<T, ElectionError>
    where
        F: std::future::Future<Output = Result<T, StoreError>>,
    {
        let source = match timeout(self.clock.as_ref(), bound, call).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(source)) => source,
            Err(elapsed) => StoreError::Unavailable {
                reason: elapsed.to_string(),
            },
        };
        Err(ElectionError::Store {
            lease_id: self.lease_id.clone(),
            source,
        })
    }
}

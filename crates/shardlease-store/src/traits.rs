//! The store contract.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::Version;
use crate::types::VersionedValue;

/// Named records with optimistic concurrency.
///
/// Implementations must be linearizable per record name: of two
/// `compare_and_swap` calls presenting the same version, at most one succeeds.
/// Calls for different names must not be serialized behind each other.
#[async_trait]
pub trait VersionedRecordStore: Send + Sync {
    /// Read a record. `Ok(None)` means the name is unused.
    async fn get(&self, id: &str) -> Result<Option<VersionedValue>, StoreError>;

    /// Insert a record that must not exist yet.
    async fn create(&self, id: &str, value: String) -> Result<Version, StoreError>;

    /// Replace a record if `expected` is still its current version.
    async fn compare_and_swap(&self, id: &str, expected: &Version, value: String) -> Result<Version, StoreError>;
}

// Blanket implementation for Arc<T>
#[async_trait]
impl<T: VersionedRecordStore + ?Sized> VersionedRecordStore for std::sync::Arc<T> {
    async fn get(&self, id: &str) -> Result<Option<VersionedValue>, StoreError> {
        (**self).get(id).await
    }

    async fn create(&self, id: &str, value: String) -> Result<Version, StoreError> {
        (**self).create(id, value).await
    }

    async fn compare_and_swap(&self, id: &str, expected: &Version, value: String) -> Result<Version, StoreError> {
        (**self).compare_and_swap(id, expected, value).await
    }
}

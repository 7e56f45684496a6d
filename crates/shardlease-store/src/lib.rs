//! Versioned record store contract consumed by the lease election engine.
//!
//! The engine never talks to a coordination backend directly. It needs exactly
//! three operations on a named record, each guarded by an opaque version
//! token:
//!
//! - `get` returns the current payload and its version, or nothing
//! - `create` inserts a record only if the name is free
//! - `compare_and_swap` replaces a record only if the presented version is
//!   still current
//!
//! Any backend with a linearizable conditional write (etcd revisions,
//! Kubernetes resource versions, a Raft KV with CAS) can implement
//! [`VersionedRecordStore`]. [`InMemoryRecordStore`] is the reference
//! implementation used by tests and the demo binary.

mod error;
mod inmemory;
mod traits;
mod types;

pub use error::StoreError;
pub use inmemory::InMemoryClient;
pub use inmemory::InMemoryRecordStore;
pub use inmemory::MAX_HISTORY_ENTRIES;
pub use inmemory::WriteEvent;
pub use traits::VersionedRecordStore;
pub use types::StoreOp;
pub use types::Version;
pub use types::VersionedValue;

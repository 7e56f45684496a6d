//! Error types for lease election.

use shardlease_store::StoreError;
use snafu::Snafu;

/// Errors from a single leader elector.
///
/// Losing leadership is never an error; it is reported through
/// [`ElectionCallbacks::on_stop`](crate::ElectionCallbacks::on_stop).
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ElectionError {
    /// Timing or identity settings that would make the protocol unsafe.
    #[snafu(display("invalid election configuration: {reason}"))]
    Misconfiguration {
        /// What is wrong.
        reason: String,
    },

    /// A store call failed.
    #[snafu(display("store error on lease '{lease_id}': {source}"))]
    Store {
        /// Lease the call was for.
        lease_id: String,
        /// The underlying error.
        source: StoreError,
    },

    /// A lease record could not be encoded.
    #[snafu(display("failed to encode lease record '{lease_id}': {source}"))]
    Serialization {
        /// Lease being written.
        lease_id: String,
        /// The underlying error.
        source: serde_json::Error,
    },

    /// A stored lease record could not be decoded or names a different lease.
    #[snafu(display("corrupted lease record '{lease_id}': {reason}"))]
    CorruptedRecord {
        /// Lease whose record is unreadable.
        lease_id: String,
        /// Description of what went wrong.
        reason: String,
    },
}

impl ElectionError {
    /// The store error behind this failure, if any.
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            ElectionError::Store { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Errors from an [`ElectionGroup`](crate::ElectionGroup).
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum GroupError {
    /// The lease id already has an elector in this group.
    #[snafu(display("lease '{lease_id}' is already part of the group"))]
    DuplicateLease {
        /// The lease id.
        lease_id: String,
    },

    /// The lease id has no elector in this group.
    #[snafu(display("lease '{lease_id}' is not part of the group"))]
    UnknownLease {
        /// The lease id.
        lease_id: String,
    },

    /// The group already runs its maximum number of electors.
    #[snafu(display("group is at capacity: {count} leases (max: {max})"))]
    CapacityExceeded {
        /// Current elector count.
        count: usize,
        /// Configured maximum.
        max: usize,
    },

    /// The elector refused its configuration.
    #[snafu(display("cannot start elector for lease '{lease_id}': {source}"))]
    InvalidConfig {
        /// The lease id.
        lease_id: String,
        /// Why the configuration was refused.
        source: ElectionError,
    },

    /// The group-wide defaults or identity were refused.
    #[snafu(display("invalid election group configuration: {source}"))]
    InvalidGroupConfig {
        /// Why the configuration was refused.
        source: ElectionError,
    },

    /// The group has been shut down.
    #[snafu(display("election group is shut down"))]
    ShutDown,
}

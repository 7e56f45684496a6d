//! Error taxonomy of the versioned record store.

use snafu::Snafu;

/// Errors returned by a [`VersionedRecordStore`](crate::VersionedRecordStore).
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum StoreError {
    /// The presented version is no longer current. Retry only after a fresh read.
    #[snafu(display("version conflict on record '{id}'"))]
    VersionConflict {
        /// Record name.
        id: String,
    },

    /// `compare_and_swap` targeted a record that does not exist.
    #[snafu(display("record '{id}' not found"))]
    NotFound {
        /// Record name.
        id: String,
    },

    /// `create` targeted a name that is already taken.
    #[snafu(display("record '{id}' already exists"))]
    AlreadyExists {
        /// Record name.
        id: String,
    },

    /// The backend could not be reached or did not answer in time.
    #[snafu(display("store unavailable: {reason}"))]
    Unavailable {
        /// Human-readable cause.
        reason: String,
    },
}

impl StoreError {
    /// Whether repeating the same call unchanged can succeed.
    ///
    /// Only `Unavailable` qualifies; a version conflict needs a fresh read first.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable { .. })
    }

    /// Whether this is an optimistic-concurrency rejection.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::VersionConflict { .. } | StoreError::AlreadyExists { .. })
    }
}

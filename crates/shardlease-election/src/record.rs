//! The persisted lease record and its transitions.

use serde::Deserialize;
use serde::Serialize;
use shardlease_store::Version;

use crate::error::ElectionError;
use crate::pure::compute_next_term;
use crate::pure::compute_renew_time_ms;

/// Ownership state of one contested resource, as stored in the record store.
///
/// Timestamps are readings of the writer's own clock. They are informational
/// for other processes, which judge expiry by their own observation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseRecord {
    /// Stable name of the resource, equal to the record key.
    pub id: String,
    /// Current holder. Empty means unheld.
    pub holder_identity: String,
    /// Fencing term; incremented on every change of holder.
    pub term: u64,
    /// How long the holder's claim is valid without renewal.
    pub lease_duration_ms: u64,
    /// When the current holder acquired the lease.
    pub acquire_time_ms: u64,
    /// When the current holder last renewed. Never below `acquire_time_ms`.
    pub renew_time_ms: u64,
}

impl LeaseRecord {
    /// The record written when a lease is first observed to be absent.
    pub fn unheld(id: impl Into<String>, lease_duration_ms: u64) -> Self {
        Self {
            id: id.into(),
            holder_identity: String::new(),
            term: 0,
            lease_duration_ms,
            acquire_time_ms: 0,
            renew_time_ms: 0,
        }
    }

    /// Whether anyone claims the lease.
    pub fn is_held(&self) -> bool {
        !self.holder_identity.is_empty()
    }

    /// Whether `identity` claims the lease.
    pub fn is_held_by(&self, identity: &str) -> bool {
        self.is_held() && self.holder_identity == identity
    }

    /// The record after `identity` takes over from an unheld or expired claim.
    pub fn acquired_by(&self, identity: &str, lease_duration_ms: u64, now_ms: u64) -> Self {
        Self {
            id: self.id.clone(),
            holder_identity: identity.to_string(),
            term: compute_next_term(self.term),
            lease_duration_ms,
            acquire_time_ms: now_ms,
            renew_time_ms: now_ms,
        }
    }

    /// The record after the current holder renews at `now_ms`.
    pub fn renewed(&self, now_ms: u64) -> Self {
        Self {
            renew_time_ms: compute_renew_time_ms(self.acquire_time_ms, self.renew_time_ms, now_ms),
            ..self.clone()
        }
    }

    /// The record after the current holder gives the lease up. The term is kept
    /// so the next holder still moves it forward.
    pub fn released(&self, now_ms: u64) -> Self {
        Self {
            holder_identity: String::new(),
            renew_time_ms: compute_renew_time_ms(self.acquire_time_ms, self.renew_time_ms, now_ms),
            ..self.clone()
        }
    }

    /// Serialize for the store.
    pub fn encode(&self) -> Result<String, ElectionError> {
        serde_json::to_string(self).map_err(|source| ElectionError::Serialization {
            lease_id: self.id.clone(),
            source,
        })
    }

    /// Parse a payload read from key `lease_id`.
    pub fn decode(lease_id: &str, payload: &str) -> Result<Self, ElectionError> {
        let record: LeaseRecord = serde_json::from_str(payload).map_err(|e| ElectionError::CorruptedRecord {
            lease_id: lease_id.to_string(),
            reason: e.to_string(),
        })?;
        if record.id != lease_id {
            return Err(ElectionError::CorruptedRecord {
                lease_id: lease_id.to_string(),
                reason: format!("record names lease '{}'", record.id),
            });
        }
        if record.renew_time_ms < record.acquire_time_ms {
            return Err(ElectionError::CorruptedRecord {
                lease_id: lease_id.to_string(),
                reason: format!(
                    "renew_time_ms ({}) is before acquire_time_ms ({})",
                    record.renew_time_ms, record.acquire_time_ms
                ),
            });
        }
        Ok(record)
    }
}

/// A lease record together with the version it was read or written at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedLease {
    /// Decoded record.
    pub record: LeaseRecord,
    /// Version to present on the next conditional update.
    pub version: Version,
}

//! Election timing configuration.

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_LEASE_DURATION_MS;
use crate::constants::DEFAULT_MAX_BACKOFF_MULTIPLIER;
use crate::constants::DEFAULT_MAX_LEASES_PER_GROUP;
use crate::constants::DEFAULT_RENEW_DEADLINE_MS;
use crate::constants::DEFAULT_RETRY_PERIOD_MS;
use crate::constants::DEFAULT_SHUTDOWN_GRACE_MS;
use crate::constants::MAX_LEASES_PER_GROUP;
use crate::constants::MAX_NAME_LEN;
use crate::error::ElectionError;
use crate::pure::compute_renew_interval_ms;

/// Timing settings for one lease elector.
///
/// The holder gives up after `renew_deadline_ms` without a successful renewal,
/// which is strictly less than the `lease_duration_ms` challengers wait before
/// treating the lease as expired. That gap is what keeps a deposed holder from
/// overlapping with its successor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionConfig {
    /// How long a claim stays valid without renewal.
    #[serde(default = "default_lease_duration_ms")]
    pub lease_duration_ms: u64,
    /// How long the holder keeps retrying a failed renewal before stepping down.
    #[serde(default = "default_renew_deadline_ms")]
    pub renew_deadline_ms: u64,
    /// Pause between observation polls, and the base of all backoff.
    #[serde(default = "default_retry_period_ms")]
    pub retry_period_ms: u64,
    /// Cap on backoff while the store is unavailable.
    /// Defaults to 8x `retry_period_ms`.
    #[serde(default)]
    pub max_backoff_ms: Option<u64>,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            lease_duration_ms: DEFAULT_LEASE_DURATION_MS, // 15 seconds
            renew_deadline_ms: DEFAULT_RENEW_DEADLINE_MS, // 10 seconds
            retry_period_ms: DEFAULT_RETRY_PERIOD_MS,     // 2 seconds
            max_backoff_ms: None,
        }
    }
}

impl ElectionConfig {
    /// Build a configuration from the three protocol timings.
    pub fn new(lease_duration_ms: u64, renew_deadline_ms: u64, retry_period_ms: u64) -> Self {
        Self {
            lease_duration_ms,
            renew_deadline_ms,
            retry_period_ms,
            max_backoff_ms: None,
        }
    }

    /// Refuse settings under which the protocol could grant overlapping leadership.
    pub fn validate(&self) -> Result<(), ElectionError> {
        if self.lease_duration_ms == 0 {
            return misconfigured("lease_duration_ms must be non-zero");
        }
        if self.renew_deadline_ms == 0 {
            return misconfigured("renew_deadline_ms must be non-zero");
        }
        if self.retry_period_ms == 0 {
            return misconfigured("retry_period_ms must be non-zero");
        }
        if self.renew_deadline_ms >= self.lease_duration_ms {
            return misconfigured(format!(
                "renew_deadline_ms ({}) must be less than lease_duration_ms ({})",
                self.renew_deadline_ms, self.lease_duration_ms
            ));
        }
        if let Some(max_backoff_ms) = self.max_backoff_ms {
            if max_backoff_ms < self.retry_period_ms {
                return misconfigured(format!(
                    "max_backoff_ms ({}) must be at least retry_period_ms ({})",
                    max_backoff_ms, self.retry_period_ms
                ));
            }
        }
        Ok(())
    }

    /// Effective backoff cap.
    pub fn max_backoff_ms(&self) -> u64 {
        self.max_backoff_ms
            .unwrap_or_else(|| self.retry_period_ms.saturating_mul(DEFAULT_MAX_BACKOFF_MULTIPLIER))
    }

    /// Time between renewal attempts while leading.
    pub fn renew_interval_ms(&self) -> u64 {
        compute_renew_interval_ms(self.lease_duration_ms, self.renew_deadline_ms, self.retry_period_ms)
    }

    /// `retry_period_ms` as a `Duration`.
    pub fn retry_period(&self) -> Duration {
        Duration::from_millis(self.retry_period_ms)
    }

    /// `renew_deadline_ms` as a `Duration`.
    pub fn renew_deadline(&self) -> Duration {
        Duration::from_millis(self.renew_deadline_ms)
    }
}

/// Settings shared by every elector in an [`ElectionGroup`](crate::ElectionGroup).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupConfig {
    /// Timings applied to leases added without an explicit configuration.
    #[serde(default)]
    pub election: ElectionConfig,
    /// How long shutdown waits for electors to release before aborting them.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
    /// Maximum number of electors this group runs at once.
    #[serde(default = "default_max_leases")]
    pub max_leases: usize,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            election: ElectionConfig::default(),
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
            max_leases: DEFAULT_MAX_LEASES_PER_GROUP,
        }
    }
}

impl GroupConfig {
    /// Validate the default election timings and group bounds.
    pub fn validate(&self) -> Result<(), ElectionError> {
        self.election.validate()?;
        if self.max_leases == 0 || self.max_leases > MAX_LEASES_PER_GROUP {
            return misconfigured(format!(
                "max_leases must be between 1 and {MAX_LEASES_PER_GROUP}, got {}",
                self.max_leases
            ));
        }
        Ok(())
    }

    /// `shutdown_grace_ms` as a `Duration`.
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Check a lease id or identity for use as a record name or holder value.
pub fn validate_name(kind: &str, name: &str) -> Result<(), ElectionError> {
    if name.is_empty() {
        return misconfigured(format!("{kind} must not be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return misconfigured(format!("{kind} is {} bytes (max: {MAX_NAME_LEN})", name.len()));
    }
    Ok(())
}

fn misconfigured(reason: impl Into<String>) -> Result<(), ElectionError> {
    Err(ElectionError::Misconfiguration { reason: reason.into() })
}

fn default_lease_duration_ms() -> u64 {
    DEFAULT_LEASE_DURATION_MS
}

fn default_renew_deadline_ms() -> u64 {
    DEFAULT_RENEW_DEADLINE_MS
}

fn default_retry_period_ms() -> u64 {
    DEFAULT_RETRY_PERIOD_MS
}

fn default_shutdown_grace_ms() -> u64 {
    DEFAULT_SHUTDOWN_GRACE_MS
}

fn default_max_leases() -> usize {
    DEFAULT_MAX_LEASES_PER_GROUP
}

//! Fixed bounds and defaults for lease election.
//!
//! Tiger Style: every loop and collection in the engine has an explicit
//! upper bound defined here.

/// Default lease duration (15 seconds).
pub const DEFAULT_LEASE_DURATION_MS: u64 = 15_000;

/// Default renew deadline (10 seconds).
pub const DEFAULT_RENEW_DEADLINE_MS: u64 = 10_000;

/// Default retry period between observation polls (2 seconds).
pub const DEFAULT_RETRY_PERIOD_MS: u64 = 2_000;

/// Default cap on unavailable-store backoff, as a multiple of the retry period.
pub const DEFAULT_MAX_BACKOFF_MULTIPLIER: u64 = 8;

/// Observation polls are stretched by up to `1 / POLL_JITTER_DIVISOR` of the
/// retry period (20%).
pub const POLL_JITTER_DIVISOR: u64 = 5;

/// Minimum number of renewal attempts that must fit in one lease duration.
pub const MIN_RENEWALS_PER_LEASE: u64 = 3;

/// Default grace period for group shutdown and lease removal (5 seconds).
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 5_000;

/// Default maximum number of electors a single group runs.
pub const DEFAULT_MAX_LEASES_PER_GROUP: usize = 1_024;

/// Hard ceiling on electors per group regardless of configuration.
pub const MAX_LEASES_PER_GROUP: usize = 65_536;

/// Maximum length of a lease id or holder identity in bytes.
pub const MAX_NAME_LEN: usize = 253;

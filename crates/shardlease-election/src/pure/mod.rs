//! Pure decision functions for lease election.
//!
//! The elector's async loop only performs I/O and sleeps; every decision it
//! makes (is the lease expired, when to renew, what term to write, how long to
//! back off, whether an activation is stale) is computed here from explicit
//! inputs.
//!
//! # Tiger Style
//!
//! - Time is always passed in, never read
//! - Saturating arithmetic throughout
//! - No panics - all functions are total

pub mod backoff;
pub mod fencing;
pub mod lease;

// ============================================================================
// Re-exports: Lease
// ============================================================================

pub use lease::ObservationDecision;
pub use lease::compute_next_term;
pub use lease::compute_renew_budget_ms;
pub use lease::compute_renew_interval_ms;
pub use lease::compute_renew_time_ms;
pub use lease::decide_observation;
pub use lease::is_lease_expired;
pub use lease::is_renew_deadline_exceeded;

// ============================================================================
// Re-exports: Backoff
// ============================================================================

pub use backoff::BackoffResult;
pub use backoff::compute_backoff_with_jitter;
pub use backoff::compute_poll_delay_ms;

// ============================================================================
// Re-exports: Fencing
// ============================================================================

pub use fencing::FenceState;
pub use fencing::admit_start;
pub use fencing::admit_stop;

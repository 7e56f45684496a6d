//! Expiry, pacing and term computations.

use crate::constants::MIN_RENEWALS_PER_LEASE;
use crate::record::LeaseRecord;

/// What an observing elector should do with the record it just read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservationDecision {
    /// The record names us: renew it under the same term.
    Resume,
    /// The record is unheld or its holder's claim has expired: try to take it.
    Acquire,
    /// Someone else holds a live claim: poll again later.
    Wait,
}

/// Whether a claim first observed at `observed_at_ms` has expired at `now_ms`.
///
/// Both readings come from the observer's own clock, so skew between
/// processes only delays contention, it never shortens a claim.
#[inline]
pub fn is_lease_expired(observed_at_ms: u64, now_ms: u64, lease_duration_ms: u64) -> bool {
    now_ms.saturating_sub(observed_at_ms) >= lease_duration_ms
}

/// Decide the next phase after a successful read.
#[inline]
pub fn decide_observation(
    record: &LeaseRecord,
    identity: &str,
    observed_at_ms: u64,
    now_ms: u64,
) -> ObservationDecision {
    if record.is_held_by(identity) {
        ObservationDecision::Resume
    } else if !record.is_held() || is_lease_expired(observed_at_ms, now_ms, record.lease_duration_ms) {
        ObservationDecision::Acquire
    } else {
        ObservationDecision::Wait
    }
}

/// Interval between renewal attempts.
///
/// Never longer than the retry period or the renew deadline, and short enough
/// that at least three attempts fit in one lease duration.
#[inline]
pub fn compute_renew_interval_ms(lease_duration_ms: u64, renew_deadline_ms: u64, retry_period_ms: u64) -> u64 {
    let paced = lease_duration_ms / MIN_RENEWALS_PER_LEASE;
    retry_period_ms.min(paced).min(renew_deadline_ms).max(1)
}

/// Whether a holder whose last successful renewal started at
/// `last_renew_ms` must give up at `now_ms`.
#[inline]
pub fn is_renew_deadline_exceeded(last_renew_ms: u64, now_ms: u64, renew_deadline_ms: u64) -> bool {
    now_ms.saturating_sub(last_renew_ms) >= renew_deadline_ms
}

/// Time left, at `now_ms`, for a holder to complete a renewal before its
/// renew deadline. Zero once the deadline has been reached.
#[inline]
pub fn compute_renew_budget_ms(last_renew_ms: u64, now_ms: u64, renew_deadline_ms: u64) -> u64 {
    last_renew_ms.saturating_add(renew_deadline_ms).saturating_sub(now_ms)
}

/// Renew timestamp to write: strictly after the previous one and never before
/// the acquisition, even if this process's clock lags the previous writer's.
#[inline]
pub fn compute_renew_time_ms(acquire_time_ms: u64, previous_renew_ms: u64, now_ms: u64) -> u64 {
    now_ms.max(previous_renew_ms.saturating_add(1)).max(acquire_time_ms)
}

/// Term written by a new holder.
#[inline]
pub fn compute_next_term(current_term: u64) -> u64 {
    current_term.saturating_add(1)
}

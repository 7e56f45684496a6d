//! Poll pacing and unavailable-store backoff.

use crate::constants::POLL_JITTER_DIVISOR;

/// Result of a backoff computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffResult {
    /// How long to sleep now.
    pub sleep_ms: u64,
    /// Backoff base for the next consecutive failure.
    pub next_backoff_ms: u64,
}

/// Delay before the next observation poll: the retry period stretched by a
/// jitter below 20% of it, so contenders started together drift apart.
#[inline]
pub fn compute_poll_delay_ms(retry_period_ms: u64, jitter_seed: u64) -> u64 {
    let max_jitter = retry_period_ms / POLL_JITTER_DIVISOR;
    if max_jitter == 0 {
        return retry_period_ms;
    }
    retry_period_ms.saturating_add(jitter_seed % max_jitter)
}

/// Exponential backoff with jitter of at most half the current backoff.
#[inline]
pub fn compute_backoff_with_jitter(current_backoff_ms: u64, max_backoff_ms: u64, jitter_seed: u64) -> BackoffResult {
    let max_jitter = current_backoff_ms.saturating_div(2).saturating_add(1);
    let jitter = jitter_seed % max_jitter;

    let sleep_ms = current_backoff_ms.saturating_add(jitter).min(max_backoff_ms.max(current_backoff_ms));
    let next_backoff_ms = current_backoff_ms.saturating_mul(2).min(max_backoff_ms);

    BackoffResult {
        sleep_ms,
        next_backoff_ms,
    }
}

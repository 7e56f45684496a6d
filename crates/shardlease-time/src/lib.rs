//! Time sources for lease election.
//!
//! Every timing decision the election engine makes (lease expiry, renew
//! deadlines, poll pacing, store-call timeouts) goes through the [`Clock`]
//! trait so a whole cluster of contenders can be driven deterministically in
//! tests.
//!
//! # Clock implementations
//!
//! - [`MonotonicClock`] for production. It is anchored at the Unix time of its
//!   construction and advances with the tokio timer, so it never goes
//!   backwards and it follows virtual time under a paused tokio runtime.
//! - [`SimulatedClock`] (behind the `simulation` feature) for tests that step
//!   time by hand. Sleepers wake once the clock is advanced past their
//!   deadline.
//!
//! # Tiger Style
//!
//! - No `.expect()` or `.unwrap()` - safe fallback to 0
//! - Saturating arithmetic on every timestamp

use std::future::Future;
#[cfg(feature = "simulation")]
use std::sync::Arc;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use snafu::Snafu;
#[cfg(feature = "simulation")]
use tokio::sync::watch;

// ============================================================================
// Free Functions
// ============================================================================

/// Get current Unix timestamp in milliseconds.
///
/// Returns 0 if system time is before UNIX epoch.
#[inline]
pub fn current_time_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

// ============================================================================
// Clock Trait
// ============================================================================

/// Injectable monotonic time source.
///
/// `now_ms` must never decrease for a given clock instance. Values from two
/// different clock instances are not comparable; the election engine only
/// ever compares readings from its own clock.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current time in milliseconds.
    fn now_ms(&self) -> u64;

    /// Suspend the calling task for `duration` as measured by this clock.
    async fn sleep(&self, duration: Duration);
}

#[async_trait]
impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }

    async fn sleep(&self, duration: Duration) {
        (**self).sleep(duration).await
    }
}

/// Error returned by [`timeout`] when the deadline passes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Snafu)]
#[snafu(display("operation timed out after {duration_ms}ms"))]
pub struct Elapsed {
    /// The bound that was exceeded.
    pub duration_ms: u64,
}

/// Run `future` to completion unless `duration` passes on `clock` first.
///
/// The future is polled before the timer on every wakeup, so a future that is
/// ready at the same instant the deadline fires still wins.
pub async fn timeout<C, F>(clock: &C, duration: Duration, future: F) -> Result<F::Output, Elapsed>
where
    C: Clock + ?Sized,
    F: Future,
{
    tokio::select! {
        biased;
        output = future => Ok(output),
        _ = clock.sleep(duration) => Err(Elapsed {
            duration_ms: duration.as_millis() as u64,
        }),
    }
}

// ============================================================================
// MonotonicClock (Production)
// ============================================================================

/// Production clock driven by the tokio timer.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: tokio::time::Instant,
    epoch_ms: u64,
}

impl MonotonicClock {
    /// Create a clock whose readings start at the current Unix time.
    pub fn new() -> Self {
        Self::with_epoch_ms(current_time_ms())
    }

    /// Create a clock whose first reading is `epoch_ms`.
    pub fn with_epoch_ms(epoch_ms: u64) -> Self {
        Self {
            origin: tokio::time::Instant::now(),
            epoch_ms,
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for MonotonicClock {
    #[inline]
    fn now_ms(&self) -> u64 {
        self.epoch_ms.saturating_add(self.origin.elapsed().as_millis() as u64)
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await
    }
}

// ============================================================================
// SimulatedClock (Testing)
// ============================================================================

/// Manually advanced clock for deterministic tests.
///
/// Cloned handles share the same timeline.
///
/// ```ignore
/// use shardlease_time::{Clock, SimulatedClock};
///
/// let clock = SimulatedClock::new(1_000);
/// clock.advance_ms(500);
/// assert_eq!(clock.now_ms(), 1_500);
/// ```
#[cfg(feature = "simulation")]
#[derive(Debug, Clone)]
pub struct SimulatedClock {
    now: Arc<watch::Sender<u64>>,
}

#[cfg(feature = "simulation")]
impl SimulatedClock {
    /// Create a simulated clock starting at `initial_ms`.
    pub fn new(initial_ms: u64) -> Self {
        let (now, _) = watch::channel(initial_ms);
        Self { now: Arc::new(now) }
    }

    /// Move time forward, waking every sleeper whose deadline has passed.
    pub fn advance_ms(&self, delta_ms: u64) {
        self.now.send_modify(|now| *now = now.saturating_add(delta_ms));
    }

    /// Jump to `time_ms`. Ignored if it would move the clock backwards.
    pub fn set_ms(&self, time_ms: u64) {
        self.now.send_if_modified(|now| {
            if time_ms > *now {
                *now = time_ms;
                true
            } else {
                false
            }
        });
    }

    /// Number of tasks currently suspended on this clock.
    pub fn sleeper_count(&self) -> usize {
        self.now.receiver_count()
    }

    /// Suspend until the clock reads at least `deadline_ms`.
    pub async fn sleep_until(&self, deadline_ms: u64) {
        let mut rx = self.now.subscribe();
        // The sender lives as long as `self`, so `wait_for` cannot observe a
        // closed channel while we borrow it.
        let _ = rx.wait_for(|now| *now >= deadline_ms).await;
    }
}

#[cfg(feature = "simulation")]
impl Default for SimulatedClock {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(feature = "simulation")]
#[async_trait]
impl Clock for SimulatedClock {
    #[inline]
    fn now_ms(&self) -> u64 {
        *self.now.borrow()
    }

    async fn sleep(&self, duration: Duration) {
        let deadline_ms = self.now_ms().saturating_add(duration.as_millis() as u64);
        self.sleep_until(deadline_ms).await
    }
}

// ============================================================================
// Tests
// ============================================================================

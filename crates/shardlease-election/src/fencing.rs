//! Fencing filter in front of a downstream workload.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::debug;

use crate::pure::FenceState;
use crate::pure::admit_start;
use crate::pure::admit_stop;
use crate::sink::Activation;
use crate::sink::ActivationSink;

/// Wraps a sink and drops activations from superseded terms.
///
/// However late a deposed elector's transition arrives, the inner sink never
/// sees two active terms for the same lease: a start is forwarded only if its
/// term is at least the newest one seen, and a stop only if it ends the term
/// that is currently active.
///
/// Terms restart from zero if an operator deletes a lease record. Call
/// [`FencedSink::reset`] for that lease when that happens.
pub struct FencedSink<S> {
    inner: S,
    leases: Mutex<HashMap<String, FenceState>>,
}

impl<S: ActivationSink> FencedSink<S> {
    /// Put a fencing filter in front of `inner`.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            leases: Mutex::new(HashMap::new()),
        }
    }

    /// Whether work tagged with `term` may still run for `lease_id`.
    pub fn is_current(&self, lease_id: &str, term: u64) -> bool {
        self.leases.lock().get(lease_id).is_some_and(|state| state.active && state.latest_term == term)
    }

    /// Newest term admitted for `lease_id`.
    pub fn latest_term(&self, lease_id: &str) -> Option<u64> {
        self.leases.lock().get(lease_id).map(|state| state.latest_term)
    }

    /// Whether `lease_id` currently has an active term.
    pub fn is_active(&self, lease_id: &str) -> bool {
        self.leases.lock().get(lease_id).is_some_and(|state| state.active)
    }

    /// Forget everything about `lease_id`.
    pub fn reset(&self, lease_id: &str) {
        self.leases.lock().remove(lease_id);
    }

    /// The wrapped sink.
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: ActivationSink> ActivationSink for FencedSink<S> {
    fn deliver(&self, activation: Activation) {
        // Forward while holding the lock so admitted transitions reach the
        // inner sink in admission order.
        let mut leases = self.leases.lock();
        let current = leases.get(&activation.lease_id).copied().unwrap_or_default();
        let next = if activation.is_active {
            admit_start(current, activation.term)
        } else {
            admit_stop(current, activation.term)
        };

        match next {
            Some(state) => {
                leases.insert(activation.lease_id.clone(), state);
                self.inner.deliver(activation);
            }
            None => {
                debug!(
                    lease_id = %activation.lease_id,
                    term = activation.term,
                    is_active = activation.is_active,
                    latest_term = current.latest_term,
                    "dropping stale activation"
                );
            }
        }
    }

    fn observed(&self, lease_id: &str, holder: &str, term: u64) {
        self.inner.observed(lease_id, holder, term)
    }
}

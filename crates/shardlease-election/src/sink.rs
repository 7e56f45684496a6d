//! Callback seams between electors and the downstream workload.

use std::sync::Arc;

use tokio::sync::mpsc;

/// Per-lease transition callbacks, invoked from the elector's own task in the
/// order the transitions happen. Implementations must return quickly: a slow
/// callback delays the elector's next renewal.
pub trait ElectionCallbacks: Send + Sync {
    /// This process became the leader under `term`.
    fn on_start(&self, term: u64);

    /// This process stopped being the leader it became under `term`.
    fn on_stop(&self, term: u64);

    /// A read returned `holder` (empty if unheld) at `term`.
    fn on_observe(&self, holder: &str, term: u64) {
        let _ = (holder, term);
    }
}

impl<T: ElectionCallbacks + ?Sized> ElectionCallbacks for Arc<T> {
    fn on_start(&self, term: u64) {
        (**self).on_start(term)
    }

    fn on_stop(&self, term: u64) {
        (**self).on_stop(term)
    }

    fn on_observe(&self, holder: &str, term: u64) {
        (**self).on_observe(holder, term)
    }
}

/// One activation transition for one lease.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Activation {
    /// Lease the transition is for.
    pub lease_id: String,
    /// Whether the workload for this lease should now run.
    pub is_active: bool,
    /// Fencing term of the leadership that started or ended.
    pub term: u64,
}

impl Activation {
    /// An activation under `term`.
    pub fn started(lease_id: impl Into<String>, term: u64) -> Self {
        Self {
            lease_id: lease_id.into(),
            is_active: true,
            term,
        }
    }

    /// A deactivation of the leadership held under `term`.
    pub fn stopped(lease_id: impl Into<String>, term: u64) -> Self {
        Self {
            lease_id: lease_id.into(),
            is_active: false,
            term,
        }
    }
}

/// Receiver of activation transitions from an [`ElectionGroup`](crate::ElectionGroup).
///
/// Transitions for one lease arrive one at a time and in order. There is no
/// ordering across leases. `deliver` must not block.
pub trait ActivationSink: Send + Sync {
    /// Handle one transition.
    fn deliver(&self, activation: Activation);

    /// A read of `lease_id` named `holder` at `term`. Defaults to ignoring it.
    fn observed(&self, lease_id: &str, holder: &str, term: u64) {
        let _ = (lease_id, holder, term);
    }
}

impl<T: ActivationSink + ?Sized> ActivationSink for Arc<T> {
    fn deliver(&self, activation: Activation) {
        (**self).deliver(activation)
    }

    fn observed(&self, lease_id: &str, holder: &str, term: u64) {
        (**self).observed(lease_id, holder, term)
    }
}

/// Sink forwarding every transition into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Activation>,
}

impl ChannelSink {
    /// Create a sink and the receiver that drains it.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Activation>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ActivationSink for ChannelSink {
    fn deliver(&self, activation: Activation) {
        // A dropped receiver means nobody is consuming; nothing to fence.
        let _ = self.tx.send(activation);
    }
}

/// Adapts a sink to the callbacks of a single lease elector.
pub(crate) struct LeaseForwarder {
    lease_id: String,
    sink: Arc<dyn ActivationSink>,
}

impl LeaseForwarder {
    pub(crate) fn new(lease_id: String, sink: Arc<dyn ActivationSink>) -> Self {
        Self { lease_id, sink }
    }
}

impl ElectionCallbacks for LeaseForwarder {
    fn on_start(&self, term: u64) {
        self.sink.deliver(Activation::started(self.lease_id.clone(), term));
    }

    fn on_stop(&self, term: u64) {
        self.sink.deliver(Activation::stopped(self.lease_id.clone(), term));
    }

    fn on_observe(&self, holder: &str, term: u64) {
        self.sink.observed(&self.lease_id, holder, term);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_sink_preserves_order() {
        let (sink, mut rx) = ChannelSink::channel();
        sink.deliver(Activation::started("p-0", 1));
        sink.deliver(Activation::stopped("p-0", 1));

        assert_eq!(rx.recv().await.unwrap(), Activation::started("p-0", 1));
        assert_eq!(rx.recv().await.unwrap(), Activation::stopped("p-0", 1));
    }

    #[test]
    fn channel_sink_tolerates_dropped_receiver() {
        let (sink, rx) = ChannelSink::channel();
        drop(rx);
        sink.deliver(Activation::started("p-0", 1));
    }

    #[tokio::test]
    async fn forwarder_tags_lease_id() {
        let (sink, mut rx) = ChannelSink::channel();
        let forwarder = LeaseForwarder::new("orders-3".into(), Arc::new(sink));
        forwarder.on_start(7);
        forwarder.on_observe("someone", 7);
        forwarder.on_stop(7);

        assert_eq!(rx.recv().await.unwrap(), Activation::started("orders-3", 7));
        assert_eq!(rx.recv().await.unwrap(), Activation::stopped("orders-3", 7));
    }
}

//! Lease-based leader election over a versioned record store.
//!
//! Each contested resource (a partition, a singleton job) has one
//! [`LeaseRecord`] in a [`VersionedRecordStore`](shardlease_store::VersionedRecordStore).
//! A [`LeaderElector`] claims, renews and releases that record with
//! conditional writes only, so at most one identity believes it leads a given
//! lease at any instant. Every leadership carries a fencing term that strictly
//! increases across holders.
//!
//! An [`ElectionGroup`] runs many electors for one identity and routes their
//! transitions to an [`ActivationSink`]. Wrap the sink in a [`FencedSink`] to
//! drop transitions that arrive under a superseded term.
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use shardlease_election::{ChannelSink, ElectionGroup, FencedSink, GroupConfig};
//! use shardlease_store::InMemoryRecordStore;
//! use shardlease_time::MonotonicClock;
//!
//! let (sink, mut activations) = ChannelSink::channel();
//! let group = ElectionGroup::new(
//!     Arc::new(InMemoryRecordStore::new()),
//!     Arc::new(MonotonicClock::new()),
//!     "worker-a",
//!     GroupConfig::default(),
//!     Arc::new(FencedSink::new(sink)),
//! )?;
//! group.add_lease("orders-0")?;
//! ```

mod config;
pub mod constants;
mod elector;
mod error;
mod fencing;
mod group;
mod lease_store;
pub mod pure;
mod record;
mod sink;
mod state;

pub use config::ElectionConfig;
pub use config::GroupConfig;
pub use config::validate_name;
pub use elector::LeaderElector;
pub use error::ElectionError;
pub use error::GroupError;
pub use fencing::FencedSink;
pub use group::ElectionGroup;
pub use group::ShutdownReport;
pub use lease_store::LeaseStore;
pub use record::LeaseRecord;
pub use record::ObservedLease;
pub use sink::Activation;
pub use sink::ActivationSink;
pub use sink::ChannelSink;
pub use sink::ElectionCallbacks;
pub use state::ElectionPhase;
pub use state::LocalElectionState;

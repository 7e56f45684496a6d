//! Shardlease: lease-based leader election for partitioned workloads.
//!
//! This crate bundles the election engine with the configuration layer and
//! the failover demo used by the `shardlease-demo` binary.
//!
//! - [`shardlease_election`]: electors, groups, sinks and fencing
//! - [`shardlease_store`]: the versioned record store contract and the
//!   in-memory reference store
//! - [`shardlease_time`]: injectable clocks

pub mod config;
pub mod demo;

pub use shardlease_election::Activation;
pub use shardlease_election::ActivationSink;
pub use shardlease_election::ChannelSink;
pub use shardlease_election::ElectionCallbacks;
pub use shardlease_election::ElectionConfig;
pub use shardlease_election::ElectionError;
pub use shardlease_election::ElectionGroup;
pub use shardlease_election::ElectionPhase;
pub use shardlease_election::FencedSink;
pub use shardlease_election::GroupConfig;
pub use shardlease_election::GroupError;
pub use shardlease_election::LeaderElector;
pub use shardlease_election::LeaseRecord;
pub use shardlease_election::LocalElectionState;
pub use shardlease_election::ShutdownReport;
pub use shardlease_store::InMemoryRecordStore;
pub use shardlease_store::StoreError;
pub use shardlease_store::VersionedRecordStore;
pub use shardlease_time::Clock;
pub use shardlease_time::MonotonicClock;

//! Multi-contender failover demo.
//!
//! Runs several simulated processes, each an [`ElectionGroup`] with its own
//! identity, against one shared [`InMemoryRecordStore`]. Every activation is
//! logged through a [`FencedSink`] so superseded transitions never reach the
//! "workload".

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use futures::future::join_all;
use shardlease_election::Activation;
use shardlease_election::ActivationSink;
use shardlease_election::ElectionGroup;
use shardlease_election::FencedSink;
use shardlease_election::GroupError;
use shardlease_election::ShutdownReport;
use shardlease_store::InMemoryClient;
use shardlease_store::InMemoryRecordStore;
use shardlease_time::Clock;
use snafu::ResultExt;
use snafu::Snafu;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::config::ConfigError;
use crate::config::NodeConfig;

/// Errors from a demo run.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DemoError {
    #[snafu(display("invalid demo configuration: {source}"))]
    Config { source: ConfigError },

    #[snafu(display("contender '{identity}' failed: {source}"))]
    Contender { identity: String, source: GroupError },
}

/// Sink standing in for a real workload: logs transitions and counts them.
#[derive(Debug)]
pub struct LoggingSink {
    identity: String,
    starts: AtomicU64,
    stops: AtomicU64,
}

impl LoggingSink {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            starts: AtomicU64::new(0),
            stops: AtomicU64::new(0),
        }
    }

    /// Activations delivered so far.
    pub fn starts(&self) -> u64 {
        self.starts.load(Ordering::Relaxed)
    }

    /// Deactivations delivered so far.
    pub fn stops(&self) -> u64 {
        self.stops.load(Ordering::Relaxed)
    }
}

impl ActivationSink for LoggingSink {
    fn deliver(&self, activation: Activation) {
        if activation.is_active {
            self.starts.fetch_add(1, Ordering::Relaxed);
            info!(identity = %self.identity, lease_id = %activation.lease_id, term = activation.term, "workload started");
        } else {
            self.stops.fetch_add(1, Ordering::Relaxed);
            info!(identity = %self.identity, lease_id = %activation.lease_id, term = activation.term, "workload stopped");
        }
    }

    fn observed(&self, lease_id: &str, holder: &str, term: u64) {
        debug!(identity = %self.identity, lease_id, holder, term, "observed lease");
    }
}

/// One simulated process.
struct Contender {
    identity: String,
    group: ElectionGroup<InMemoryClient>,
    sink: Arc<FencedSink<LoggingSink>>,
}

/// Per-contender summary at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContenderReport {
    pub identity: String,
    /// Leases this contender led just before shutdown.
    pub active_at_end: BTreeSet<String>,
    pub starts: u64,
    pub stops: u64,
    pub shutdown: ShutdownReport,
}

/// Summary of a demo run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoReport {
    pub contenders: Vec<ContenderReport>,
    /// Whether the first contender was cut off from the store.
    pub crashed: bool,
}

impl DemoReport {
    /// Number of contenders that led `lease_id` at the end.
    pub fn leaders_of(&self, lease_id: &str) -> usize {
        self.contenders.iter().filter(|c| c.active_at_end.contains(lease_id)).count()
    }
}

/// Run the demo until `run_for_ms` elapses on `clock` or `shutdown` fires.
pub async fn run(
    config: &NodeConfig,
    store: &InMemoryRecordStore,
    clock: Arc<dyn Clock>,
    shutdown: CancellationToken,
) -> Result<DemoReport, DemoError> {
    config.validate().context(ConfigSnafu)?;

    let mut contenders = Vec::with_capacity(config.contenders);
    for index in 0..config.contenders {
        let identity = config.contender_identity(index);
        let sink = Arc::new(FencedSink::new(LoggingSink::new(identity.clone())));
        let group = ElectionGroup::new(
            Arc::new(store.client(identity.clone())),
            clock.clone(),
            identity.clone(),
            config.group_config(),
            sink.clone(),
        )
        .context(ContenderSnafu { identity: identity.clone() })?;
        for lease in &config.leases {
            group.add_lease(lease.clone()).context(ContenderSnafu { identity: identity.clone() })?;
        }
        contenders.push(Contender { identity, group, sink });
    }
    info!(contenders = contenders.len(), leases = config.leases.len(), "demo started");

    let run_for = clock.sleep(Duration::from_millis(config.run_for_ms));
    let crash = async {
        match config.crash_after_ms {
            Some(after_ms) => clock.sleep(Duration::from_millis(after_ms)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(run_for);
    tokio::pin!(crash);

    let mut crashed = false;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("demo interrupted");
                break;
            }
            _ = &mut run_for => break,
            _ = &mut crash, if !crashed => {
                crashed = true;
                if let Some(first) = contenders.first() {
                    warn!(identity = %first.identity, "cutting contender off from the store");
                    store.partition(&first.identity, true);
                }
            }
        }
    }

    let snapshots: Vec<BTreeSet<String>> = contenders.iter().map(|c| c.group.active_leases()).collect();
    let shutdowns = join_all(contenders.iter().map(|c| c.group.shutdown())).await;

    let contenders = contenders
        .into_iter()
        .zip(snapshots)
        .zip(shutdowns)
        .map(|((contender, active_at_end), shutdown)| ContenderReport {
            starts: contender.sink.inner().starts(),
            stops: contender.sink.inner().stops(),
            identity: contender.identity,
            active_at_end,
            shutdown,
        })
        .collect();

    Ok(DemoReport { contenders, crashed })
}

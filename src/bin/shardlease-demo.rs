//! Shardlease demo binary - simulated failover between contenders.
//!
//! Starts several simulated processes contending for the same leases over a
//! shared in-memory record store and logs every activation. With
//! `--crash-after-ms` the first contender is cut off from the store, which
//! shows the holder stepping down and a peer taking over with a higher term.
//!
//! # Usage
//!
//! ```bash
//! # Three contenders, three leases, fast timings
//! shardlease-demo --lease-duration-ms 3000 --renew-deadline-ms 2000 --retry-period-ms 500
//!
//! # Failover after five seconds
//! shardlease-demo --crash-after-ms 5000 --run-for-ms 20000
//!
//! # From a TOML file, overridden by the environment and flags
//! export SHARDLEASE_CONTENDERS=5
//! shardlease-demo --config demo.toml
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use shardlease::config::NodeConfig;
use shardlease::demo;
use shardlease_store::InMemoryRecordStore;
use shardlease_time::MonotonicClock;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "shardlease-demo")]
#[command(about = "Lease-based leader election failover demo")]
struct Args {
    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Identity prefix for the simulated contenders.
    #[arg(long)]
    identity: Option<String>,

    /// Lease ids to contend for (comma-separated or repeated).
    #[arg(long = "lease", value_delimiter = ',')]
    leases: Vec<String>,

    /// Lease duration in milliseconds.
    #[arg(long)]
    lease_duration_ms: Option<u64>,

    /// Renew deadline in milliseconds. Must be less than the lease duration.
    #[arg(long)]
    renew_deadline_ms: Option<u64>,

    /// Retry period in milliseconds.
    #[arg(long)]
    retry_period_ms: Option<u64>,

    /// Backoff cap while the store is unavailable.
    #[arg(long)]
    max_backoff_ms: Option<u64>,

    /// Grace period for releases at shutdown.
    #[arg(long)]
    shutdown_grace_ms: Option<u64>,

    /// Number of simulated contenders.
    #[arg(long)]
    contenders: Option<usize>,

    /// How long to run before shutting down.
    #[arg(long)]
    run_for_ms: Option<u64>,

    /// Cut the first contender off from the store after this long.
    #[arg(long)]
    crash_after_ms: Option<u64>,
}

/// Initialize tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).compact().init();
}

/// Layer CLI flags over the defaults so `merge` only sees what was given.
fn cli_config(args: &Args) -> NodeConfig {
    let mut config = NodeConfig::default();
    if let Some(identity) = &args.identity {
        config.identity = identity.clone();
    }
    if !args.leases.is_empty() {
        config.leases = args.leases.clone();
    }
    if let Some(ms) = args.lease_duration_ms {
        config.election.lease_duration_ms = ms;
    }
    if let Some(ms) = args.renew_deadline_ms {
        config.election.renew_deadline_ms = ms;
    }
    if let Some(ms) = args.retry_period_ms {
        config.election.retry_period_ms = ms;
    }
    config.election.max_backoff_ms = args.max_backoff_ms;
    if let Some(ms) = args.shutdown_grace_ms {
        config.shutdown_grace_ms = ms;
    }
    if let Some(contenders) = args.contenders {
        config.contenders = contenders;
    }
    if let Some(ms) = args.run_for_ms {
        config.run_for_ms = ms;
    }
    config.crash_after_ms = args.crash_after_ms;
    config
}

fn load_config(args: &Args) -> Result<NodeConfig> {
    let mut config = NodeConfig::from_env();
    if let Some(path) = &args.config {
        let file = NodeConfig::from_toml_file(path).with_context(|| format!("loading {}", path.display()))?;
        config.merge(file);
    }
    config.merge(cli_config(args));
    config.validate().context("invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let config = load_config(&args)?;

    info!(
        identity = %config.identity,
        leases = ?config.leases,
        contenders = config.contenders,
        lease_duration_ms = config.election.lease_duration_ms,
        renew_deadline_ms = config.election.renew_deadline_ms,
        retry_period_ms = config.election.retry_period_ms,
        "starting shardlease demo"
    );

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl-C, shutting down");
                ctrl_c.cancel();
            }
            Err(e) => warn!(error = %e, "failed to listen for Ctrl-C"),
        }
    });

    let store = InMemoryRecordStore::new();
    let report = demo::run(&config, &store, Arc::new(MonotonicClock::new()), shutdown).await?;

    for contender in &report.contenders {
        info!(
            identity = %contender.identity,
            active = ?contender.active_at_end,
            starts = contender.starts,
            stops = contender.stops,
            clean_shutdown = contender.shutdown.is_clean(),
            "contender finished"
        );
    }
    info!(writes = store.write_count(), crashed = report.crashed, "demo finished");
    Ok(())
}

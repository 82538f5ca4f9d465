//! Cohort Cluster CLI
//!
//! Runs a cluster of peers in one process, each on its own tokio task, and
//! prints per-peer statistics when it stops.

use anyhow::{bail, Context, Result};
use clap::Parser;
use cohort_production::{run_cluster, ClusterConfig};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cohort-cluster")]
#[command(about = "Run a cohort cluster over in-process channels")]
#[command(version)]
struct Cli {
    /// TOML cluster configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of peers (overrides the config file)
    #[arg(short, long)]
    peers: Option<usize>,

    /// Seconds of paced activity (overrides the config file)
    #[arg(short, long)]
    duration_secs: Option<u64>,

    /// Base seed (overrides the config file)
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ClusterConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ClusterConfig::default(),
    };
    if let Some(peers) = cli.peers {
        config.peers = peers;
    }
    if let Some(secs) = cli.duration_secs {
        config = config.with_duration(Duration::from_secs(secs));
    }
    if let Some(seed) = cli.seed {
        config.node.seed = seed;
    }

    let report = run_cluster(&config).await?;

    println!("peer  grants  cycles  sent  received  dropped");
    for peer in &report.peers {
        let stats = peer.stats();
        println!(
            "{:>4}  {:>6}  {:>6}  {:>4}  {:>8}  {:>7}",
            peer.peer.0,
            stats.grants,
            stats.cycles_completed,
            peer.io.envelopes_sent,
            peer.io.envelopes_received,
            stats.envelopes_dropped,
        );
    }
    println!(
        "total: {} grants, {} cycles",
        report.total_grants(),
        report.cycles_completed()
    );

    if report.envelopes_dropped() > 0 {
        bail!("{} envelopes were dropped", report.envelopes_dropped());
    }
    Ok(())
}

//! Cohort Simulator CLI
//!
//! Runs the paced workflow over a simulated cluster, checks invariants after
//! every event, and prints a report per seed.

use clap::Parser;
use cohort_node::NodeConfig;
use cohort_simulator::{sweep, SimulatorConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cohort-sim")]
#[command(about = "Deterministic simulator for the cohort mutex protocol")]
#[command(version)]
struct Cli {
    /// Number of peers
    #[arg(short, long, default_value = "5")]
    peers: usize,

    /// First seed
    #[arg(long, default_value = "12345")]
    seed: u64,

    /// Number of consecutive seeds to run, in parallel
    #[arg(long, default_value = "1")]
    seeds: u64,

    /// Simulated seconds with pacing on
    #[arg(short, long, default_value = "30")]
    duration_secs: u64,

    /// Maximum pause between a peer's pacing rounds, in milliseconds
    #[arg(long, default_value = "50")]
    pacing_jitter_ms: u64,

    /// Base network latency, in milliseconds
    #[arg(long, default_value = "5")]
    latency_ms: u64,

    /// Maximum extra network latency, in milliseconds
    #[arg(long, default_value = "10")]
    jitter_ms: u64,

    /// TOML file with the domains and workflow each peer runs
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn load_node_config(path: &PathBuf) -> Result<NodeConfig, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)?;
    let config: NodeConfig = toml::from_str(&text)?;
    config.validate()?;
    Ok(config)
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let node = match &cli.config {
        Some(path) => load_node_config(path)?,
        None => NodeConfig::default(),
    };
    let config = SimulatorConfig::new(cli.peers)
        .with_node(node)
        .with_latency(
            Duration::from_millis(cli.latency_ms),
            Duration::from_millis(cli.jitter_ms),
        )
        .with_pacing_jitter(Duration::from_millis(cli.pacing_jitter_ms))
        .with_duration(Duration::from_secs(cli.duration_secs));

    let seeds: Vec<u64> = (cli.seed..cli.seed.saturating_add(cli.seeds.max(1))).collect();
    let mut clean = true;
    for report in sweep(&config, &seeds) {
        let report = report?;
        println!("{report}");
        clean &= report.is_clean();
    }

    Ok(if clean {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

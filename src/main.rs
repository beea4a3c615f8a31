use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use poe_chain::config::ChainConfig;
use poe_chain::sim::{synthetic_tracks, Simulation};
use poe_chain::telemetry::{derive_trajectory, load_tracks};

#[derive(Parser)]
#[command(author, version, about = "Dual-chain vehicular consensus node")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the dual-chain simulation from a configuration file
    Run {
        #[arg(short, long, default_value = "config/chain.toml")]
        config: PathBuf,
        /// Telemetry CSV; synthetic tracks are generated when omitted
        #[arg(long)]
        telemetry: Option<PathBuf>,
        #[arg(long)]
        rounds: Option<usize>,
        /// Validator committee size N (at least 4)
        #[arg(long)]
        committee_size: Option<usize>,
        #[arg(long, default_value_t = 7)]
        seed: u64,
        /// Fleet size when generating synthetic tracks
        #[arg(long, default_value_t = 12)]
        vehicles: usize,
    },
    /// Write a default configuration file
    GenerateConfig {
        #[arg(short, long, default_value = "config/chain.toml")]
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            config,
            telemetry,
            rounds,
            committee_size,
            seed,
            vehicles,
        } => run(config, telemetry, rounds, committee_size, seed, vehicles),
        Commands::GenerateConfig { path } => generate_config(path),
    }
}

fn run(
    config_path: PathBuf,
    telemetry: Option<PathBuf>,
    rounds: Option<usize>,
    committee_size: Option<usize>,
    seed: u64,
    vehicles: usize,
) -> Result<()> {
    let mut config = if config_path.exists() {
        ChainConfig::load(&config_path)?
    } else {
        let config = ChainConfig::default();
        config.save(&config_path)?;
        config
    };
    if let Some(rounds) = rounds {
        config.rounds = rounds;
    }
    if let Some(size) = committee_size {
        config.committee_size = Some(size);
    }
    let telemetry = telemetry.or_else(|| config.telemetry_path.clone());

    let trajectories = match telemetry {
        Some(path) => load_tracks(&path)?
            .into_iter()
            .map(|(id, points)| (id, derive_trajectory(&points)))
            .collect(),
        None => {
            info!(vehicles, "no telemetry capture given, generating synthetic tracks");
            synthetic_tracks(vehicles, config.rounds, seed)
        }
    };

    let mut simulation = Simulation::new(config, trajectories, seed)?;
    let summary = simulation.run()?;

    info!(
        rounds = summary.rounds,
        normal_height = summary.normal_height,
        priority_height = summary.priority_height,
        pending_priority = summary.pending_priority,
        chains_agree = summary.chains_agree,
        "simulation finished"
    );
    for (rank, (id, score)) in summary.final_reputations.iter().enumerate() {
        info!(rank = rank + 1, node = %id, score, "final reputation");
    }
    Ok(())
}

fn generate_config(path: PathBuf) -> Result<()> {
    let config = ChainConfig::default();
    config.save(&path)?;
    info!(?path, "wrote default configuration");
    Ok(())
}

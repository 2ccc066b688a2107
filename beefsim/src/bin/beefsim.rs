//! Replays a traces directory and prints the energy summary.
//!
//! ```text
//! beefsim --config sim.toml --seed 42 -vv
//! ```

use std::path::PathBuf;

use beefsim::{SimulationBuilder, SimulationConfig};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CLI arguments
#[derive(Parser, Debug)]
#[command(name = "beefsim")]
#[command(about = "Energy simulation of a replicated file system on sleeping desktops", long_about = None)]
struct Args {
    /// Simulation configuration file (TOML)
    #[arg(long, short)]
    config: PathBuf,

    /// Seed for placement draws, overriding the configuration
    #[arg(long)]
    seed: Option<u64>,

    /// Increase logging verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let default_level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    let mut config = SimulationConfig::load(&args.config)?;
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }

    let mut simulation = SimulationBuilder::from_config(&config)?.build()?;
    let summary = simulation.run()?;
    println!("{summary}");
    Ok(())
}

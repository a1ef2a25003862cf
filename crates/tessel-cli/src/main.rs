//! Headless harness for the Tessel simulation core.

mod commands;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "tessel",
    about = "Tessel, a component store with a quadtree spatial index for 2D simulations",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Spawn moving entities, run ticks and report spatial index metrics
    Simulate {
        /// Number of entities to spawn
        #[arg(short, long, default_value = "200")]
        entities: usize,

        /// Number of ticks to run
        #[arg(short, long, default_value = "120")]
        ticks: u64,

        /// RNG seed for deterministic runs
        #[arg(short, long, default_value = "42")]
        seed: u64,

        /// World configuration file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Enable spatial auto-tuning regardless of the configuration
        #[arg(long)]
        auto_tune: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective world configuration as JSON
    Config {
        /// World configuration file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tessel=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Simulate {
            entities,
            ticks,
            seed,
            config,
            auto_tune,
            json,
        } => commands::simulate::run(&commands::simulate::SimulateArgs {
            entities,
            ticks,
            seed,
            config,
            auto_tune,
            json,
        }),
        Commands::Config { config } => commands::config::run(config.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

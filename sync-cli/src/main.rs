//! # wearsync
//!
//! CLI tool for running wearsync against a simulated companion.
//!
//! ## Commands
//!
//! - `simulate`: Run a wearable engine against an in-memory companion
//! - `config`: Print the effective engine configuration
//!
//! ## Example
//!
//! ```bash
//! # Ten one-second ticks with defaults
//! wearsync simulate --ticks 10
//!
//! # Fast ticks, short refresh interval, JSON snapshots
//! wearsync simulate --ticks 50 --tick-ms 100 --refresh-ms 2000 --json
//!
//! # Show what a config file resolves to
//! wearsync config --config wearsync.toml
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use sync_client::EngineConfig;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{config, simulate};

/// CLI tool for running wearsync simulations.
#[derive(Parser, Debug)]
#[command(name = "wearsync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Engine configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "sync_client=trace" (default: $RUST_LOG or info)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a wearable engine against a simulated companion
    Simulate {
        /// Number of snapshots to print
        #[arg(long, default_value = "10")]
        ticks: u32,

        /// Tick interval in milliseconds (overrides the config file)
        #[arg(long)]
        tick_ms: Option<u64>,

        /// Refresh interval in milliseconds (overrides the config file)
        #[arg(long)]
        refresh_ms: Option<u64>,

        /// Print snapshots as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.log_level.as_deref())?;

    let mut engine_config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Simulate {
            ticks,
            tick_ms,
            refresh_ms,
            json,
        } => {
            if let Some(ms) = tick_ms {
                engine_config = engine_config.with_tick_interval(Duration::from_millis(ms));
            }
            if let Some(ms) = refresh_ms {
                engine_config = engine_config.with_refresh_interval(Duration::from_millis(ms));
            }
            engine_config
                .validate()
                .context("Invalid command-line overrides")?;
            simulate::run(engine_config, ticks, json).await?;
        }
        Commands::Config => {
            config::run(&engine_config)?;
        }
    }

    Ok(())
}

/// Install the log subscriber. Logs go to stderr so stdout stays parseable.
fn init_logging(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).context("Invalid --log-level")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

/// Load the config file, or defaults when none is given.
fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

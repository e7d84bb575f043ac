//! chq - Broker to ClickHouse bulk ingestion
//!
//! # Usage
//!
//! ```bash
//! # Run the daemon (default)
//! chq
//! chq --config /etc/chq/chq.toml
//!
//! # Load everything staged right now, then exit
//! chq flush
//!
//! # Show staging files and unloaded snapshots
//! chq pending
//! ```

mod cmd;
mod engine;
mod report;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use chq_config::{Config, LogFormat};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// chq - Broker to ClickHouse bulk ingestion
#[derive(Parser, Debug)]
#[command(name = "chq")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (error if specified but not found)
    #[arg(short, long, global = true, env = "CHQ_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). Overrides config file.
    #[arg(short, long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the ingestion daemon
    Serve,

    /// Run one forced sweep over the staging directory and exit
    Flush,

    /// List staging files and unloaded snapshots
    Pending,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?;

    match cli.command {
        // Pending only prints to stdout
        Some(Command::Pending) => runtime.block_on(cmd::pending::run(config)),
        Some(Command::Flush) => {
            init_logging(cli.log_level.as_deref(), &config)?;
            runtime.block_on(cmd::flush::run(config))
        }
        Some(Command::Serve) | None => {
            init_logging(cli.log_level.as_deref(), &config)?;
            runtime.block_on(cmd::serve::run(config, cli.config))
        }
    }
}

/// Load the configuration
///
/// An explicit path must exist. Without one the default locations are
/// tried in order, falling back to built-in defaults.
pub(crate) fn load_config(path: Option<&Path>) -> Result<Config> {
    if let Some(path) = path {
        if !path.exists() {
            anyhow::bail!("config file not found: {}", path.display());
        }
        return Config::from_file(path).context("failed to load configuration");
    }

    for candidate in [Path::new("chq.toml"), Path::new("/etc/chq/chq.toml")] {
        if candidate.exists() {
            return Config::from_file(candidate).context("failed to load configuration");
        }
    }

    Ok(Config::default())
}

/// Resolve log level: CLI flag > config file > default "info"
fn resolve_log_level(cli_level: Option<&str>, config: &Config) -> String {
    match cli_level {
        Some(level) => level.to_string(),
        None => config.log.level.as_str().to_string(),
    }
}

/// Initialize the tracing subscriber for logging
fn init_logging(cli_level: Option<&str>, config: &Config) -> Result<()> {
    let level = resolve_log_level(cli_level, config);
    let filter = EnvFilter::try_new(&level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    match config.log.format {
        LogFormat::Console => tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_ansi(config.log.ansi),
            )
            .with(filter)
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json().with_current_span(false))
            .with(filter)
            .init(),
    }

    info!(level = %level, format = ?config.log.format, "logging initialized");
    Ok(())
}

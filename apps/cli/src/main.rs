//! Tally CLI - batch processing of sales, user and log files.
//!
//! This CLI provides a `tally` command that runs a batch of files through the
//! Tally Core coordinator and reports per-file results and totals.

mod commands;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tally_core::TallyConfig;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use commands::{config, run};

/// Tally - concurrent batch processing for data files
///
/// Tally reads sales CSV, user JSON and system log files in parallel, with
/// per-file deadlines and retry, and reports what it found in each.
#[derive(Parser, Debug)]
#[command(
    name = "tally",
    author,
    version,
    about = "Tally - concurrent batch processing for data files"
)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process a batch of files
    ///
    /// Each path is a file or a directory. Directories contribute the files
    /// they contain; pass --recursive to descend into subdirectories.
    Run(run::RunArgs),

    /// Inspect or create configuration files
    #[command(subcommand)]
    Config(config::ConfigAction),
}

fn level_filter(level: &str) -> &'static str {
    match level.to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "info" => "info",
        "error" => "error",
        _ => "warn",
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let loaded = TallyConfig::discover_and_load();

    // Initialize tracing
    let level = args
        .log_level
        .as_deref()
        .or_else(|| loaded.as_ref().ok().and_then(|c| c.log_level.as_deref()))
        .map_or("warn", level_filter);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut cli_config = loaded.context("Failed to load configuration")?;
    cli_config.apply_process_env().context("Invalid TALLY_* environment override")?;

    match args.command {
        Command::Run(run_args) => {
            let all_succeeded = run::execute(run_args, cli_config).await?;
            if !all_succeeded {
                std::process::exit(2);
            }
        }
        Command::Config(action) => config::execute(action, &cli_config)?,
    }

    Ok(())
}

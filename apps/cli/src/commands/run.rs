//! Run command implementation.
//!
//! Processes a batch of files through the coordinator and renders the report.

use anyhow::{Context, bail};
use clap::Args;
use colored::Colorize;
use std::collections::HashSet;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tally_core::batch::{BatchProgress, BatchProgressTracker, ProgressCallback, collect_inputs};
use tally_core::report::{render_progress, write_report};
use tally_core::{
    BatchReport, Coordinator, CoordinatorOptions, HandlerRegistry, ReportFormat, TallyConfig,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Arguments for `tally run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Files or directories to process
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Per-attempt timeout in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Additional attempts after a failed one
    #[arg(long)]
    pub retries: Option<u32>,

    /// Maximum concurrently running workers
    #[arg(long)]
    pub max_workers: Option<usize>,

    /// One worker per file with no pool and no retry
    #[arg(long, conflicts_with_all = ["timeout_ms", "retries", "max_workers"])]
    pub unbounded: bool,

    /// Descend into subdirectories
    #[arg(short, long)]
    pub recursive: bool,

    /// Render the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Write the report to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Disable the live progress line
    #[arg(long)]
    pub no_progress: bool,
}

/// Execute the run command.
///
/// Returns whether every file succeeded.
pub async fn execute(args: RunArgs, mut config: TallyConfig) -> anyhow::Result<bool> {
    // Flags override file and environment values
    if args.timeout_ms.is_some() {
        config.batch.timeout_ms = args.timeout_ms;
    }
    if args.retries.is_some() {
        config.batch.retries = args.retries;
    }
    if args.max_workers.is_some() {
        config.batch.max_workers = args.max_workers;
    }

    let format = if args.json {
        ReportFormat::Json
    } else {
        config
            .output
            .format()
            .parse::<ReportFormat>()
            .map_err(anyhow::Error::msg)
            .context("Invalid output format in configuration")?
    };
    let output = args.output.or_else(|| config.output.path.clone());

    let batch_config = config.batch_config();
    let options = if args.unbounded {
        let mut options = CoordinatorOptions::unbounded();
        if let Some(ms) = batch_config.result_timeout_ms {
            options.result_timeout = Duration::from_millis(ms);
        }
        options
    } else {
        CoordinatorOptions::configured(&batch_config).context("Invalid batch configuration")?
    };

    let mut files =
        collect_inputs(&args.paths, args.recursive).context("Failed to collect input files")?;
    if args.unbounded {
        let mut seen = HashSet::new();
        files.retain(|path| seen.insert(path.clone()));
    }
    if files.is_empty() {
        bail!("No input files found");
    }

    let human = format == ReportFormat::Text;
    let parallelism = options.concurrency_limit.unwrap_or(files.len());
    if human {
        println!("{}", "tally run".bold().cyan());
        println!();
        let mode = if args.unbounded {
            "unbounded".to_string()
        } else {
            format!("{} workers, {} retries", parallelism, batch_config.retries)
        };
        println!("  {} {} files ({})", "✓".green(), files.len(), mode);
        println!();
    }

    let cancel = CancellationToken::new();
    let mut coordinator =
        Coordinator::new(HandlerRegistry::default(), options).with_cancellation(cancel.clone());

    let show_progress = human && !args.no_progress && std::io::stdout().is_terminal();
    if show_progress {
        let tracker = Arc::new(Mutex::new(BatchProgressTracker::new(files.len())));
        let callback: ProgressCallback = Arc::new(move |progress: &BatchProgress| {
            if let Ok(mut tracker) = tracker.lock() {
                tracker.update(progress);
                let _ = render_progress(&tracker, parallelism);
            }
        });
        coordinator = coordinator.with_progress(callback);
    }

    // Setup Ctrl+C handler
    let ctrl_c = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if signal::ctrl_c().await.is_ok() {
                eprintln!("\n{} Cancellation requested, stopping workers...", "⚠".yellow());
                cancel.cancel();
            }
        }
    });

    let started = Instant::now();
    info!(files = files.len(), "Starting batch");
    let envelopes = coordinator.run(files).await;
    ctrl_c.abort();

    if show_progress {
        println!();
    }
    if cancel.is_cancelled() {
        warn!("Batch was cancelled before every file finished");
    }

    let report = BatchReport::new(envelopes, started.elapsed());
    let rendered = report.render(format).context("Failed to render report")?;
    match output {
        Some(path) => {
            write_report(&path, &rendered)
                .with_context(|| format!("Failed to write report: {}", path.display()))?;
            println!("{} Report written to {}", "✓".green(), path.display());
        }
        None => println!("{}", rendered.trim_end()),
    }

    let summary = &report.summary;
    if summary.error_count > 0 {
        eprintln!("\n{} {} of {} files failed", "⚠".yellow(), summary.error_count, summary.total);
    }

    Ok(summary.is_complete_success())
}

//! Report rendering for completed batches.

use crate::batch::progress::{BatchProgressTracker, format_duration};
use crate::batch::{BatchSummary, ResultEnvelope};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

/// Output format for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "human" | "text" => Ok(ReportFormat::Text),
            "json" => Ok(ReportFormat::Json),
            other => Err(format!("unknown report format: {} (expected human or json)", other)),
        }
    }
}

/// Machine-readable report document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub summary: BatchSummary,
    /// One entry per input file, in input order.
    pub results: Vec<ResultEnvelope>,
}

impl BatchReport {
    pub fn new(envelopes: Vec<ResultEnvelope>, duration: Duration) -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            duration_ms: duration.as_millis() as u64,
            summary: BatchSummary::from_envelopes(&envelopes),
            results: envelopes,
        }
    }

    pub fn render(&self, format: ReportFormat) -> Result<String> {
        match format {
            ReportFormat::Text => Ok(render_text(self)),
            ReportFormat::Json => render_json(self),
        }
    }
}

/// Render a human-readable report: one line per file, then totals.
pub fn render_text(report: &BatchReport) -> String {
    let mut out = String::new();
    let summary = &report.summary;

    let _ = writeln!(out, "Batch Report");
    let _ = writeln!(out, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    for envelope in &report.results {
        let kind = envelope.kind.map_or("-", |k| k.as_str());
        match (&envelope.metrics, envelope.error_kind) {
            (Some(metrics), _) => {
                let _ = writeln!(
                    out,
                    "  ✓ {} [{}] {}",
                    envelope.path.display(),
                    kind,
                    metrics.summary()
                );
            }
            (None, Some(error_kind)) => {
                let _ = writeln!(
                    out,
                    "  ✗ {} [{}] {}: {}",
                    envelope.path.display(),
                    kind,
                    error_kind,
                    envelope.reason().unwrap_or_default()
                );
            }
            (None, None) => {
                let _ = writeln!(out, "  ? {} [{}]", envelope.path.display(), kind);
            }
        }
        if envelope.attempts > 1 {
            let _ = writeln!(out, "      attempts: {}", envelope.attempts);
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Total Files: {}", summary.total);
    let _ = writeln!(out, "Successful: {} ({:.1}%)", summary.success_count, summary.success_rate);
    let _ = writeln!(out, "Failed: {}", summary.error_count);
    for (handler, count) in &summary.errors_by_handler {
        let _ = writeln!(out, "  {}: {}", handler, count);
    }
    let _ = writeln!(out, "Total Duration: {}", format_duration(Duration::from_millis(report.duration_ms)));

    out
}

/// Render the report as pretty-printed JSON.
pub fn render_json(report: &BatchReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// Write rendered report contents, creating parent directories.
pub fn write_report(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents)?;
    Ok(())
}

/// Format the one-line progress bar.
pub fn progress_line(tracker: &BatchProgressTracker, parallelism: usize) -> String {
    let percentage = tracker.percentage();
    let bar_width = 30;
    let filled = ((bar_width as f64 * percentage / 100.0) as usize).min(bar_width);
    let empty = bar_width - filled;

    format!(
        "{}{} {}/{} ({:.1}%) | Active: {} | Queued: {} | Success: {} | Failed: {} | Elapsed: {} | Avg: {} | ETA: {}",
        "━".repeat(filled),
        "─".repeat(empty),
        tracker.completed,
        tracker.total,
        percentage,
        tracker.active,
        tracker.queued,
        tracker.successful,
        tracker.failed,
        tracker.elapsed(),
        tracker.average_duration(),
        tracker.calculate_eta(parallelism)
    )
}

/// Render the progress bar to stdout, updating in place.
pub fn render_progress(tracker: &BatchProgressTracker, parallelism: usize) -> io::Result<()> {
    // Clear current line and move to beginning
    print!("\r\x1B[K{}", progress_line(tracker, parallelism));
    io::stdout().flush()?;
    Ok(())
}

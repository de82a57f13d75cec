//! Tally Core - concurrent batch processing of sales, user and log files.
//!
//! This crate provides:
//! - Format handlers for sales CSV, user JSON and system log files
//! - A coordinator that runs one worker per file, bounded by a pool, with
//!   per-file deadlines, retry and hard cancellation
//! - Aggregation and text/JSON reports over the per-file results
//! - Layered configuration
//!
//! # Example
//!
//! ```rust,no_run
//! use tally_core::batch::{BatchConfig, BatchSummary, start_configured_batch};
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> tally_core::Result<()> {
//!     let files = vec![PathBuf::from("sales.csv"), PathBuf::from("system.log")];
//!     let results = start_configured_batch(files, &BatchConfig::default()).await?;
//!     let summary = BatchSummary::from_envelopes(&results);
//!     println!("{}/{} succeeded", summary.success_count, summary.total);
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod handlers;
pub mod report;

pub use batch::{
    BatchConfig, BatchSummary, Coordinator, CoordinatorOptions, ErrorKind, ResultEnvelope,
    RetryPolicy, Status, start_configured_batch, start_unbounded_batch,
};
pub use config::{ConfigError, TallyConfig};
pub use error::{Result, TallyError};
pub use handlers::{Handler, HandlerError, HandlerKind, HandlerRegistry, Metrics};
pub use report::{BatchReport, ReportFormat};

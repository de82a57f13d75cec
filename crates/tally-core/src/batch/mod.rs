//! Batch processing: concurrent dispatch, retry, collection and aggregation.

pub mod aggregate;
pub mod coordinator;
pub mod error;
pub mod input;
pub mod progress;
pub mod retry;
pub mod types;
pub mod worker;

pub use aggregate::BatchSummary;
pub use coordinator::{Coordinator, CoordinatorOptions};
pub use error::ErrorKind;
pub use input::collect_inputs;
pub use progress::{BatchProgressTracker, format_duration};
pub use retry::RetryPolicy;
pub use types::{
    BatchConfig, BatchProgress, ProgressCallback, ResultEnvelope, Status, Task, TaskId,
    default_max_workers,
};
pub use worker::{WorkerExit, WorkerState};

use crate::error::Result;
use crate::handlers::HandlerRegistry;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Process files with one worker each and no retry, keyed by path.
///
/// Duplicate input paths collapse into one key, so the map may hold fewer
/// entries than `paths`.
pub async fn start_unbounded_batch(paths: Vec<PathBuf>) -> BTreeMap<PathBuf, ResultEnvelope> {
    Coordinator::new(HandlerRegistry::default(), CoordinatorOptions::unbounded())
        .run(paths)
        .await
        .into_iter()
        .map(|envelope| (envelope.path.clone(), envelope))
        .collect()
}

/// Process files through a bounded pool with retry; one envelope per input, in input order.
pub async fn start_configured_batch(
    paths: Vec<PathBuf>,
    config: &BatchConfig,
) -> Result<Vec<ResultEnvelope>> {
    let options = CoordinatorOptions::configured(config)?;
    Ok(Coordinator::new(HandlerRegistry::default(), options).run(paths).await)
}

//! Data types for batch processing.

use crate::batch::error::ErrorKind;
use crate::error::TallyError;
use crate::handlers::{HandlerKind, Metrics};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// How long the coordinator waits for a worker in unbounded mode.
pub const DEFAULT_RESULT_TIMEOUT: Duration = Duration::from_secs(15);

/// How long a worker waits for the coordinator to acknowledge its result.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause between retry attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Slack added on top of the retry budget for the coordinator's own deadline.
pub const RESULT_GRACE: Duration = Duration::from_millis(500);

/// Identifies a task within one batch. Wraps the input position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(usize);

impl TaskId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// One input file scheduled for processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub path: PathBuf,
    /// `None` when no handler matches the extension.
    pub kind: Option<HandlerKind>,
}

impl Task {
    pub fn new(index: usize, path: PathBuf, kind: Option<HandlerKind>) -> Self {
        Self { id: TaskId(index), path, kind }
    }
}

/// Terminal status of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Success,
    Error,
}

/// The single terminal outcome recorded for a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    /// Input path, as given.
    pub path: PathBuf,
    /// Handler kind selected by extension, if any.
    pub kind: Option<HandlerKind>,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Metrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Error kind of the last failed attempt, when it differs from `error_kind`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Handler invocations made for this file.
    pub attempts: u32,
    /// Wall time from dispatch to terminal outcome.
    pub duration_ms: u64,
}

impl ResultEnvelope {
    /// Successful outcome.
    pub fn success(task: &Task, metrics: Metrics, attempts: u32, duration: Duration) -> Self {
        Self {
            path: task.path.clone(),
            kind: task.kind,
            status: Status::Success,
            metrics: Some(metrics),
            error_kind: None,
            cause: None,
            message: None,
            attempts,
            duration_ms: duration.as_millis() as u64,
        }
    }

    /// Failed outcome.
    pub fn failure(
        task: &Task,
        error_kind: ErrorKind,
        message: impl Into<String>,
        attempts: u32,
        duration: Duration,
    ) -> Self {
        Self {
            path: task.path.clone(),
            kind: task.kind,
            status: Status::Error,
            metrics: None,
            error_kind: Some(error_kind),
            cause: None,
            message: Some(message.into()),
            attempts,
            duration_ms: duration.as_millis() as u64,
        }
    }

    #[must_use]
    pub fn with_cause(mut self, cause: ErrorKind) -> Self {
        self.cause = Some(cause);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// Human-readable reason for a failed file.
    pub fn reason(&self) -> Option<String> {
        let kind = self.error_kind?;
        Some(match &self.message {
            Some(message) if !message.is_empty() => message.clone(),
            _ => kind.description().to_string(),
        })
    }
}

/// Settings for a configured batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Per-attempt handler timeout.
    pub timeout_ms: u64,
    /// Additional attempts after the first failure.
    pub retries: u32,
    /// Upper bound on concurrently running workers.
    pub max_workers: usize,
    pub retry_delay_ms: u64,
    pub ack_timeout_ms: u64,
    /// Coordinator-side deadline per task. Derived from the retry budget when unset.
    pub result_timeout_ms: Option<u64>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            retries: 0,
            max_workers: default_max_workers(),
            retry_delay_ms: DEFAULT_RETRY_DELAY.as_millis() as u64,
            ack_timeout_ms: DEFAULT_ACK_TIMEOUT.as_millis() as u64,
            result_timeout_ms: None,
        }
    }
}

/// Twice the available hardware parallelism.
pub fn default_max_workers() -> usize {
    std::thread::available_parallelism().map_or(4, |n| n.get() * 2)
}

impl BatchConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    /// Check the configuration before any dispatch.
    pub fn validate(&self) -> Result<(), TallyError> {
        if self.timeout_ms == 0 {
            return Err(TallyError::InvalidBatchConfig("timeout_ms must be greater than 0".into()));
        }
        if self.max_workers == 0 {
            return Err(TallyError::InvalidBatchConfig(
                "max_workers must be at least 1".into(),
            ));
        }
        if self.result_timeout_ms == Some(0) {
            return Err(TallyError::InvalidBatchConfig(
                "result_timeout_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Snapshot of batch progress handed to the progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchProgress {
    pub total: usize,
    pub completed: usize,
    pub active: usize,
    pub successful: usize,
    pub failed: usize,
    /// Duration of the file that just completed.
    pub last_duration: Duration,
}

impl BatchProgress {
    pub fn queued(&self) -> usize {
        self.total.saturating_sub(self.completed + self.active)
    }
}

/// Progress callback function type.
pub type ProgressCallback = Arc<dyn Fn(&BatchProgress) + Send + Sync>;

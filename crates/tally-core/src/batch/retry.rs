//! Bounded retry around a single handler invocation.

use crate::batch::error::ErrorKind;
use crate::batch::types::{BatchConfig, ResultEnvelope, Task};
use crate::handlers::{Handler, Metrics};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Retry policy for handler invocations.
///
/// `retries` counts additional attempts, so a handler that always fails is
/// invoked `retries + 1` times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first failure.
    pub retries: u32,
    /// Bound on each attempt. `None` lets an attempt run until it finishes.
    pub attempt_timeout: Option<Duration>,
    /// Fixed pause between attempts.
    pub retry_delay: Duration,
    /// Whether the whole invocation is cut off after [`RetryPolicy::budget`].
    pub enforce_budget: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::single_attempt()
    }
}

/// Why one attempt failed.
#[derive(Debug, Clone)]
struct AttemptFailure {
    kind: ErrorKind,
    message: String,
}

impl RetryPolicy {
    /// Create a new retry policy.
    pub fn new(retries: u32, attempt_timeout: Duration, retry_delay: Duration) -> Self {
        Self { retries, attempt_timeout: Some(attempt_timeout), retry_delay, enforce_budget: true }
    }

    /// One attempt, no timeout: the handler is called directly.
    pub fn single_attempt() -> Self {
        Self {
            retries: 0,
            attempt_timeout: None,
            retry_delay: Duration::ZERO,
            enforce_budget: false,
        }
    }

    pub fn from_config(config: &BatchConfig) -> Self {
        Self::new(config.retries, config.attempt_timeout(), config.retry_delay())
    }

    /// Total time the invocation may take: every attempt plus the pauses between them.
    pub fn budget(&self) -> Option<Duration> {
        let attempt_timeout = self.attempt_timeout?;
        Some(attempt_timeout * (self.retries + 1) + self.retry_delay * self.retries)
    }

    /// Run the handler until it succeeds or the policy gives up.
    ///
    /// Never fails: every outcome, including a panic inside the handler, is
    /// folded into the returned envelope.
    pub async fn invoke(&self, handler: &dyn Handler, task: &Task) -> ResultEnvelope {
        self.invoke_counted(handler, task, &AtomicU32::new(0)).await
    }

    /// Like [`RetryPolicy::invoke`], bumping `attempts` as each attempt starts.
    ///
    /// The counter stays readable after the invocation is dropped mid-attempt.
    pub async fn invoke_counted(
        &self,
        handler: &dyn Handler,
        task: &Task,
        attempts: &AtomicU32,
    ) -> ResultEnvelope {
        let started = Instant::now();

        let outcome = match self.budget().filter(|_| self.enforce_budget) {
            Some(budget) => {
                let bounded = timeout(budget, self.attempt_all(handler, task, attempts)).await;
                bounded.unwrap_or_else(|_| {
                    warn!(
                        task = %task.id,
                        path = %task.path.display(),
                        budget_ms = budget.as_millis() as u64,
                        "Invocation budget exhausted, discarding in-flight attempt"
                    );
                    Err(AttemptFailure {
                        kind: ErrorKind::Timeout,
                        message: format!("exceeded time budget of {:?}", budget),
                    })
                })
            }
            None => self.attempt_all(handler, task, attempts).await,
        };

        let attempts = attempts.load(Ordering::SeqCst);
        let elapsed = started.elapsed();
        match outcome {
            Ok(metrics) => ResultEnvelope::success(task, metrics, attempts, elapsed),
            Err(failure) => self.terminal_failure(task, failure, attempts, elapsed),
        }
    }

    fn terminal_failure(
        &self,
        task: &Task,
        last: AttemptFailure,
        attempts: u32,
        elapsed: Duration,
    ) -> ResultEnvelope {
        let gave_up = last.kind.is_retryable() && self.retries > 0 && last.kind != ErrorKind::Timeout;
        if gave_up {
            ResultEnvelope::failure(
                task,
                ErrorKind::RetryExhausted,
                format!("gave up after {} attempts: {}", attempts, last.message),
                attempts,
                elapsed,
            )
            .with_cause(last.kind)
        } else {
            ResultEnvelope::failure(task, last.kind, last.message, attempts, elapsed)
        }
    }

    async fn attempt_all(
        &self,
        handler: &dyn Handler,
        task: &Task,
        attempts: &AtomicU32,
    ) -> Result<Metrics, AttemptFailure> {
        loop {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            let failure = match self.attempt_once(handler, task).await {
                Ok(metrics) => return Ok(metrics),
                Err(failure) => failure,
            };

            if !failure.kind.is_retryable() || attempt > self.retries {
                return Err(failure);
            }

            debug!(
                task = %task.id,
                attempt,
                error_kind = %failure.kind,
                delay_ms = self.retry_delay.as_millis() as u64,
                "Retrying after failed attempt"
            );
            tokio::time::sleep(self.retry_delay).await;
        }
    }

    async fn attempt_once(&self, handler: &dyn Handler, task: &Task) -> Result<Metrics, AttemptFailure> {
        let call = AssertUnwindSafe(handler.process(&task.path)).catch_unwind();

        let result = match self.attempt_timeout {
            Some(limit) => match timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(AttemptFailure {
                        kind: ErrorKind::Timeout,
                        message: format!("attempt timed out after {:?}", limit),
                    });
                }
            },
            None => call.await,
        };

        match result {
            Ok(Ok(metrics)) => Ok(metrics),
            Ok(Err(err)) => Err(AttemptFailure { kind: err.kind(), message: err.to_string() }),
            Err(panic) => Err(AttemptFailure {
                kind: ErrorKind::HandlerPanicked,
                message: format!("handler panicked: {}", panic_message(panic.as_ref())),
            }),
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

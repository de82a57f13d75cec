//! Per-file worker and its result handshake with the coordinator.

use crate::batch::error::ErrorKind;
use crate::batch::retry::{RetryPolicy, panic_message};
use crate::batch::types::{ResultEnvelope, Task, TaskId};
use crate::handlers::{Handler, HandlerError};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::AtomicU32;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Lifecycle of a worker.
///
/// `Spawned → Executing → ResultSent → (Acknowledged | AckTimedOut) → Terminated`.
/// A worker cancelled by the coordinator goes straight to `Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Spawned,
    Executing,
    ResultSent,
    Acknowledged,
    AckTimedOut,
    Terminated,
}

/// Message a worker sends to the coordinator.
#[derive(Debug)]
pub(crate) struct WorkerReport {
    pub task_id: TaskId,
    pub envelope: ResultEnvelope,
    pub ack: oneshot::Sender<()>,
}

/// How a worker ended, as returned from its join handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerExit {
    pub task_id: TaskId,
    /// Last state before `Terminated`.
    pub last_state: WorkerState,
}

/// Runs exactly one task.
pub(crate) struct Worker {
    task: Task,
    handler: Result<Arc<dyn Handler>, HandlerError>,
    policy: RetryPolicy,
    reports: mpsc::Sender<WorkerReport>,
    ack_timeout: Duration,
    cancel: CancellationToken,
    /// Attempts started so far, shared with the coordinator.
    attempts: Arc<AtomicU32>,
    state: WorkerState,
}

impl Worker {
    pub fn new(
        task: Task,
        handler: Result<Arc<dyn Handler>, HandlerError>,
        policy: RetryPolicy,
        reports: mpsc::Sender<WorkerReport>,
        ack_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            task,
            handler,
            policy,
            reports,
            ack_timeout,
            cancel,
            attempts: Arc::new(AtomicU32::new(0)),
            state: WorkerState::Spawned,
        }
    }

    /// Counter of handler attempts started, readable after the worker is aborted.
    pub fn attempts(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.attempts)
    }

    pub fn spawn(self) -> JoinHandle<WorkerExit> {
        tokio::spawn(self.run())
    }

    fn transition(&mut self, next: WorkerState) {
        debug!(task = %self.task.id, from = ?self.state, to = ?next, "Worker state change");
        self.state = next;
    }

    fn exit(mut self) -> WorkerExit {
        let last_state = self.state;
        self.transition(WorkerState::Terminated);
        WorkerExit { task_id: self.task.id, last_state }
    }

    async fn run(mut self) -> WorkerExit {
        self.transition(WorkerState::Executing);

        let cancel = self.cancel.clone();
        let envelope = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(task = %self.task.id, "Worker cancelled before producing a result");
                return self.exit();
            }
            envelope = self.execute() => envelope,
        };

        let (ack_tx, ack_rx) = oneshot::channel();
        let report = WorkerReport { task_id: self.task.id, envelope, ack: ack_tx };
        if self.reports.send(report).await.is_err() {
            warn!(task = %self.task.id, "Coordinator is gone, dropping result");
            return self.exit();
        }
        self.transition(WorkerState::ResultSent);

        match tokio::time::timeout(self.ack_timeout, ack_rx).await {
            Ok(Ok(())) => self.transition(WorkerState::Acknowledged),
            Ok(Err(_)) => {
                debug!(task = %self.task.id, "Coordinator discarded result without acknowledging");
                self.transition(WorkerState::AckTimedOut);
            }
            Err(_) => {
                warn!(
                    task = %self.task.id,
                    ack_timeout_ms = self.ack_timeout.as_millis() as u64,
                    "No acknowledgment from coordinator"
                );
                self.transition(WorkerState::AckTimedOut);
            }
        }

        self.exit()
    }

    /// Produce the task's envelope. Never panics past this point.
    async fn execute(&self) -> ResultEnvelope {
        let started = Instant::now();
        let handler = match &self.handler {
            Ok(handler) => Arc::clone(handler),
            Err(err) => {
                return ResultEnvelope::failure(&self.task, err.kind(), err.to_string(), 1, started.elapsed());
            }
        };

        AssertUnwindSafe(self.policy.invoke_counted(handler.as_ref(), &self.task, &self.attempts))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                ResultEnvelope::failure(
                    &self.task,
                    ErrorKind::HandlerPanicked,
                    format!("worker panicked: {}", panic_message(panic.as_ref())),
                    1,
                    started.elapsed(),
                )
            })
    }
}

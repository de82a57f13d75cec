//! Dispatch-and-collect coordinator.
//!
//! The coordinator is the only owner of batch state. Workers never touch it:
//! they send a [`WorkerReport`] over a channel and wait for an acknowledgment.
//! Every task carries its own deadline, so a timeout is always attributed to
//! the task that actually missed it, and a worker whose deadline passes is
//! aborted rather than left running.

use crate::batch::error::ErrorKind;
use crate::batch::retry::RetryPolicy;
use crate::batch::types::{
    BatchConfig, BatchProgress, DEFAULT_ACK_TIMEOUT, DEFAULT_RESULT_TIMEOUT, ProgressCallback,
    RESULT_GRACE, ResultEnvelope, Task, TaskId,
};
use crate::batch::worker::{Worker, WorkerExit, WorkerReport, WorkerState};
use crate::error::TallyError;
use crate::handlers::{Handler, HandlerError, HandlerRegistry};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Coordinator settings.
#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    /// Deadline per task, measured from the moment its worker is spawned.
    pub result_timeout: Duration,
    /// Maximum concurrently running workers. `None` spawns one worker per file up front.
    pub concurrency_limit: Option<usize>,
    pub retry: RetryPolicy,
    pub ack_timeout: Duration,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl CoordinatorOptions {
    /// One worker per file, a single direct handler call each.
    pub fn unbounded() -> Self {
        Self {
            result_timeout: DEFAULT_RESULT_TIMEOUT,
            concurrency_limit: None,
            retry: RetryPolicy::single_attempt(),
            ack_timeout: DEFAULT_ACK_TIMEOUT,
        }
    }

    /// Bounded pool with retry, derived from a batch config.
    pub fn configured(config: &BatchConfig) -> Result<Self, TallyError> {
        config.validate()?;
        let retry = RetryPolicy::from_config(config);
        let result_timeout = match config.result_timeout_ms {
            Some(ms) => Duration::from_millis(ms),
            None => retry.budget().unwrap_or(DEFAULT_RESULT_TIMEOUT) + RESULT_GRACE,
        };

        Ok(Self {
            result_timeout,
            concurrency_limit: Some(config.max_workers),
            retry,
            ack_timeout: config.ack_timeout(),
        })
    }
}

/// A dispatched task and the handles needed to stop it.
struct PendingTask {
    task: Task,
    deadline: Instant,
    spawned_at: Instant,
    cancel: CancellationToken,
    attempts: Arc<AtomicU32>,
    handle: JoinHandle<WorkerExit>,
}

/// A task waiting for a pool slot, with its handler already resolved.
struct QueuedTask {
    task: Task,
    handler: Result<Arc<dyn Handler>, HandlerError>,
}

struct CoordinatorState {
    queued: VecDeque<QueuedTask>,
    pending: HashMap<TaskId, PendingTask>,
    collected: BTreeMap<TaskId, ResultEnvelope>,
    expected: usize,
    successful: usize,
    failed: usize,
    /// Workers whose result was accepted; joined before the batch returns.
    finished: Vec<JoinHandle<WorkerExit>>,
}

impl CoordinatorState {
    fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|pending| pending.deadline).min()
    }

    fn is_done(&self) -> bool {
        self.collected.len() >= self.expected
    }

    fn record(&mut self, task_id: TaskId, envelope: ResultEnvelope) {
        if envelope.is_success() {
            self.successful += 1;
        } else {
            self.failed += 1;
        }
        self.collected.insert(task_id, envelope);
    }

    fn progress(&self, last_duration: Duration) -> BatchProgress {
        BatchProgress {
            total: self.expected,
            completed: self.collected.len(),
            active: self.pending.len(),
            successful: self.successful,
            failed: self.failed,
            last_duration,
        }
    }
}

/// Dispatches one worker per file and collects exactly one envelope per file.
#[derive(Clone)]
pub struct Coordinator {
    registry: Arc<HandlerRegistry>,
    options: CoordinatorOptions,
    cancel: CancellationToken,
    progress: Option<ProgressCallback>,
}

impl Coordinator {
    pub fn new(registry: HandlerRegistry, options: CoordinatorOptions) -> Self {
        Self {
            registry: Arc::new(registry),
            options,
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    /// Cancel the batch when `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Receive a progress snapshot after every recorded envelope.
    #[must_use]
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Process every path and return one envelope per path, in input order.
    pub async fn run(&self, paths: Vec<PathBuf>) -> Vec<ResultEnvelope> {
        let total = paths.len();
        if total == 0 {
            return Vec::new();
        }

        let limit = self.options.concurrency_limit.unwrap_or(usize::MAX).max(1);
        info!(
            total_files = total,
            concurrency = self.options.concurrency_limit,
            retries = self.options.retry.retries,
            result_timeout_ms = self.options.result_timeout.as_millis() as u64,
            "Starting batch"
        );

        let queued = paths
            .into_iter()
            .enumerate()
            .map(|(index, path)| {
                let handler = self.registry.resolve(&path);
                let kind = handler.as_ref().ok().map(|(kind, _)| *kind);
                QueuedTask {
                    task: Task::new(index, path, kind),
                    handler: handler.map(|(_, handler)| handler),
                }
            })
            .collect();

        let mut state = CoordinatorState {
            queued,
            pending: HashMap::new(),
            collected: BTreeMap::new(),
            expected: total,
            successful: 0,
            failed: 0,
            finished: Vec::new(),
        };

        let (tx, mut rx) = mpsc::channel::<WorkerReport>(limit.min(total));
        self.fill_pool(&mut state, &tx, limit);

        while !state.is_done() {
            let next_deadline = state.next_deadline();
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    self.cancel_remaining(&mut state);
                    break;
                }
                Some(report) = rx.recv() => self.accept(&mut state, report),
                () = sleep_until(next_deadline) => self.expire(&mut state, Instant::now()),
            }
            self.fill_pool(&mut state, &tx, limit);
        }

        drop(tx);
        self.join_finished(&mut state).await;

        info!(
            total_files = total,
            successful = state.successful,
            failed = state.failed,
            "Batch completed"
        );

        state.collected.into_values().collect()
    }

    fn fill_pool(&self, state: &mut CoordinatorState, tx: &mpsc::Sender<WorkerReport>, limit: usize) {
        while state.pending.len() < limit {
            let Some(QueuedTask { task, handler }) = state.queued.pop_front() else {
                break;
            };

            let cancel = self.cancel.child_token();
            let worker = Worker::new(
                task.clone(),
                handler,
                self.options.retry.clone(),
                tx.clone(),
                self.options.ack_timeout,
                cancel.clone(),
            );
            let attempts = worker.attempts();
            let spawned_at = Instant::now();
            debug!(task = %task.id, path = %task.path.display(), "Dispatching worker");

            state.pending.insert(
                task.id,
                PendingTask {
                    deadline: spawned_at + self.options.result_timeout,
                    spawned_at,
                    cancel,
                    attempts,
                    handle: worker.spawn(),
                    task,
                },
            );
        }
    }

    fn accept(&self, state: &mut CoordinatorState, report: WorkerReport) {
        let Some(pending) = state.pending.remove(&report.task_id) else {
            // Already timed out or cancelled; its slot is filled. Dropping the
            // report drops the ack sender, which releases the worker.
            warn!(task = %report.task_id, "Discarding late result");
            return;
        };

        debug!(
            task = %report.task_id,
            status = ?report.envelope.status,
            attempts = report.envelope.attempts,
            "Result received"
        );

        if report.ack.send(()).is_err() {
            debug!(task = %report.task_id, "Worker stopped waiting for acknowledgment");
        }
        state.finished.push(pending.handle);
        state.record(report.task_id, report.envelope);
        self.notify(state, pending.spawned_at.elapsed());
    }

    fn expire(&self, state: &mut CoordinatorState, now: Instant) {
        let expired: Vec<TaskId> = state
            .pending
            .iter()
            .filter(|(_, pending)| pending.deadline <= now)
            .map(|(id, _)| *id)
            .collect();

        for task_id in expired {
            let Some(pending) = state.pending.remove(&task_id) else {
                continue;
            };
            pending.cancel.cancel();
            pending.handle.abort();

            let waited = pending.spawned_at.elapsed();
            warn!(
                task = %task_id,
                path = %pending.task.path.display(),
                waited_ms = waited.as_millis() as u64,
                "Worker missed its deadline, cancelling"
            );

            // Attempts started before the abort, at least one.
            let attempts = pending.attempts.load(Ordering::SeqCst).max(1);
            let envelope = ResultEnvelope::failure(
                &pending.task,
                ErrorKind::WorkerTimeout,
                format!("no result within {:?}", self.options.result_timeout),
                attempts,
                waited,
            );
            state.record(task_id, envelope);
            self.notify(state, waited);
        }
    }

    fn cancel_remaining(&self, state: &mut CoordinatorState) {
        warn!(
            running = state.pending.len(),
            queued = state.queued.len(),
            "Batch cancelled"
        );

        for (task_id, pending) in state.pending.drain().collect::<Vec<_>>() {
            pending.cancel.cancel();
            pending.handle.abort();
            let envelope = ResultEnvelope::failure(
                &pending.task,
                ErrorKind::BatchCancelled,
                "cancelled while running",
                1,
                pending.spawned_at.elapsed(),
            );
            state.record(task_id, envelope);
        }

        while let Some(QueuedTask { task, .. }) = state.queued.pop_front() {
            let envelope = ResultEnvelope::failure(
                &task,
                ErrorKind::BatchCancelled,
                "cancelled before dispatch",
                0,
                Duration::ZERO,
            );
            state.record(task.id, envelope);
        }

        self.notify(state, Duration::ZERO);
    }

    async fn join_finished(&self, state: &mut CoordinatorState) {
        let exits = futures::future::join_all(state.finished.drain(..)).await;
        let unacknowledged = exits
            .iter()
            .filter(|exit| !matches!(exit, Ok(WorkerExit { last_state: WorkerState::Acknowledged, .. })))
            .count();
        if unacknowledged > 0 {
            debug!(unacknowledged, "Some workers ended without a clean handshake");
        }
    }

    fn notify(&self, state: &CoordinatorState, last_duration: Duration) {
        if let Some(callback) = &self.progress {
            callback(&state.progress(last_duration));
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

//! BatchRunner - claim one batch, hand it to its handler, settle the results

use std::collections::HashMap;
use std::sync::Arc;

use queuestore::{Claim, FailOutcome, TaskId};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::WorkerError;
use crate::config::SharedConfig;
use crate::domain::QueueKind;
use crate::handler::{HandlerRegistry, Outcome};
use crate::queue::{ManagerError, QueueManager};

/// Tally of one or more settled batches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub batches: usize,
    pub claimed: usize,
    pub done: usize,
    /// Failed transiently, back in the queue with backoff
    pub retried: usize,
    /// Failed permanently
    pub dropped: usize,
    /// Failed transiently past the retry ceiling
    pub exhausted: usize,
    /// Removed or parked by someone else before it could be settled
    pub gone: usize,
}

impl BatchReport {
    fn absorb(&mut self, other: BatchReport) {
        self.batches += other.batches;
        self.claimed += other.claimed;
        self.done += other.done;
        self.retried += other.retried;
        self.dropped += other.dropped;
        self.exhausted += other.exhausted;
        self.gone += other.gone;
    }
}

/// Result of a single `run_once`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunResult {
    /// Another batch of the queue is still processing
    Busy,
    /// Nothing claimable right now
    Idle,
    Ran(BatchReport),
}

pub struct BatchRunner {
    manager: QueueManager,
    registry: Arc<HandlerRegistry>,
    config: SharedConfig,
    worker_id: String,
}

impl BatchRunner {
    pub fn new(manager: QueueManager, registry: Arc<HandlerRegistry>, config: SharedConfig) -> Self {
        let worker_id = format!("wd-{}-{}", std::process::id(), Uuid::now_v7());
        debug!(%worker_id, ?registry, "BatchRunner::new: called");
        Self {
            manager,
            registry,
            config,
            worker_id,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Claim and settle at most one batch of `queue`
    pub async fn run_once(&self, queue: QueueKind) -> Result<RunResult, WorkerError> {
        debug!(%queue, "run_once: called");
        let Some(handler) = self.registry.get(queue) else {
            let parked = self.manager.park_pending(queue).await?;
            error!(%queue, parked, "No handler registered, parked pending tasks as failed");
            return Err(WorkerError::NoHandler(queue));
        };

        let batch_size = self.config.current().queue.batch_size.max(1);
        let tasks = match self.manager.claim_exclusive(queue, batch_size, &self.worker_id).await? {
            Claim::Busy => {
                debug!(%queue, "run_once: batch already in progress");
                return Ok(RunResult::Busy);
            }
            Claim::Batch(tasks) if tasks.is_empty() => {
                debug!(%queue, "run_once: nothing to claim");
                return Ok(RunResult::Idle);
            }
            Claim::Batch(tasks) => tasks,
        };
        info!(%queue, count = tasks.len(), "Claimed batch");

        // A panicking handler must not strand the batch in processing
        let batch = tasks.clone();
        let results = match tokio::spawn(async move { handler.handle_batch(&batch).await }).await {
            Ok(results) => results,
            Err(e) => {
                error!(%queue, error = %e, "Handler failed, retrying whole batch");
                Vec::new()
            }
        };
        let mut outcomes: HashMap<TaskId, Outcome> = results.into_iter().map(|r| (r.id, r.outcome)).collect();

        let mut report = BatchReport {
            batches: 1,
            claimed: tasks.len(),
            ..Default::default()
        };
        // Every task gets settled; the first store error is returned afterwards
        let mut first_error: Option<ManagerError> = None;
        for task in &tasks {
            let outcome = outcomes
                .remove(&task.id)
                .unwrap_or_else(|| Outcome::Retry("no result reported".to_string()));

            if let Err(e) = self.settle(queue, task.id, outcome, &mut report).await {
                if e.is_gone() {
                    warn!(%queue, id = %task.id, error = %e, "Task vanished before it was settled");
                    report.gone += 1;
                } else {
                    error!(%queue, id = %task.id, error = %e, "Failed to settle task");
                    first_error.get_or_insert(e);
                }
            }
        }

        info!(
            %queue,
            done = report.done,
            retried = report.retried,
            dropped = report.dropped,
            exhausted = report.exhausted,
            gone = report.gone,
            "Batch settled"
        );
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(RunResult::Ran(report)),
        }
    }

    async fn settle(
        &self,
        queue: QueueKind,
        id: TaskId,
        outcome: Outcome,
        report: &mut BatchReport,
    ) -> Result<(), ManagerError> {
        match outcome {
            Outcome::Done => {
                if !self.manager.complete(id).await? {
                    return Err(ManagerError::NotFound(id));
                }
                report.done += 1;
            }
            Outcome::Drop(reason) => {
                warn!(%queue, %id, %reason, "Dropping task");
                if !self.manager.complete(id).await? {
                    return Err(ManagerError::NotFound(id));
                }
                report.dropped += 1;
            }
            Outcome::Retry(reason) => match self.manager.fail(id).await? {
                FailOutcome::Retrying { retries, next_retry_at } => {
                    debug!(%queue, %id, %reason, retries, next_retry_at, "settle: task will retry");
                    report.retried += 1;
                }
                FailOutcome::Dropped { retries } => {
                    warn!(%queue, %id, %reason, retries, "Task exhausted its retries");
                    report.exhausted += 1;
                }
            },
        }
        Ok(())
    }

    /// Run batches until the queue is idle or another runner holds it
    pub async fn drain(&self, queue: QueueKind) -> Result<BatchReport, WorkerError> {
        debug!(%queue, "drain: called");
        let mut total = BatchReport::default();
        loop {
            match self.run_once(queue).await? {
                RunResult::Ran(report) => total.absorb(report),
                RunResult::Busy | RunResult::Idle => break,
            }
        }
        Ok(total)
    }
}

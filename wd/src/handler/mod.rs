//! Batch handlers
//!
//! A handler receives a claimed batch and reports one [`Outcome`] per task.
//! The runner turns outcomes into store calls; handlers never touch the
//! store themselves.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use queuestore::{Task, TaskId};

use crate::domain::QueueKind;
use crate::fetch::{FetchError, is_retryable_status};

mod preload;
mod purge;

pub use preload::PreloadHandler;
pub use purge::PurgeHandler;

/// What happened to one task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Finished; remove from the queue
    Done,
    /// Transient failure; back off and try again
    Retry(String),
    /// Permanent failure; remove without retrying
    Drop(String),
}

/// Outcome for one task of a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    pub id: TaskId,
    pub outcome: Outcome,
}

impl TaskResult {
    pub fn new(id: TaskId, outcome: Outcome) -> Self {
        Self { id, outcome }
    }
}

/// Processes claimed batches of one queue
///
/// Tasks missing from the returned results are treated as transient
/// failures.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle_batch(&self, tasks: &[Task]) -> Vec<TaskResult>;
}

/// Handlers by queue
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<QueueKind, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one for the queue
    pub fn register(&mut self, queue: QueueKind, handler: Arc<dyn TaskHandler>) -> &mut Self {
        self.handlers.insert(queue, handler);
        self
    }

    pub fn get(&self, queue: QueueKind) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(&queue).cloned()
    }

    pub fn contains(&self, queue: QueueKind) -> bool {
        self.handlers.contains_key(&queue)
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut queues: Vec<_> = self.handlers.keys().collect();
        queues.sort();
        f.debug_struct("HandlerRegistry").field("queues", &queues).finish()
    }
}

/// 2xx is done, 429/5xx retry, anything else is permanent
pub(crate) fn classify_status(status: u16) -> Outcome {
    if (200..300).contains(&status) {
        Outcome::Done
    } else if is_retryable_status(status) {
        Outcome::Retry(format!("HTTP {}", status))
    } else {
        Outcome::Drop(format!("HTTP {}", status))
    }
}

pub(crate) fn classify_error(error: &FetchError) -> Outcome {
    if error.is_retryable() {
        Outcome::Retry(error.to_string())
    } else {
        Outcome::Drop(error.to_string())
    }
}

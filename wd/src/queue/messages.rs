//! Queue manager messages
//!
//! Commands and responses for the actor pattern.

use std::time::Duration;

use queuestore::{Claim, EnqueueReport, FailOutcome, QueueStats, Task, TaskId};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::domain::QueueKind;

/// Errors from queue operations
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Task not found: {0}")]
    NotFound(TaskId),

    #[error("Task is parked: {0}")]
    Parked(TaskId),

    #[error("Channel error")]
    ChannelError,
}

impl ManagerError {
    /// The task left `processing` through some other path (cleared, parked, completed elsewhere)
    pub fn is_gone(&self) -> bool {
        matches!(self, ManagerError::NotFound(_) | ManagerError::Parked(_))
    }
}

impl From<queuestore::QueueStoreError> for ManagerError {
    fn from(err: queuestore::QueueStoreError) -> Self {
        match err {
            queuestore::QueueStoreError::NotFound(id) => ManagerError::NotFound(id),
            queuestore::QueueStoreError::Parked(id) => ManagerError::Parked(id),
            other => ManagerError::StoreError(other.to_string()),
        }
    }
}

/// Response from queue operations
pub type ManagerResponse<T> = Result<T, ManagerError>;

/// Commands sent to the QueueManager actor
#[derive(Debug)]
pub enum QueueCommand {
    Enqueue {
        queue: QueueKind,
        items: Vec<Value>,
        priority: i64,
        reply: oneshot::Sender<ManagerResponse<EnqueueReport>>,
    },
    ClaimExclusive {
        queue: QueueKind,
        batch_size: usize,
        worker: String,
        reply: oneshot::Sender<ManagerResponse<Claim>>,
    },
    Complete {
        id: TaskId,
        reply: oneshot::Sender<ManagerResponse<bool>>,
    },
    Fail {
        id: TaskId,
        reply: oneshot::Sender<ManagerResponse<FailOutcome>>,
    },
    ResetStale {
        queue: QueueKind,
        timeout: Duration,
        reply: oneshot::Sender<ManagerResponse<usize>>,
    },
    ParkPending {
        queue: QueueKind,
        reply: oneshot::Sender<ManagerResponse<usize>>,
    },
    RequeueFailed {
        queue: QueueKind,
        reply: oneshot::Sender<ManagerResponse<usize>>,
    },
    Clear {
        queue: QueueKind,
        reply: oneshot::Sender<ManagerResponse<usize>>,
    },
    Stats {
        queue: QueueKind,
        reply: oneshot::Sender<ManagerResponse<QueueStats>>,
    },
    List {
        queue: QueueKind,
        limit: usize,
        reply: oneshot::Sender<ManagerResponse<Vec<Task>>>,
    },
}

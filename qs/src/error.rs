//! Queue store error types

use thiserror::Error;

use crate::task::TaskId;

/// Errors that can occur during queue store operations
#[derive(Debug, Error)]
pub enum QueueStoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Payload serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Task not found: {0}")]
    NotFound(TaskId),

    #[error("Task is parked as failed: {0}")]
    Parked(TaskId),

    #[error("Invalid task status in store: {0}")]
    InvalidStatus(String),

    #[error("Store connection lock poisoned")]
    Poisoned,
}

/// Result alias for queue store operations
pub type Result<T> = std::result::Result<T, QueueStoreError>;

//! Worker error types

use thiserror::Error;

use crate::domain::QueueKind;
use crate::queue::ManagerError;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// Pending tasks of the queue were parked as failed
    #[error("No handler registered for queue '{0}'")]
    NoHandler(QueueKind),

    #[error(transparent)]
    Manager(#[from] ManagerError),
}

//! Queue access with actor pattern
//!
//! QueueManager owns the QueueStore and processes commands via channels,
//! so async code never blocks on SQLite directly.

mod manager;
mod messages;

pub use manager::QueueManager;
pub use messages::{ManagerError, ManagerResponse, QueueCommand};

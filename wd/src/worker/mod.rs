//! Batch processing
//!
//! [`BatchRunner`] claims and settles one batch at a time, [`Worker`] drives
//! it from trigger nudges and [`Sweeper`] is the periodic fallback that
//! recovers stale claims and re-nudges idle queues.

mod error;
mod main_loop;
mod runner;
mod sweeper;

pub use error::WorkerError;
pub use main_loop::Worker;
pub use runner::{BatchReport, BatchRunner, RunResult};
pub use sweeper::{SweepReport, Sweeper};

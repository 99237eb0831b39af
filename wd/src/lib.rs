//! warmd - cache warming and purge daemon
//!
//! Producers enqueue URLs into a shared SQLite queue (see the `queuestore`
//! crate) and nudge a worker; the worker claims one batch per queue at a
//! time and issues throttled HEAD/GET preloads or PURGE requests. A periodic
//! sweep recovers abandoned claims and nudges queues whose trigger was lost.

pub mod cli;
pub mod config;
pub mod daemon;
pub mod dispatch;
pub mod domain;
pub mod fetch;
pub mod handler;
pub mod queue;
pub mod server;
pub mod trigger;
pub mod worker;

pub use config::{Config, SharedConfig};
pub use daemon::{Daemon, build_registry};
pub use dispatch::{DispatchReport, Dispatcher};
pub use domain::{DeviceVariant, QueueKind};
pub use fetch::{Fetcher, HttpFetcher};
pub use handler::{HandlerRegistry, Outcome, TaskHandler, TaskResult};
pub use queue::QueueManager;
pub use trigger::Trigger;
pub use worker::{BatchReport, BatchRunner, RunResult, Sweeper, Worker};

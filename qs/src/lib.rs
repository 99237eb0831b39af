//! QueueStore - persistent priority task queue on SQLite
//!
//! Work items are tagged with a logical queue name and deduplicated by a
//! content fingerprint. Workers claim batches in priority order, report
//! success or failure per task, and failed tasks come back after an
//! exponential backoff until a retry ceiling drops them.
//!
//! # Lifecycle
//!
//! ```text
//! enqueue ──► pending ──claim──► processing ──complete──► (deleted)
//!               ▲                    │
//!               │   fail (n < max)   │   fail (n >= max)
//!               └────────────────────┤──────────────────► (deleted)
//!               ▲                    │
//!               └──── reset_stale ───┘
//! ```
//!
//! Every mutation runs inside an `IMMEDIATE` transaction, so several
//! connections (threads or processes) sharing one database file never hand
//! the same task to two workers.
//!
//! # Example
//!
//! ```ignore
//! use queuestore::{QueueStore, StoreOptions};
//! use serde_json::json;
//!
//! let store = QueueStore::open("queue.db", StoreOptions::default())?;
//! store.enqueue("preload", &[json!({"url": "https://example.com/"})], 0)?;
//! for task in store.claim_batch("preload", 10)? {
//!     store.complete(task.id)?;
//! }
//! ```

mod error;
mod fingerprint;
mod retry;
mod schema;
mod store;
mod task;

pub use error::{QueueStoreError, Result};
pub use fingerprint::fingerprint;
pub use retry::{RetryPolicy, backoff_delay};
pub use store::{Claim, EnqueueReport, FailOutcome, QueueStats, QueueStore, StoreOptions};
pub use task::{Task, TaskId, TaskStatus, now_ms};

/// Default retry ceiling
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Base delay of the exponential backoff (2 minutes)
pub const DEFAULT_BACKOFF_BASE_SECS: u64 = 120;

/// Default age after which a `processing` task is presumed abandoned (2 minutes)
pub const DEFAULT_STALE_TIMEOUT_SECS: u64 = 120;

//! Core QueueStore implementation

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{QueueStoreError, Result};
use crate::fingerprint::fingerprint;
use crate::retry::RetryPolicy;
use crate::schema::{CREATE_TABLES, SCHEMA_VERSION, TASK_COLUMNS};
use crate::task::{Task, TaskId, TaskStatus, now_ms};

/// Options for opening a store
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Retry ceiling and backoff applied by `fail`
    pub retry: RetryPolicy,
    /// How long a connection waits for another writer before giving up
    pub busy_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// Result of an enqueue call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EnqueueReport {
    /// New rows created
    pub inserted: usize,
    /// Parked rows moved back to `pending` with a clean retry count
    pub revived: usize,
    /// Existing rows whose priority was raised
    pub bumped: usize,
    /// Existing rows left as they were (priority already >= requested)
    pub unchanged: usize,
}

/// Result of an exclusive claim
#[derive(Debug, Clone, PartialEq)]
pub enum Claim {
    /// Another batch of this queue is still processing
    Busy,
    /// Claimed tasks (may be empty when nothing is eligible)
    Batch(Vec<Task>),
}

/// What `fail` did with a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    /// Back to pending, claimable again at `next_retry_at`
    Retrying { retries: u32, next_retry_at: i64 },
    /// Retry ceiling reached; the task was deleted
    Dropped { retries: u32 },
}

/// Per-queue counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub queue: String,
    pub pending: usize,
    /// Pending tasks still inside their backoff window
    pub delayed: usize,
    pub processing: usize,
    pub failed: usize,
    /// Creation time of the oldest pending task (unix ms)
    pub oldest_pending_at: Option<i64>,
}

impl QueueStats {
    /// Pending tasks that could be claimed right now
    pub fn claimable(&self) -> usize {
        self.pending.saturating_sub(self.delayed)
    }

    pub fn total(&self) -> usize {
        self.pending + self.processing + self.failed
    }
}

/// The persistent task queue
pub struct QueueStore {
    conn: Mutex<Connection>,
    options: StoreOptions,
}

impl std::fmt::Debug for QueueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueStore").field("options", &self.options).finish()
    }
}

impl QueueStore {
    /// Open or create a store at the given database path
    pub fn open(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "Opened queue store");
        Self::init(conn, options)
    }

    /// Open a private in-memory store
    pub fn open_in_memory(options: StoreOptions) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, options)
    }

    fn init(conn: Connection, options: StoreOptions) -> Result<Self> {
        conn.busy_timeout(options.busy_timeout)?;
        let journal_mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        conn.execute_batch(CREATE_TABLES)?;
        conn.execute_batch(&format!("PRAGMA user_version = {};", SCHEMA_VERSION))?;
        debug!(%journal_mode, schema_version = SCHEMA_VERSION, "Queue store initialized");
        Ok(Self {
            conn: Mutex::new(conn),
            options,
        })
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| QueueStoreError::Poisoned)
    }

    // === Producer side ===

    /// Insert work items, or raise the priority of identical ones already queued
    pub fn enqueue(&self, queue: &str, items: &[Value], priority: i64) -> Result<EnqueueReport> {
        self.enqueue_at(queue, items, priority, now_ms())
    }

    pub fn enqueue_at(&self, queue: &str, items: &[Value], priority: i64, now: i64) -> Result<EnqueueReport> {
        debug!(%queue, count = items.len(), priority, "enqueue: called");
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut report = EnqueueReport::default();
        {
            let mut insert = tx.prepare(
                "INSERT INTO tasks (queue, payload, fingerprint, status, priority, retries, next_retry_at, created_at)
                 VALUES (?1, ?2, ?3, 'pending', ?4, 0, ?5, ?5)
                 ON CONFLICT (queue, fingerprint) DO NOTHING",
            )?;
            let mut revive = tx.prepare(
                "UPDATE tasks
                 SET status = 'pending', priority = MAX(priority, ?3), retries = 0, next_retry_at = ?4,
                     claimed_at = NULL, claimed_by = NULL
                 WHERE queue = ?1 AND fingerprint = ?2 AND status = 'failed'",
            )?;
            let mut bump = tx.prepare(
                "UPDATE tasks SET priority = MAX(priority, ?3)
                 WHERE queue = ?1 AND fingerprint = ?2 AND priority < ?3",
            )?;

            for item in items {
                let fp = fingerprint(queue, item);
                let payload = serde_json::to_string(item)?;
                if insert.execute(params![queue, payload, fp, priority, now])? == 1 {
                    report.inserted += 1;
                } else if revive.execute(params![queue, fp, priority, now])? == 1 {
                    report.revived += 1;
                } else if bump.execute(params![queue, fp, priority])? == 1 {
                    report.bumped += 1;
                } else {
                    report.unchanged += 1;
                }
            }
        }
        tx.commit()?;
        info!(
            %queue,
            inserted = report.inserted,
            revived = report.revived,
            bumped = report.bumped,
            "Enqueued tasks"
        );
        Ok(report)
    }

    // === Consumer side ===

    /// Claim up to `batch_size` eligible tasks in priority order
    pub fn claim_batch(&self, queue: &str, batch_size: usize) -> Result<Vec<Task>> {
        self.claim_batch_at(queue, batch_size, None, now_ms())
    }

    pub fn claim_batch_at(&self, queue: &str, batch_size: usize, worker: Option<&str>, now: i64) -> Result<Vec<Task>> {
        debug!(%queue, batch_size, "claim_batch: called");
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let tasks = claim_in(&tx, queue, batch_size, worker, now)?;
        tx.commit()?;
        Ok(tasks)
    }

    /// Claim a batch only if no other batch of this queue is processing
    pub fn claim_exclusive(&self, queue: &str, batch_size: usize, worker: &str) -> Result<Claim> {
        self.claim_exclusive_at(queue, batch_size, worker, now_ms())
    }

    pub fn claim_exclusive_at(&self, queue: &str, batch_size: usize, worker: &str, now: i64) -> Result<Claim> {
        debug!(%queue, batch_size, %worker, "claim_exclusive: called");
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let busy: i64 = tx.query_row(
            "SELECT EXISTS (SELECT 1 FROM tasks WHERE queue = ?1 AND status = 'processing')",
            params![queue],
            |row| row.get(0),
        )?;
        if busy != 0 {
            debug!(%queue, "claim_exclusive: batch already active");
            return Ok(Claim::Busy);
        }
        let tasks = claim_in(&tx, queue, batch_size, Some(worker), now)?;
        tx.commit()?;
        Ok(Claim::Batch(tasks))
    }

    /// Remove a finished task; returns false if it was already gone
    pub fn complete(&self, id: TaskId) -> Result<bool> {
        debug!(%id, "complete: called");
        let conn = self.lock()?;
        let removed = conn.execute("DELETE FROM tasks WHERE id = ?1", params![id.0])?;
        Ok(removed == 1)
    }

    /// Record a transient failure: back off and retry, or drop at the ceiling
    ///
    /// Parked tasks are refused; they only leave `failed` through requeue or re-enqueue.
    pub fn fail(&self, id: TaskId) -> Result<FailOutcome> {
        self.fail_at(id, now_ms())
    }

    pub fn fail_at(&self, id: TaskId, now: i64) -> Result<FailOutcome> {
        debug!(%id, "fail: called");
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let (retries, status): (u32, String) = tx
            .query_row("SELECT retries, status FROM tasks WHERE id = ?1", params![id.0], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .optional()?
            .ok_or(QueueStoreError::NotFound(id))?;
        if status == TaskStatus::Failed.as_str() {
            debug!(%id, "fail: task is parked");
            return Err(QueueStoreError::Parked(id));
        }

        let retries = retries.saturating_add(1);
        let policy = self.options.retry;
        let outcome = if policy.exhausted(retries) {
            tx.execute("DELETE FROM tasks WHERE id = ?1", params![id.0])?;
            warn!(%id, retries, "Task exceeded retry ceiling, dropped");
            FailOutcome::Dropped { retries }
        } else {
            let delay_ms = i64::try_from(policy.delay_for(retries).as_millis()).unwrap_or(i64::MAX);
            let next_retry_at = now.saturating_add(delay_ms);
            tx.execute(
                "UPDATE tasks
                 SET status = 'pending', retries = ?2, next_retry_at = ?3, claimed_at = NULL, claimed_by = NULL
                 WHERE id = ?1",
                params![id.0, retries, next_retry_at],
            )?;
            debug!(%id, retries, next_retry_at, "Task scheduled for retry");
            FailOutcome::Retrying { retries, next_retry_at }
        };
        tx.commit()?;
        Ok(outcome)
    }

    /// Return tasks stuck in `processing` for longer than `timeout` to `pending`
    pub fn reset_stale(&self, queue: &str, timeout: Duration) -> Result<usize> {
        self.reset_stale_at(queue, timeout, now_ms())
    }

    pub fn reset_stale_at(&self, queue: &str, timeout: Duration, now: i64) -> Result<usize> {
        debug!(%queue, ?timeout, "reset_stale: called");
        let cutoff = now.saturating_sub(i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX));
        let conn = self.lock()?;
        let reset = conn.execute(
            "UPDATE tasks SET status = 'pending', claimed_at = NULL, claimed_by = NULL
             WHERE queue = ?1 AND status = 'processing' AND claimed_at < ?2",
            params![queue, cutoff],
        )?;
        if reset > 0 {
            warn!(%queue, reset, "Reset stale processing tasks");
        }
        Ok(reset)
    }

    // === Parking ===

    /// Park every pending task of a queue as `failed`
    pub fn park_pending(&self, queue: &str) -> Result<usize> {
        debug!(%queue, "park_pending: called");
        let conn = self.lock()?;
        Ok(conn.execute(
            "UPDATE tasks SET status = 'failed' WHERE queue = ?1 AND status = 'pending'",
            params![queue],
        )?)
    }

    /// Move parked tasks back to `pending` with a clean retry count
    pub fn requeue_failed(&self, queue: &str) -> Result<usize> {
        self.requeue_failed_at(queue, now_ms())
    }

    pub fn requeue_failed_at(&self, queue: &str, now: i64) -> Result<usize> {
        debug!(%queue, "requeue_failed: called");
        let conn = self.lock()?;
        Ok(conn.execute(
            "UPDATE tasks SET status = 'pending', retries = 0, next_retry_at = ?2
             WHERE queue = ?1 AND status = 'failed'",
            params![queue, now],
        )?)
    }

    /// Delete every task of a queue
    pub fn clear(&self, queue: &str) -> Result<usize> {
        debug!(%queue, "clear: called");
        let conn = self.lock()?;
        Ok(conn.execute("DELETE FROM tasks WHERE queue = ?1", params![queue])?)
    }

    // === Inspection ===

    pub fn get(&self, id: TaskId) -> Result<Option<Task>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                &format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS),
                params![id.0],
                RawTask::from_row,
            )
            .optional()?;
        raw.map(RawTask::into_task).transpose()
    }

    /// Tasks of a queue in dispatch order
    pub fn list(&self, queue: &str, limit: usize) -> Result<Vec<Task>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tasks WHERE queue = ?1 ORDER BY priority DESC, id ASC LIMIT ?2",
            TASK_COLUMNS
        ))?;
        let raws = stmt
            .query_map(params![queue, sql_limit(limit)], RawTask::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raws.into_iter().map(RawTask::into_task).collect()
    }

    /// Number of tasks in a queue, whatever their status
    pub fn len(&self, queue: &str) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM tasks WHERE queue = ?1", params![queue], |row| {
            row.get(0)
        })?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    pub fn is_empty(&self, queue: &str) -> Result<bool> {
        Ok(self.len(queue)? == 0)
    }

    /// Names of queues that hold any task
    pub fn queues(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT DISTINCT queue FROM tasks ORDER BY queue")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    pub fn stats(&self, queue: &str) -> Result<QueueStats> {
        self.stats_at(queue, now_ms())
    }

    pub fn stats_at(&self, queue: &str, now: i64) -> Result<QueueStats> {
        let conn = self.lock()?;
        let mut stats = QueueStats {
            queue: queue.to_string(),
            ..Default::default()
        };

        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM tasks WHERE queue = ?1 GROUP BY status")?;
        let counts = stmt
            .query_map(params![queue], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for (status, count) in counts {
            let count = usize::try_from(count).unwrap_or(0);
            match status.parse::<TaskStatus>().map_err(QueueStoreError::InvalidStatus)? {
                TaskStatus::Pending => stats.pending = count,
                TaskStatus::Processing => stats.processing = count,
                TaskStatus::Failed => stats.failed = count,
            }
        }

        let (delayed, oldest): (i64, Option<i64>) = conn.query_row(
            "SELECT
                 COALESCE(SUM(CASE WHEN next_retry_at > ?2 THEN 1 ELSE 0 END), 0),
                 MIN(created_at)
             FROM tasks WHERE queue = ?1 AND status = 'pending'",
            params![queue, now],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        stats.delayed = usize::try_from(delayed).unwrap_or(0);
        stats.oldest_pending_at = oldest;
        Ok(stats)
    }
}

/// Select and mark eligible tasks inside an open transaction
fn claim_in(conn: &Connection, queue: &str, batch_size: usize, worker: Option<&str>, now: i64) -> Result<Vec<Task>> {
    let mut tasks = {
        let mut select = conn.prepare(&format!(
            "SELECT {} FROM tasks
             WHERE queue = ?1 AND status = 'pending' AND next_retry_at <= ?2
             ORDER BY priority DESC, id ASC
             LIMIT ?3",
            TASK_COLUMNS
        ))?;
        let raws = select
            .query_map(params![queue, now, sql_limit(batch_size)], RawTask::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raws.into_iter().map(RawTask::into_task).collect::<Result<Vec<_>>>()?
    };

    let mut mark =
        conn.prepare("UPDATE tasks SET status = 'processing', claimed_at = ?2, claimed_by = ?3 WHERE id = ?1")?;
    for task in &mut tasks {
        mark.execute(params![task.id.0, now, worker])?;
        task.status = TaskStatus::Processing;
        task.claimed_at = Some(now);
        task.claimed_by = worker.map(str::to_string);
    }

    if !tasks.is_empty() {
        info!(%queue, claimed = tasks.len(), "Claimed batch");
    }
    Ok(tasks)
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// Row as stored, before payload and status are parsed
struct RawTask {
    id: i64,
    queue: String,
    payload: String,
    status: String,
    priority: i64,
    retries: u32,
    next_retry_at: i64,
    fingerprint: String,
    created_at: i64,
    claimed_at: Option<i64>,
    claimed_by: Option<String>,
}

impl RawTask {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            queue: row.get("queue")?,
            payload: row.get("payload")?,
            status: row.get("status")?,
            priority: row.get("priority")?,
            retries: row.get("retries")?,
            next_retry_at: row.get("next_retry_at")?,
            fingerprint: row.get("fingerprint")?,
            created_at: row.get("created_at")?,
            claimed_at: row.get("claimed_at")?,
            claimed_by: row.get("claimed_by")?,
        })
    }

    fn into_task(self) -> Result<Task> {
        Ok(Task {
            id: TaskId(self.id),
            queue: self.queue,
            payload: serde_json::from_str(&self.payload)?,
            status: self.status.parse().map_err(QueueStoreError::InvalidStatus)?,
            priority: self.priority,
            retries: self.retries,
            next_retry_at: self.next_retry_at,
            fingerprint: self.fingerprint,
            created_at: self.created_at,
            claimed_at: self.claimed_at,
            claimed_by: self.claimed_by,
        })
    }
}

//! SQLite schema

/// Current schema version, stored in `PRAGMA user_version`
pub(crate) const SCHEMA_VERSION: i64 = 1;

pub(crate) const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS tasks (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    queue         TEXT    NOT NULL,
    payload       TEXT    NOT NULL,
    fingerprint   TEXT    NOT NULL,
    status        TEXT    NOT NULL DEFAULT 'pending',
    priority      INTEGER NOT NULL DEFAULT 0,
    retries       INTEGER NOT NULL DEFAULT 0,
    next_retry_at INTEGER NOT NULL,
    created_at    INTEGER NOT NULL,
    claimed_at    INTEGER,
    claimed_by    TEXT,
    UNIQUE (queue, fingerprint)
);

CREATE INDEX IF NOT EXISTS idx_tasks_claim
    ON tasks (queue, status, priority DESC, id);
";

pub(crate) const TASK_COLUMNS: &str =
    "id, queue, payload, status, priority, retries, next_retry_at, fingerprint, created_at, claimed_at, claimed_by";

//! Task record types

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque task identifier, assigned in insertion order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub i64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of a task in the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Waiting to be claimed (possibly until `next_retry_at`)
    #[default]
    Pending,
    /// Claimed by a worker
    Processing,
    /// Parked: no handler could run it; never claimed until requeued
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown task status: {}", s)),
        }
    }
}

/// A unit of deferred work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    /// Logical queue name
    pub queue: String,
    /// Opaque JSON payload handed to the handler
    pub payload: Value,
    pub status: TaskStatus,
    /// Higher is dispatched first
    pub priority: i64,
    /// Failures recorded so far
    pub retries: u32,
    /// Not claimable before this instant (unix ms)
    pub next_retry_at: i64,
    /// Dedup key, unique within the queue
    pub fingerprint: String,
    /// Creation timestamp (unix ms)
    pub created_at: i64,
    /// Claim timestamp (unix ms), set while processing
    pub claimed_at: Option<i64>,
    /// Worker that holds the claim
    pub claimed_by: Option<String>,
}

impl Task {
    /// Whether the task may be claimed at `now`
    pub fn is_claimable_at(&self, now: i64) -> bool {
        self.status == TaskStatus::Pending && self.next_retry_at <= now
    }
}

/// Current wall clock as unix milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip_strings() {
        for status in [TaskStatus::Pending, TaskStatus::Processing, TaskStatus::Failed] {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
        assert!("done".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&TaskStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
    }

    #[test]
    fn test_is_claimable_at() {
        let task = Task {
            id: TaskId(1),
            queue: "preload".to_string(),
            payload: Value::Null,
            status: TaskStatus::Pending,
            priority: 0,
            retries: 1,
            next_retry_at: 1_000,
            fingerprint: "abc".to_string(),
            created_at: 0,
            claimed_at: None,
            claimed_by: None,
        };
        assert!(!task.is_claimable_at(999));
        assert!(task.is_claimable_at(1_000));

        let parked = Task {
            status: TaskStatus::Failed,
            ..task
        };
        assert!(!parked.is_claimable_at(5_000));
    }
}

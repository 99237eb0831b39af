//! Logical queues served by the daemon

use serde::{Deserialize, Serialize};

/// A named queue in the shared store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueKind {
    /// Cache warming requests
    Preload,
    /// Cache invalidation requests
    Purge,
}

impl QueueKind {
    /// Every queue, in sweep order
    pub const ALL: [QueueKind; 2] = [QueueKind::Purge, QueueKind::Preload];

    /// Name used as the queue column in the store
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preload => "preload",
            Self::Purge => "purge",
        }
    }
}

impl std::fmt::Display for QueueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for QueueKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "preload" => Ok(Self::Preload),
            "purge" => Ok(Self::Purge),
            _ => Err(format!("Unknown queue: {}", s)),
        }
    }
}

//! JSON payloads stored in each queue

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::DeviceVariant;

/// One page to warm for one device variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreloadPayload {
    pub url: String,
    pub device: DeviceVariant,
}

impl PreloadPayload {
    pub fn new(url: impl Into<String>, device: DeviceVariant) -> Self {
        Self {
            url: url.into(),
            device,
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({ "url": self.url, "device": self.device })
    }
}

/// One page to evict from the cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgePayload {
    pub url: String,
}

impl PurgePayload {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({ "url": self.url })
    }
}

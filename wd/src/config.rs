//! warmd configuration types and loading

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use eyre::{Context, Result};
use queuestore::{RetryPolicy, StoreOptions};
use serde::{Deserialize, Serialize};

use crate::domain::DeviceVariant;

/// Main warmd configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Queue database
    pub store: StoreConfig,

    /// Batching, retry and recovery
    pub queue: QueueConfig,

    /// Preload requests
    pub preload: PreloadConfig,

    /// Purge requests
    pub purge: PurgeConfig,

    /// HTTP trigger endpoint
    pub server: ServerConfig,

    /// Where producers send their "run now" nudge
    pub trigger: TriggerConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Project-local config: ./warmd.yml
        let local_config = PathBuf::from("warmd.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // User config: ~/.config/warmd/warmd.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("warmd").join("warmd.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Options for opening the queue store
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            retry: RetryPolicy {
                max_retries: self.queue.max_retries,
                base_delay: Duration::from_secs(self.queue.backoff_base_secs),
            },
            busy_timeout: Duration::from_millis(self.store.busy_timeout_ms),
        }
    }
}

/// Queue database configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file
    pub path: PathBuf,

    /// Wait for a competing writer this long before failing
    #[serde(rename = "busy-timeout-ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        // XDG data directory (~/.local/share/warmd on Linux)
        let path = dirs::data_dir()
            .map(|d| d.join("warmd"))
            .unwrap_or_else(|| PathBuf::from(".warmd"))
            .join("queue.db");

        Self {
            path,
            busy_timeout_ms: 5_000,
        }
    }
}

/// Batching, retry and stale-recovery settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Tasks claimed per batch
    #[serde(rename = "batch-size")]
    pub batch_size: usize,

    /// Failures after which a task is dropped
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Backoff base; the k-th failure waits 2^k times this
    #[serde(rename = "backoff-base-secs")]
    pub backoff_base_secs: u64,

    /// Processing tasks older than this are presumed abandoned
    #[serde(rename = "stale-timeout-secs")]
    pub stale_timeout_secs: u64,

    /// Period of the fallback sweep
    #[serde(rename = "sweep-interval-secs")]
    pub sweep_interval_secs: u64,

    /// Random extra delay added to each sweep
    #[serde(rename = "sweep-jitter-ms")]
    pub sweep_jitter_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_retries: queuestore::DEFAULT_MAX_RETRIES,
            backoff_base_secs: queuestore::DEFAULT_BACKOFF_BASE_SECS,
            stale_timeout_secs: queuestore::DEFAULT_STALE_TIMEOUT_SECS,
            sweep_interval_secs: 60,
            sweep_jitter_ms: 1_000,
        }
    }
}

impl QueueConfig {
    pub fn stale_timeout(&self) -> Duration {
        Duration::from_secs(self.stale_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// How a preload request touches the page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PreloadMethod {
    /// HEAD request
    #[default]
    Head,
    /// GET with `Range: bytes=0-0`
    Range,
}

/// Preload request settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreloadConfig {
    /// Simultaneous requests per group
    pub concurrency: usize,

    /// Pause between groups
    #[serde(rename = "batch-delay-ms")]
    pub batch_delay_ms: u64,

    /// Per-request timeout
    #[serde(rename = "request-timeout-ms")]
    pub request_timeout_ms: u64,

    pub method: PreloadMethod,

    /// Device variants each URL is warmed for
    pub devices: Vec<DeviceVariant>,

    #[serde(rename = "desktop-user-agent")]
    pub desktop_user_agent: String,

    #[serde(rename = "mobile-user-agent")]
    pub mobile_user_agent: String,
}

impl Default for PreloadConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            batch_delay_ms: 500,
            request_timeout_ms: 10_000,
            method: PreloadMethod::Head,
            devices: vec![DeviceVariant::Desktop, DeviceVariant::Mobile],
            desktop_user_agent: "Mozilla/5.0 (X11; Linux x86_64) warmd-preload".to_string(),
            mobile_user_agent: "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) Mobile warmd-preload"
                .to_string(),
        }
    }
}

impl PreloadConfig {
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn user_agent(&self, device: DeviceVariant) -> &str {
        match device {
            DeviceVariant::Desktop => &self.desktop_user_agent,
            DeviceVariant::Mobile => &self.mobile_user_agent,
        }
    }
}

/// Purge request settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PurgeConfig {
    /// Simultaneous PURGE requests
    pub concurrency: usize,

    /// Queue a preload for every successfully purged URL
    #[serde(rename = "preload-after")]
    pub preload_after: bool,

    /// Priority of those follow-up preloads
    #[serde(rename = "preload-priority")]
    pub preload_priority: i64,
}

impl Default for PurgeConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            preload_after: true,
            preload_priority: 10,
        }
    }
}

/// HTTP trigger endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8787".to_string(),
        }
    }
}

/// Where producers outside the daemon send nudges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// Base URL of a running daemon, e.g. `http://127.0.0.1:8787`
    #[serde(rename = "remote-url")]
    pub remote_url: Option<String>,

    /// Give up on the nudge after this long
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            remote_url: None,
            timeout_ms: 1_000,
        }
    }
}

/// Immutable configuration snapshot with explicit reload
///
/// Readers take an `Arc<Config>` and keep it for the duration of one unit of
/// work; `reload` swaps in a new snapshot without touching readers holding
/// the old one.
#[derive(Debug, Clone)]
pub struct SharedConfig {
    path: Option<PathBuf>,
    current: Arc<RwLock<Arc<Config>>>,
}

impl SharedConfig {
    pub fn new(config: Config, path: Option<PathBuf>) -> Self {
        Self {
            path,
            current: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    /// Current snapshot
    pub fn current(&self) -> Arc<Config> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Re-run the load chain and publish the result
    pub fn reload(&self) -> Result<Arc<Config>> {
        let config = Arc::new(Config::load(self.path.as_ref())?);
        match self.current.write() {
            Ok(mut guard) => *guard = config.clone(),
            Err(poisoned) => *poisoned.into_inner() = config.clone(),
        }
        tracing::info!("Configuration reloaded");
        Ok(config)
    }
}

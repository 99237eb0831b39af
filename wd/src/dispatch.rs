//! Producers: turn URL lists into queued tasks

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use queuestore::EnqueueReport;

use crate::config::SharedConfig;
use crate::domain::{DeviceVariant, PreloadPayload, PurgePayload, QueueKind};
use crate::queue::{ManagerResponse, QueueManager};
use crate::trigger::Trigger;

/// Outcome of a dispatch call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub queue: String,
    #[serde(flatten)]
    pub enqueued: EnqueueReport,
    /// Inputs that were not absolute http(s) URLs
    pub rejected: Vec<String>,
}

/// Enqueues preload and purge work, then nudges the worker
#[derive(Debug, Clone)]
pub struct Dispatcher {
    manager: QueueManager,
    trigger: Trigger,
    config: SharedConfig,
}

impl Dispatcher {
    pub fn new(manager: QueueManager, trigger: Trigger, config: SharedConfig) -> Self {
        Self {
            manager,
            trigger,
            config,
        }
    }

    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    /// Queue one preload per (URL, device variant)
    pub async fn preload(&self, urls: &[String], priority: i64) -> ManagerResponse<DispatchReport> {
        debug!(count = urls.len(), priority, "preload: called");
        let (valid, rejected) = partition_urls(urls);
        let devices = self.config.current().preload.devices.clone();
        let items = preload_items(&valid, &devices);
        self.dispatch(QueueKind::Preload, items, priority, rejected).await
    }

    /// Queue one purge per URL
    pub async fn purge(&self, urls: &[String], priority: i64) -> ManagerResponse<DispatchReport> {
        debug!(count = urls.len(), priority, "purge: called");
        let (valid, rejected) = partition_urls(urls);
        let items = valid.iter().map(|url| PurgePayload::new(url.as_str()).to_value()).collect();
        self.dispatch(QueueKind::Purge, items, priority, rejected).await
    }

    async fn dispatch(
        &self,
        queue: QueueKind,
        items: Vec<Value>,
        priority: i64,
        rejected: Vec<String>,
    ) -> ManagerResponse<DispatchReport> {
        for url in &rejected {
            warn!(%queue, %url, "Rejected invalid URL");
        }

        if items.is_empty() {
            return Ok(DispatchReport {
                queue: queue.to_string(),
                enqueued: EnqueueReport::default(),
                rejected,
            });
        }

        let enqueued = self.manager.enqueue(queue, items, priority).await?;
        info!(
            %queue,
            inserted = enqueued.inserted,
            revived = enqueued.revived,
            bumped = enqueued.bumped,
            unchanged = enqueued.unchanged,
            "Dispatched"
        );

        self.trigger.fire(queue);

        Ok(DispatchReport {
            queue: queue.to_string(),
            enqueued,
            rejected,
        })
    }
}

/// Payloads for every (URL, device) pair
pub fn preload_items(urls: &[String], devices: &[DeviceVariant]) -> Vec<Value> {
    urls.iter()
        .flat_map(|url| devices.iter().map(move |device| PreloadPayload::new(url.as_str(), *device).to_value()))
        .collect()
}

/// Split inputs into trimmed http(s) URLs and everything else
fn partition_urls(urls: &[String]) -> (Vec<String>, Vec<String>) {
    let mut valid = Vec::new();
    let mut rejected = Vec::new();
    for raw in urls {
        let url = raw.trim();
        if url.is_empty() {
            continue;
        }
        match reqwest::Url::parse(url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => valid.push(url.to_string()),
            _ => rejected.push(url.to_string()),
        }
    }
    (valid, rejected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use queuestore::{QueueStore, StoreOptions};

    fn dispatcher() -> (Dispatcher, QueueManager, tokio::sync::mpsc::Receiver<QueueKind>) {
        let manager = QueueManager::spawn(QueueStore::open_in_memory(StoreOptions::default()).unwrap());
        let (trigger, rx) = Trigger::local(8);
        let config = SharedConfig::new(Config::default(), None);
        (Dispatcher::new(manager.clone(), trigger, config), manager, rx)
    }

    #[test]
    fn test_preload_items_per_device() {
        let urls = vec!["https://a/".to_string(), "https://b/".to_string()];
        let items = preload_items(&urls, &[DeviceVariant::Desktop, DeviceVariant::Mobile]);

        assert_eq!(items.len(), 4);
        assert_eq!(items[0]["url"], "https://a/");
        assert_eq!(items[0]["device"], "desktop");
        assert_eq!(items[1]["device"], "mobile");
        assert_eq!(items[2]["url"], "https://b/");
    }

    #[test]
    fn test_partition_urls() {
        let urls = vec![
            " https://a/ ".to_string(),
            "".to_string(),
            "ftp://b/".to_string(),
            "not a url".to_string(),
            "http://c/page".to_string(),
        ];
        let (valid, rejected) = partition_urls(&urls);

        assert_eq!(valid, vec!["https://a/", "http://c/page"]);
        assert_eq!(rejected, vec!["ftp://b/", "not a url"]);
    }

    #[tokio::test]
    async fn test_preload_enqueues_and_nudges() {
        let (dispatcher, manager, mut rx) = dispatcher();
        let report = dispatcher.preload(&["https://a/".to_string()], 5).await.unwrap();

        assert_eq!(report.enqueued.inserted, 2);
        assert_eq!(manager.stats(QueueKind::Preload).await.unwrap().pending, 2);
        assert_eq!(rx.try_recv().unwrap(), QueueKind::Preload);
    }

    #[tokio::test]
    async fn test_repeat_dispatch_dedups() {
        let (dispatcher, manager, mut rx) = dispatcher();
        let urls = vec!["https://a/".to_string()];
        dispatcher.purge(&urls, 0).await.unwrap();

        let report = dispatcher.purge(&urls, 0).await.unwrap();
        assert_eq!(report.enqueued.unchanged, 1);

        let report = dispatcher.purge(&urls, 3).await.unwrap();
        assert_eq!(report.enqueued.bumped, 1);
        assert_eq!(manager.stats(QueueKind::Purge).await.unwrap().pending, 1);

        for _ in 0..3 {
            assert_eq!(rx.try_recv().unwrap(), QueueKind::Purge);
        }
    }

    #[tokio::test]
    async fn test_all_invalid_skips_store() {
        let (dispatcher, manager, mut rx) = dispatcher();
        let report = dispatcher.preload(&["nope".to_string()], 0).await.unwrap();

        assert_eq!(report.rejected, vec!["nope"]);
        assert_eq!(report.enqueued, EnqueueReport::default());
        assert_eq!(manager.stats(QueueKind::Preload).await.unwrap().total(), 0);
        assert!(rx.try_recv().is_err());
    }
}

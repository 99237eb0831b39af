//! Preload handler: warm pages with throttled HEAD or ranged GET requests

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use queuestore::Task;
use tracing::{debug, info};

use super::{Outcome, TaskHandler, TaskResult, classify_error, classify_status};
use crate::config::{PreloadConfig, SharedConfig};
use crate::domain::PreloadPayload;
use crate::fetch::{FetchRequest, Fetcher};

/// Issues `concurrency` requests at a time, pausing `batch-delay` between groups
pub struct PreloadHandler {
    fetcher: Arc<dyn Fetcher>,
    config: SharedConfig,
}

impl PreloadHandler {
    pub fn new(fetcher: Arc<dyn Fetcher>, config: SharedConfig) -> Self {
        Self { fetcher, config }
    }

    async fn preload_one(&self, task: &Task, config: &PreloadConfig) -> TaskResult {
        let payload: PreloadPayload = match serde_json::from_value(task.payload.clone()) {
            Ok(payload) => payload,
            Err(e) => return TaskResult::new(task.id, Outcome::Drop(format!("invalid payload: {}", e))),
        };

        let request = FetchRequest {
            method: config.method.into(),
            url: payload.url,
            user_agent: Some(config.user_agent(payload.device).to_string()),
        };

        let outcome = match self.fetcher.fetch(&request).await {
            Ok(status) => classify_status(status),
            Err(e) => classify_error(&e),
        };
        debug!(id = %task.id, url = %request.url, device = %payload.device, ?outcome, "preload_one: finished");
        TaskResult::new(task.id, outcome)
    }
}

#[async_trait]
impl TaskHandler for PreloadHandler {
    async fn handle_batch(&self, tasks: &[Task]) -> Vec<TaskResult> {
        let config = self.config.current();
        let preload = &config.preload;
        let concurrency = preload.concurrency.max(1);
        debug!(count = tasks.len(), concurrency, "handle_batch: called");

        let mut results = Vec::with_capacity(tasks.len());
        for (index, group) in tasks.chunks(concurrency).enumerate() {
            if index > 0 && !preload.batch_delay().is_zero() {
                tokio::time::sleep(preload.batch_delay()).await;
            }
            results.extend(join_all(group.iter().map(|task| self.preload_one(task, preload))).await);
        }

        let done = results.iter().filter(|r| r.outcome == Outcome::Done).count();
        info!(total = results.len(), done, "Preload batch finished");
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, PreloadMethod};
    use crate::domain::DeviceVariant;
    use crate::fetch::FetchMethod;
    use crate::fetch::client::mock::{MockFetcher, MockReply};
    use queuestore::{TaskId, TaskStatus};
    use std::time::Duration;

    fn task(id: i64, url: &str, device: DeviceVariant) -> Task {
        Task {
            id: TaskId(id),
            queue: "preload".to_string(),
            payload: PreloadPayload::new(url, device).to_value(),
            status: TaskStatus::Processing,
            priority: 0,
            retries: 0,
            next_retry_at: 0,
            fingerprint: format!("fp-{}", id),
            created_at: 0,
            claimed_at: Some(0),
            claimed_by: None,
        }
    }

    fn shared(concurrency: usize, batch_delay_ms: u64, method: PreloadMethod) -> SharedConfig {
        let mut config = Config::default();
        config.preload.concurrency = concurrency;
        config.preload.batch_delay_ms = batch_delay_ms;
        config.preload.method = method;
        SharedConfig::new(config, None)
    }

    #[tokio::test]
    async fn test_classifies_each_response() {
        let fetcher = Arc::new(
            MockFetcher::new(200)
                .script("https://a/gone", vec![MockReply::Status(404)])
                .script("https://a/busy", vec![MockReply::Status(503)])
                .script("https://a/slow", vec![MockReply::Timeout]),
        );
        let handler = PreloadHandler::new(fetcher.clone(), shared(5, 0, PreloadMethod::Head));

        let tasks = vec![
            task(1, "https://a/", DeviceVariant::Desktop),
            task(2, "https://a/gone", DeviceVariant::Desktop),
            task(3, "https://a/busy", DeviceVariant::Desktop),
            task(4, "https://a/slow", DeviceVariant::Desktop),
        ];
        let results = handler.handle_batch(&tasks).await;

        assert_eq!(results.len(), 4);
        assert_eq!(results[0].outcome, Outcome::Done);
        assert!(matches!(results[1].outcome, Outcome::Drop(_)));
        assert!(matches!(results[2].outcome, Outcome::Retry(_)));
        assert!(matches!(results[3].outcome, Outcome::Retry(_)));
    }

    #[tokio::test]
    async fn test_user_agent_and_method_follow_device_and_config() {
        let fetcher = Arc::new(MockFetcher::new(200));
        let handler = PreloadHandler::new(fetcher.clone(), shared(5, 0, PreloadMethod::Range));

        handler
            .handle_batch(&[
                task(1, "https://a/", DeviceVariant::Desktop),
                task(2, "https://a/", DeviceVariant::Mobile),
            ])
            .await;

        let requests = fetcher.requests();
        let config = PreloadConfig::default();
        assert!(requests.iter().all(|r| r.request.method == FetchMethod::Range));
        let agents: Vec<_> = requests.iter().filter_map(|r| r.request.user_agent.clone()).collect();
        assert!(agents.contains(&config.desktop_user_agent));
        assert!(agents.contains(&config.mobile_user_agent));
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let fetcher = Arc::new(MockFetcher::new(200).with_latency(Duration::from_millis(20)));
        let handler = PreloadHandler::new(fetcher.clone(), shared(2, 0, PreloadMethod::Head));

        let tasks: Vec<_> = (1..=7)
            .map(|i| task(i, &format!("https://a/{}", i), DeviceVariant::Desktop))
            .collect();
        let results = handler.handle_batch(&tasks).await;

        assert_eq!(results.len(), 7);
        assert_eq!(fetcher.call_count(), 7);
        assert_eq!(fetcher.peak_in_flight(), 2);
    }

    #[tokio::test]
    async fn test_pause_between_groups() {
        let fetcher = Arc::new(MockFetcher::new(200));
        let handler = PreloadHandler::new(fetcher.clone(), shared(2, 50, PreloadMethod::Head));

        let tasks: Vec<_> = (1..=5)
            .map(|i| task(i, &format!("https://a/{}", i), DeviceVariant::Desktop))
            .collect();
        handler.handle_batch(&tasks).await;

        let requests = fetcher.requests();
        assert_eq!(requests.len(), 5);
        // Groups: [1,2] [3,4] [5]
        assert!(requests[2].at - requests[1].at >= Duration::from_millis(50));
        assert!(requests[4].at - requests[3].at >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_invalid_payload_is_dropped() {
        let fetcher = Arc::new(MockFetcher::new(200));
        let handler = PreloadHandler::new(fetcher.clone(), shared(5, 0, PreloadMethod::Head));

        let mut bad = task(1, "https://a/", DeviceVariant::Desktop);
        bad.payload = serde_json::json!({"link": "https://a/"});
        let results = handler.handle_batch(&[bad]).await;

        assert!(matches!(results[0].outcome, Outcome::Drop(_)));
        assert_eq!(fetcher.call_count(), 0);
    }
}

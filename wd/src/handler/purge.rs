//! Purge handler: evict pages with HTTP PURGE, optionally re-warm them

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use queuestore::Task;
use tracing::{debug, info, warn};

use super::{Outcome, TaskHandler, TaskResult, classify_error, classify_status};
use crate::config::SharedConfig;
use crate::dispatch::Dispatcher;
use crate::domain::PurgePayload;
use crate::fetch::{FetchMethod, FetchRequest, Fetcher};

pub struct PurgeHandler {
    fetcher: Arc<dyn Fetcher>,
    config: SharedConfig,
    /// Follow-up preloads go here when `purge.preload-after` is set
    dispatcher: Option<Dispatcher>,
}

impl PurgeHandler {
    pub fn new(fetcher: Arc<dyn Fetcher>, config: SharedConfig, dispatcher: Option<Dispatcher>) -> Self {
        Self {
            fetcher,
            config,
            dispatcher,
        }
    }

    async fn purge_one(&self, task: &Task) -> (TaskResult, Option<String>) {
        let payload: PurgePayload = match serde_json::from_value(task.payload.clone()) {
            Ok(payload) => payload,
            Err(e) => return (TaskResult::new(task.id, Outcome::Drop(format!("invalid payload: {}", e))), None),
        };

        let request = FetchRequest {
            method: FetchMethod::Purge,
            url: payload.url,
            user_agent: None,
        };

        let outcome = match self.fetcher.fetch(&request).await {
            // Nothing cached is as good as evicted
            Ok(404) => Outcome::Done,
            Ok(status) => classify_status(status),
            Err(e) => classify_error(&e),
        };
        debug!(id = %task.id, url = %request.url, ?outcome, "purge_one: finished");

        let purged = (outcome == Outcome::Done).then_some(request.url);
        (TaskResult::new(task.id, outcome), purged)
    }
}

#[async_trait]
impl TaskHandler for PurgeHandler {
    async fn handle_batch(&self, tasks: &[Task]) -> Vec<TaskResult> {
        let config = self.config.current();
        let concurrency = config.purge.concurrency.max(1);
        debug!(count = tasks.len(), concurrency, "handle_batch: called");

        let mut results = Vec::with_capacity(tasks.len());
        let mut purged = Vec::new();
        for group in tasks.chunks(concurrency) {
            for (result, url) in join_all(group.iter().map(|task| self.purge_one(task))).await {
                results.push(result);
                purged.extend(url);
            }
        }
        info!(total = results.len(), purged = purged.len(), "Purge batch finished");

        if config.purge.preload_after
            && !purged.is_empty()
            && let Some(dispatcher) = &self.dispatcher
        {
            if let Err(e) = dispatcher.preload(&purged, config.purge.preload_priority).await {
                warn!(error = %e, count = purged.len(), "Failed to queue preloads after purge");
            }
        }

        results
    }
}

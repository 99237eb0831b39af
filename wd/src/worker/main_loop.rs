//! Worker - drain queues as nudges arrive

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info};

use super::{BatchRunner, WorkerError};
use crate::domain::QueueKind;

pub struct Worker {
    runner: Arc<BatchRunner>,
    nudges: mpsc::Receiver<QueueKind>,
}

impl Worker {
    pub fn new(runner: Arc<BatchRunner>, nudges: mpsc::Receiver<QueueKind>) -> Self {
        Self { runner, nudges }
    }

    /// Process nudges until shutdown or until every trigger is dropped
    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(worker_id = %self.runner.worker_id(), "Worker starting");

        loop {
            tokio::select! {
                nudge = self.nudges.recv() => {
                    let Some(queue) = nudge else {
                        debug!("run: all triggers dropped");
                        break;
                    };
                    self.drain(queue).await;
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        info!("Worker stopped");
    }

    async fn drain(&self, queue: QueueKind) {
        debug!(%queue, "drain: called");
        match self.runner.drain(queue).await {
            Ok(report) if report.batches > 0 => {
                info!(%queue, batches = report.batches, done = report.done, "Queue drained");
            }
            Ok(_) => debug!(%queue, "drain: nothing to do"),
            Err(WorkerError::NoHandler(_)) => {}
            Err(e) => error!(%queue, error = %e, "Failed to drain queue"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, SharedConfig};
    use crate::handler::{HandlerRegistry, Outcome, TaskHandler, TaskResult};
    use crate::queue::QueueManager;
    use crate::trigger::Trigger;
    use async_trait::async_trait;
    use queuestore::{QueueStore, StoreOptions, Task};
    use serde_json::json;
    use std::time::Duration;

    struct AllDone;

    #[async_trait]
    impl TaskHandler for AllDone {
        async fn handle_batch(&self, tasks: &[Task]) -> Vec<TaskResult> {
            tasks.iter().map(|t| TaskResult::new(t.id, Outcome::Done)).collect()
        }
    }

    #[tokio::test]
    async fn test_worker_drains_on_nudge_and_stops() {
        let manager = QueueManager::spawn(QueueStore::open_in_memory(StoreOptions::default()).unwrap());
        let mut registry = HandlerRegistry::new();
        registry.register(QueueKind::Purge, Arc::new(AllDone));
        let runner = Arc::new(BatchRunner::new(
            manager.clone(),
            Arc::new(registry),
            SharedConfig::new(Config::default(), None),
        ));
        let (trigger, nudges) = Trigger::local(8);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(Worker::new(runner, nudges).run(shutdown_rx));

        manager
            .enqueue(QueueKind::Purge, vec![json!({"url": "https://a/"})], 0)
            .await
            .unwrap();
        trigger.fire(QueueKind::Purge);

        let mut remaining = 1;
        for _ in 0..50 {
            remaining = manager.stats(QueueKind::Purge).await.unwrap().total();
            if remaining == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(remaining, 0);

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
    }
}

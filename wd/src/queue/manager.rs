//! QueueManager - actor that owns QueueStore

use std::time::Duration;

use queuestore::{Claim, EnqueueReport, FailOutcome, QueueStats, QueueStore, Task, TaskId};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::config::Config;
use crate::domain::QueueKind;

use super::messages::{ManagerError, ManagerResponse, QueueCommand};

/// Handle to send commands to the QueueManager
#[derive(Debug, Clone)]
pub struct QueueManager {
    tx: mpsc::Sender<QueueCommand>,
}

impl QueueManager {
    /// Spawn a new QueueManager actor around an open store
    pub fn spawn(store: QueueStore) -> Self {
        debug!(?store, "spawn: called");
        let (tx, rx) = mpsc::channel(256);

        tokio::spawn(actor_loop(store, rx));

        info!("QueueManager spawned");
        Self { tx }
    }

    /// Open the configured store and spawn the actor
    pub fn open(config: &Config) -> eyre::Result<Self> {
        debug!(path = %config.store.path.display(), "open: called");
        let store = QueueStore::open(&config.store.path, config.store_options())?;
        Ok(Self::spawn(store))
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<ManagerResponse<T>>) -> QueueCommand,
    ) -> ManagerResponse<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| ManagerError::ChannelError)?;
        reply_rx.await.map_err(|_| ManagerError::ChannelError)?
    }

    /// Insert payloads, raising the priority of ones already queued
    pub async fn enqueue(&self, queue: QueueKind, items: Vec<Value>, priority: i64) -> ManagerResponse<EnqueueReport> {
        debug!(%queue, count = items.len(), priority, "enqueue: called");
        self.request(|reply| QueueCommand::Enqueue {
            queue,
            items,
            priority,
            reply,
        })
        .await
    }

    /// Claim a batch unless one is already processing for this queue
    pub async fn claim_exclusive(&self, queue: QueueKind, batch_size: usize, worker: &str) -> ManagerResponse<Claim> {
        debug!(%queue, batch_size, %worker, "claim_exclusive: called");
        self.request(|reply| QueueCommand::ClaimExclusive {
            queue,
            batch_size,
            worker: worker.to_string(),
            reply,
        })
        .await
    }

    pub async fn complete(&self, id: TaskId) -> ManagerResponse<bool> {
        debug!(%id, "complete: called");
        self.request(|reply| QueueCommand::Complete { id, reply }).await
    }

    pub async fn fail(&self, id: TaskId) -> ManagerResponse<FailOutcome> {
        debug!(%id, "fail: called");
        self.request(|reply| QueueCommand::Fail { id, reply }).await
    }

    /// Return abandoned processing tasks to pending
    pub async fn reset_stale(&self, queue: QueueKind, timeout: Duration) -> ManagerResponse<usize> {
        debug!(%queue, ?timeout, "reset_stale: called");
        self.request(|reply| QueueCommand::ResetStale { queue, timeout, reply })
            .await
    }

    /// Mark every pending task of a queue as failed
    pub async fn park_pending(&self, queue: QueueKind) -> ManagerResponse<usize> {
        debug!(%queue, "park_pending: called");
        self.request(|reply| QueueCommand::ParkPending { queue, reply }).await
    }

    /// Move failed tasks back to pending
    pub async fn requeue_failed(&self, queue: QueueKind) -> ManagerResponse<usize> {
        debug!(%queue, "requeue_failed: called");
        self.request(|reply| QueueCommand::RequeueFailed { queue, reply }).await
    }

    pub async fn clear(&self, queue: QueueKind) -> ManagerResponse<usize> {
        debug!(%queue, "clear: called");
        self.request(|reply| QueueCommand::Clear { queue, reply }).await
    }

    pub async fn stats(&self, queue: QueueKind) -> ManagerResponse<QueueStats> {
        debug!(%queue, "stats: called");
        self.request(|reply| QueueCommand::Stats { queue, reply }).await
    }

    /// Tasks of a queue in claim order
    pub async fn list(&self, queue: QueueKind, limit: usize) -> ManagerResponse<Vec<Task>> {
        debug!(%queue, limit, "list: called");
        self.request(|reply| QueueCommand::List { queue, limit, reply }).await
    }
}

/// The actor loop that processes commands
async fn actor_loop(store: QueueStore, mut rx: mpsc::Receiver<QueueCommand>) {
    debug!("actor_loop: called");

    while let Some(cmd) = rx.recv().await {
        match cmd {
            QueueCommand::Enqueue {
                queue,
                items,
                priority,
                reply,
            } => {
                debug!(%queue, "actor_loop: Enqueue command");
                let result = store.enqueue(queue.as_str(), &items, priority).map_err(ManagerError::from);
                let _ = reply.send(result);
            }

            QueueCommand::ClaimExclusive {
                queue,
                batch_size,
                worker,
                reply,
            } => {
                debug!(%queue, "actor_loop: ClaimExclusive command");
                let result = store
                    .claim_exclusive(queue.as_str(), batch_size, &worker)
                    .map_err(ManagerError::from);
                let _ = reply.send(result);
            }

            QueueCommand::Complete { id, reply } => {
                debug!(%id, "actor_loop: Complete command");
                let _ = reply.send(store.complete(id).map_err(ManagerError::from));
            }

            QueueCommand::Fail { id, reply } => {
                debug!(%id, "actor_loop: Fail command");
                let _ = reply.send(store.fail(id).map_err(ManagerError::from));
            }

            QueueCommand::ResetStale { queue, timeout, reply } => {
                debug!(%queue, "actor_loop: ResetStale command");
                let result = store.reset_stale(queue.as_str(), timeout).map_err(ManagerError::from);
                let _ = reply.send(result);
            }

            QueueCommand::ParkPending { queue, reply } => {
                debug!(%queue, "actor_loop: ParkPending command");
                let _ = reply.send(store.park_pending(queue.as_str()).map_err(ManagerError::from));
            }

            QueueCommand::RequeueFailed { queue, reply } => {
                debug!(%queue, "actor_loop: RequeueFailed command");
                let _ = reply.send(store.requeue_failed(queue.as_str()).map_err(ManagerError::from));
            }

            QueueCommand::Clear { queue, reply } => {
                debug!(%queue, "actor_loop: Clear command");
                let _ = reply.send(store.clear(queue.as_str()).map_err(ManagerError::from));
            }

            QueueCommand::Stats { queue, reply } => {
                debug!(%queue, "actor_loop: Stats command");
                let _ = reply.send(store.stats(queue.as_str()).map_err(ManagerError::from));
            }

            QueueCommand::List { queue, limit, reply } => {
                debug!(%queue, limit, "actor_loop: List command");
                let _ = reply.send(store.list(queue.as_str(), limit).map_err(ManagerError::from));
            }
        }
    }

    info!("QueueManager actor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use queuestore::StoreOptions;
    use serde_json::json;

    fn manager() -> QueueManager {
        QueueManager::spawn(QueueStore::open_in_memory(StoreOptions::default()).unwrap())
    }

    #[tokio::test]
    async fn test_enqueue_and_stats() {
        let manager = manager();
        let report = manager
            .enqueue(QueueKind::Preload, vec![json!({"url": "https://a/"}), json!({"url": "https://b/"})], 0)
            .await
            .unwrap();
        assert_eq!(report.inserted, 2);

        let stats = manager.stats(QueueKind::Preload).await.unwrap();
        assert_eq!(stats.pending, 2);
        assert_eq!(manager.stats(QueueKind::Purge).await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn test_claim_exclusive_then_busy() {
        let manager = manager();
        manager
            .enqueue(QueueKind::Purge, vec![json!({"url": "https://a/"}), json!({"url": "https://b/"})], 0)
            .await
            .unwrap();

        let Claim::Batch(tasks) = manager.claim_exclusive(QueueKind::Purge, 1, "w1").await.unwrap() else {
            panic!("expected a batch");
        };
        assert_eq!(tasks.len(), 1);
        assert_eq!(manager.claim_exclusive(QueueKind::Purge, 1, "w2").await.unwrap(), Claim::Busy);

        assert!(manager.complete(tasks[0].id).await.unwrap());
        assert!(matches!(
            manager.claim_exclusive(QueueKind::Purge, 1, "w2").await.unwrap(),
            Claim::Batch(ref t) if t.len() == 1
        ));
    }

    #[tokio::test]
    async fn test_fail_and_park() {
        let manager = manager();
        manager
            .enqueue(QueueKind::Preload, vec![json!({"url": "https://a/"}), json!({"url": "https://b/"})], 0)
            .await
            .unwrap();

        let Claim::Batch(tasks) = manager.claim_exclusive(QueueKind::Preload, 1, "w1").await.unwrap() else {
            panic!("expected a batch");
        };
        let outcome = manager.fail(tasks[0].id).await.unwrap();
        assert!(matches!(outcome, FailOutcome::Retrying { retries: 1, .. }));

        assert_eq!(manager.park_pending(QueueKind::Preload).await.unwrap(), 2);
        assert_eq!(manager.stats(QueueKind::Preload).await.unwrap().failed, 2);
        assert_eq!(manager.requeue_failed(QueueKind::Preload).await.unwrap(), 2);
        assert_eq!(manager.clear(QueueKind::Preload).await.unwrap(), 2);
    }
}

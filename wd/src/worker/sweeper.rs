//! Sweeper - periodic fallback for lost nudges and abandoned claims

use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::SharedConfig;
use crate::domain::QueueKind;
use crate::queue::{ManagerResponse, QueueManager};
use crate::trigger::Trigger;

/// What one sweep did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Processing tasks returned to pending
    pub reset: usize,
    /// Queues that were nudged
    pub nudged: Vec<QueueKind>,
}

pub struct Sweeper {
    manager: QueueManager,
    trigger: Trigger,
    queues: Vec<QueueKind>,
    config: SharedConfig,
}

impl Sweeper {
    pub fn new(manager: QueueManager, trigger: Trigger, queues: Vec<QueueKind>, config: SharedConfig) -> Self {
        Self {
            manager,
            trigger,
            queues,
            config,
        }
    }

    /// Sweep on the configured interval plus jitter until shutdown
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(queues = ?self.queues, "Sweeper starting");

        loop {
            let delay = self.next_delay();
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    if let Err(e) = self.sweep().await {
                        warn!(error = %e, "Sweep failed");
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        info!("Sweeper stopped");
    }

    fn next_delay(&self) -> Duration {
        let config = self.config.current();
        let jitter_ms = match config.queue.sweep_jitter_ms {
            0 => 0,
            max => rand::rng().random_range(0..=max),
        };
        config.queue.sweep_interval() + Duration::from_millis(jitter_ms)
    }

    /// Reset stale claims, then nudge queues with claimable work and no batch in flight
    pub async fn sweep(&self) -> ManagerResponse<SweepReport> {
        debug!("sweep: called");
        let timeout = self.config.current().queue.stale_timeout();
        let mut report = SweepReport::default();

        for &queue in &self.queues {
            report.reset += self.manager.reset_stale(queue, timeout).await?;

            let stats = self.manager.stats(queue).await?;
            if stats.processing == 0 && stats.claimable() > 0 {
                debug!(%queue, claimable = stats.claimable(), "sweep: nudging");
                self.trigger.fire(queue);
                report.nudged.push(queue);
            }
        }

        if report.reset > 0 || !report.nudged.is_empty() {
            info!(reset = report.reset, nudged = ?report.nudged, "Sweep finished");
        }
        Ok(report)
    }
}

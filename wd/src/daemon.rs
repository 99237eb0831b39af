//! Daemon assembly: one queue manager, one local worker, sweeper and trigger endpoint

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

use crate::config::SharedConfig;
use crate::dispatch::Dispatcher;
use crate::domain::QueueKind;
use crate::fetch::Fetcher;
use crate::handler::{HandlerRegistry, PreloadHandler, PurgeHandler};
use crate::queue::QueueManager;
use crate::server::{self, AppState};
use crate::trigger::Trigger;
use crate::worker::{BatchRunner, Sweeper, Worker};

/// Pending nudges beyond this are dropped; one per queue is enough
const NUDGE_CAPACITY: usize = 16;

/// Handlers for every queue
pub fn build_registry(fetcher: Arc<dyn Fetcher>, config: &SharedConfig, dispatcher: Option<Dispatcher>) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry
        .register(
            QueueKind::Preload,
            Arc::new(PreloadHandler::new(fetcher.clone(), config.clone())),
        )
        .register(
            QueueKind::Purge,
            Arc::new(PurgeHandler::new(fetcher, config.clone(), dispatcher)),
        );
    registry
}

/// Wired components sharing one local trigger
pub struct Daemon {
    config: SharedConfig,
    manager: QueueManager,
    dispatcher: Dispatcher,
    runner: Arc<BatchRunner>,
    trigger: Trigger,
    nudges: mpsc::Receiver<QueueKind>,
}

impl Daemon {
    pub fn new(config: SharedConfig, manager: QueueManager, fetcher: Arc<dyn Fetcher>) -> Self {
        let (trigger, nudges) = Trigger::local(NUDGE_CAPACITY);
        let dispatcher = Dispatcher::new(manager.clone(), trigger.clone(), config.clone());
        let registry = build_registry(fetcher, &config, Some(dispatcher.clone()));
        let runner = Arc::new(BatchRunner::new(manager.clone(), Arc::new(registry), config.clone()));

        Self {
            config,
            manager,
            dispatcher,
            runner,
            trigger,
            nudges,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn runner(&self) -> &BatchRunner {
        &self.runner
    }

    pub fn manager(&self) -> &QueueManager {
        &self.manager
    }

    /// Run worker, sweeper and trigger endpoint until shutdown is signalled
    pub async fn run(self, listener: TcpListener, shutdown_tx: broadcast::Sender<()>) -> eyre::Result<()> {
        let Daemon {
            config,
            manager,
            dispatcher,
            runner,
            trigger,
            nudges,
        } = self;
        info!(worker_id = %runner.worker_id(), "Daemon starting");

        let worker = tokio::spawn(Worker::new(runner, nudges).run(shutdown_tx.subscribe()));

        let sweeper = Sweeper::new(manager.clone(), trigger, QueueKind::ALL.to_vec(), config);
        // Pick up work left behind by a previous run
        if let Err(e) = sweeper.sweep().await {
            warn!(error = %e, "Initial sweep failed");
        }
        let sweeper = tokio::spawn(sweeper.run(shutdown_tx.subscribe()));

        let mut server_shutdown = shutdown_tx.subscribe();
        let state = AppState { dispatcher, manager };
        server::serve(listener, state, async move {
            let _ = server_shutdown.recv().await;
        })
        .await?;

        // Worker finishes its current batch before exiting
        let _ = worker.await;
        let _ = sweeper.await;

        info!("Daemon stopped");
        Ok(())
    }
}

//! Best-effort "run this queue now" nudges
//!
//! A nudge never blocks the producer and never fails it. When a nudge is
//! lost, the sweeper picks the work up on its next pass.

use std::time::Duration;

use reqwest::Client;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::QueueKind;

/// Where nudges go
#[derive(Debug, Clone)]
pub enum Trigger {
    /// In-process worker channel
    Local(mpsc::Sender<QueueKind>),
    /// `POST {base_url}/run/{queue}` on a running daemon
    Remote { base_url: String, http: Client },
    /// Nudges are dropped; the sweeper is the only driver
    Disabled,
}

impl Trigger {
    /// Trigger for a worker in this process; returns the receiving end
    pub fn local(capacity: usize) -> (Self, mpsc::Receiver<QueueKind>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Trigger::Local(tx), rx)
    }

    /// Trigger for a daemon reachable over HTTP
    pub fn remote(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Trigger::Remote {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Send a nudge without waiting for it to be handled
    ///
    /// Remote nudges run on a spawned task, returned so a short-lived caller
    /// can let it finish before exiting.
    pub fn fire(&self, queue: QueueKind) -> Option<JoinHandle<()>> {
        debug!(%queue, "fire: called");
        match self {
            Trigger::Local(tx) => {
                match tx.try_send(queue) {
                    Ok(()) => debug!(%queue, "fire: nudge queued"),
                    // A pending nudge already covers this one
                    Err(TrySendError::Full(_)) => debug!(%queue, "fire: channel full, dropping nudge"),
                    Err(TrySendError::Closed(_)) => warn!(%queue, "Worker is not running, nudge dropped"),
                }
                None
            }
            Trigger::Remote { base_url, http } => {
                let url = format!("{}/run/{}", base_url, queue);
                let http = http.clone();
                Some(tokio::spawn(async move {
                    match http.post(&url).send().await {
                        Ok(response) => debug!(%url, status = %response.status(), "fire: remote nudge sent"),
                        Err(e) => debug!(%url, error = %e, "fire: remote nudge failed"),
                    }
                }))
            }
            Trigger::Disabled => {
                debug!(%queue, "fire: trigger disabled");
                None
            }
        }
    }
}

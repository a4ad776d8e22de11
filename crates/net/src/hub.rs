//! Shared hub state
//!
//! One `Hub` is created per server and handed to every session task. It
//! owns the client registry and the signal sessions use to learn the hub is
//! closing. Fan-out lives in `broadcast`, file transfers in `relay`; both
//! queue through `deliver`.

use tokio::sync::broadcast;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};

use crate::config::HubConfig;
use crate::registry::{ClientRegistry, ConnectionHandle, Outbound, Recipient};

/// Why an item was not queued for a recipient
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Undelivered {
    /// The recipient's writer is gone
    Closed,
    /// The outbox stayed full for the whole send timeout
    Stalled,
}

/// State shared across all session tasks
pub struct Hub {
    config: HubConfig,
    registry: ClientRegistry,
    closing_tx: broadcast::Sender<()>,
}

impl Hub {
    pub fn new(config: HubConfig) -> Self {
        let (closing_tx, _) = broadcast::channel(1);
        Self {
            config,
            registry: ClientRegistry::new(),
            closing_tx,
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// Receiver that fires once the hub has shut down
    pub fn subscribe_closing(&self) -> broadcast::Receiver<()> {
        self.closing_tx.subscribe()
    }

    /// Queue `item` for each recipient without letting one full outbox hold
    /// up the others.
    ///
    /// Recipients with room get the item immediately. Those with a full
    /// outbox are then given one `send_timeout` wait each.
    pub(crate) async fn deliver(
        &self,
        recipients: Vec<Recipient>,
        item: &Outbound,
    ) -> Vec<(ConnectionHandle, Undelivered)> {
        let mut failed = Vec::new();
        let mut stalled = Vec::new();

        for recipient in recipients {
            match recipient.outbox.try_send(item.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(item)) => stalled.push((recipient, item)),
                Err(TrySendError::Closed(_)) => failed.push((recipient.handle, Undelivered::Closed)),
            }
        }

        let grace = self.config.send_timeout();
        for (recipient, item) in stalled {
            match recipient.outbox.send_timeout(item, grace).await {
                Ok(()) => {}
                Err(SendTimeoutError::Closed(_)) => failed.push((recipient.handle, Undelivered::Closed)),
                Err(SendTimeoutError::Timeout(_)) => failed.push((recipient.handle, Undelivered::Stalled)),
            }
        }

        failed
    }

    pub(crate) fn signal_closing(&self) {
        // No receivers just means no sessions are running
        let _ = self.closing_tx.send(());
    }
}

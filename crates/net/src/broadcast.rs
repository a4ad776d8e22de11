//! Broadcast engine
//!
//! Delivery goes through each connection's outbox, never straight to a
//! socket, and always from a registry snapshot taken before the first send.
//! A recipient whose writer is gone, or whose outbox stays full past the
//! send timeout, is collected and torn down once the pass is over. Removal
//! from the registry closes that client's connection.

use tracing::{debug, info, warn};

use crate::hub::Hub;
use crate::protocol::ServerMessage;
use crate::registry::{ConnectionHandle, Outbound};

impl Hub {
    /// Send `message` to every registered client except `exclude`.
    ///
    /// Clients that cannot be reached are disconnected afterwards.
    pub async fn broadcast(&self, message: ServerMessage, exclude: Option<ConnectionHandle>) {
        let dead = self.fan_out(&message, exclude).await;
        self.reap(dead).await;
    }

    /// Send the current user list to everyone
    pub async fn broadcast_user_list(&self) {
        let users = self.registry().snapshot_usernames().await;
        self.broadcast(ServerMessage::user_list(users), None).await;
    }

    /// Tear down a connection's registration.
    ///
    /// Safe to call for handles that were never registered or were already
    /// removed; only the call that actually removes the entry announces the
    /// departure.
    pub async fn disconnect(&self, handle: ConnectionHandle) {
        self.reap(vec![handle]).await;
    }

    /// Drop every client: best-effort `server_shutdown`, then close.
    pub async fn shutdown(&self) {
        let clients = self.registry().drain().await;
        info!(clients = clients.len(), "Closing all connections");

        for (handle, info, outbox) in clients {
            if outbox
                .try_send(Outbound::Frame(ServerMessage::server_shutdown()))
                .is_err()
            {
                debug!(handle = %handle, username = %info.username, "Shutdown notice not queued");
            }
            let _ = outbox.try_send(Outbound::Close);
        }

        self.signal_closing();
    }

    /// Deliver to a snapshot of recipients; returns the handles that failed
    async fn fan_out(
        &self,
        message: &ServerMessage,
        exclude: Option<ConnectionHandle>,
    ) -> Vec<ConnectionHandle> {
        let recipients = self.registry().recipients(exclude).await;
        let failed = self
            .deliver(recipients, &Outbound::Frame(message.clone()))
            .await;

        failed
            .into_iter()
            .map(|(handle, reason)| {
                warn!(
                    handle = %handle,
                    kind = message.kind(),
                    reason = ?reason,
                    "Failed to send to client"
                );
                handle
            })
            .collect()
    }

    /// Remove each handle and announce it. Announcing can turn up more dead
    /// peers; they join the same worklist.
    async fn reap(&self, mut pending: Vec<ConnectionHandle>) {
        while let Some(handle) = pending.pop() {
            let Some(info) = self.registry().remove(handle).await else {
                continue;
            };

            info!(handle = %handle, username = %info.username, "User left");

            let left = ServerMessage::user_left(&info.username);
            pending.extend(self.fan_out(&left, None).await);

            let users = self.registry().snapshot_usernames().await;
            pending.extend(self.fan_out(&ServerMessage::user_list(users), None).await);
        }
    }
}

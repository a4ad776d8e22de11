//! File relay
//!
//! Pulls a declared-length payload off the sender's stream and hands every
//! other client a `file_data` header plus the bytes as one outbound item.
//! The payload lives only as long as the transfer.
//!
//! Unlike `broadcast`, a recipient that cannot take the file (writer gone
//! or outbox full past the send timeout) is only logged; its registration
//! is left alone.

use std::sync::Arc;

use tokio::io::AsyncRead;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::frame::read_payload;
use crate::hub::Hub;
use crate::protocol::ServerMessage;
use crate::registry::{ConnectionHandle, Outbound};

/// Outcome of one relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayReport {
    /// Bytes actually received from the sender
    pub observed: u64,
    /// Recipients the file was queued for
    pub delivered: usize,
    /// Recipients whose outbox was closed or stayed full
    pub failed: usize,
}

impl Hub {
    /// Receive `declared` bytes from `source` and forward them to every
    /// client other than `sender`.
    ///
    /// If `source` ends early the shorter payload is relayed with its
    /// observed length.
    pub async fn relay<R: AsyncRead + Unpin>(
        &self,
        sender: ConnectionHandle,
        filename: &str,
        declared: u64,
        source: &mut R,
    ) -> Result<RelayReport> {
        self.check_file_size(declared)?;

        let payload = read_payload(source, declared, self.config().file_chunk_size).await?;
        let observed = payload.len() as u64;
        if observed < declared {
            warn!(
                handle = %sender,
                filename,
                declared,
                observed,
                "Sender stream ended before file was complete"
            );
        }
        info!(handle = %sender, filename, bytes = observed, "File received");

        let payload: Arc<[u8]> = payload.into();
        let header = ServerMessage::file_data(filename, observed);
        let recipients = self.registry().recipients(Some(sender)).await;
        let total = recipients.len();

        let failed = self
            .deliver(recipients, &Outbound::File { header, payload })
            .await;
        for (handle, reason) in &failed {
            warn!(handle = %handle, filename, reason = ?reason, "Failed to send file to client");
        }

        let report = RelayReport {
            observed,
            delivered: total - failed.len(),
            failed: failed.len(),
        };

        info!(
            filename,
            delivered = report.delivered,
            failed = report.failed,
            "File broadcast"
        );
        Ok(report)
    }

    /// Reject announcements larger than the configured limit
    pub fn check_file_size(&self, declared: u64) -> Result<()> {
        let max = self.config().max_file_size;
        if declared > max {
            return Err(Error::FileTooLarge { declared, max });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HubConfig;
    use crate::registry::ClientInfo;
    use std::io::Cursor;
    use tokio::sync::mpsc;

    async fn register(hub: &Hub, name: &str) -> (ConnectionHandle, mpsc::Receiver<Outbound>) {
        register_with_capacity(hub, name, 16).await
    }

    async fn register_with_capacity(
        hub: &Hub,
        name: &str,
        capacity: usize,
    ) -> (ConnectionHandle, mpsc::Receiver<Outbound>) {
        let handle = ConnectionHandle::new();
        let (tx, rx) = mpsc::channel(capacity);
        hub.registry()
            .insert(
                handle,
                ClientInfo {
                    username: name.to_string(),
                    remote_address: "127.0.0.1:1".to_string(),
                },
                tx,
            )
            .await;
        (handle, rx)
    }

    fn expect_file(rx: &mut mpsc::Receiver<Outbound>) -> (String, u64, Vec<u8>) {
        match rx.try_recv() {
            Ok(Outbound::File {
                header: ServerMessage::FileData {
                    filename, filesize, ..
                },
                payload,
            }) => (filename, filesize, payload.to_vec()),
            other => panic!("Expected file item, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_relay_full_payload() {
        let hub = Hub::new(HubConfig {
            file_chunk_size: 100,
            ..HubConfig::default()
        });
        let (sender, mut sender_rx) = register(&hub, "sender").await;
        let (_, mut a) = register(&hub, "a").await;
        let (_, mut b) = register(&hub, "b").await;

        let data: Vec<u8> = (0..1000u32).map(|i| (i * 7 % 256) as u8).collect();
        let mut source = Cursor::new(data.clone());

        let report = hub.relay(sender, "x.bin", 1000, &mut source).await.unwrap();
        assert_eq!(
            report,
            RelayReport {
                observed: 1000,
                delivered: 2,
                failed: 0
            }
        );

        for rx in [&mut a, &mut b] {
            let (name, size, bytes) = expect_file(rx);
            assert_eq!(name, "x.bin");
            assert_eq!(size, 1000);
            assert_eq!(bytes, data);
        }
        assert!(sender_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_relay_short_payload_uses_observed_length() {
        let hub = Hub::new(HubConfig::default());
        let (sender, _sender_rx) = register(&hub, "sender").await;
        let (_, mut a) = register(&hub, "a").await;

        let mut source = Cursor::new(vec![9u8; 400]);
        let report = hub.relay(sender, "x.bin", 1000, &mut source).await.unwrap();
        assert_eq!(report.observed, 400);

        let (_, size, bytes) = expect_file(&mut a);
        assert_eq!(size, 400);
        assert_eq!(bytes.len(), 400);
    }

    #[tokio::test]
    async fn test_relay_failure_does_not_disconnect() {
        let hub = Hub::new(HubConfig::default());
        let (sender, _sender_rx) = register(&hub, "sender").await;
        let (dead, dead_rx) = register(&hub, "dead").await;
        let (_, mut live) = register(&hub, "live").await;
        drop(dead_rx);

        let mut source = Cursor::new(vec![1u8; 10]);
        let report = hub.relay(sender, "f", 10, &mut source).await.unwrap();

        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 1);
        assert!(hub.registry().lookup(dead).await.is_some());
        expect_file(&mut live);
    }

    #[tokio::test]
    async fn test_full_outbox_counts_as_failed() {
        let hub = Hub::new(HubConfig {
            send_timeout_ms: 20,
            ..HubConfig::default()
        });
        let (sender, _sender_rx) = register(&hub, "sender").await;
        let (stuck, _stuck_rx) = register_with_capacity(&hub, "stuck", 1).await;
        let (_, mut live) = register(&hub, "live").await;

        let first = hub
            .relay(sender, "a", 4, &mut Cursor::new(vec![1u8; 4]))
            .await
            .unwrap();
        assert_eq!(first.failed, 0);

        let second = hub
            .relay(sender, "b", 4, &mut Cursor::new(vec![2u8; 4]))
            .await
            .unwrap();
        assert_eq!(second.delivered, 1);
        assert_eq!(second.failed, 1);

        // Relay failures never cost a registration
        assert!(hub.registry().lookup(stuck).await.is_some());
        assert_eq!(expect_file(&mut live).0, "a");
        assert_eq!(expect_file(&mut live).0, "b");
    }

    #[tokio::test]
    async fn test_oversized_file_rejected_before_reading() {
        let hub = Hub::new(HubConfig {
            max_file_size: 16,
            ..HubConfig::default()
        });
        let (sender, _rx) = register(&hub, "sender").await;

        let mut source = Cursor::new(vec![0u8; 32]);
        let result = hub.relay(sender, "big", 17, &mut source).await;
        assert!(matches!(result, Err(Error::FileTooLarge { declared: 17, max: 16 })));
        assert_eq!(source.position(), 0);
    }

    #[tokio::test]
    async fn test_empty_file() {
        let hub = Hub::new(HubConfig::default());
        let (sender, _rx) = register(&hub, "sender").await;
        let (_, mut a) = register(&hub, "a").await;

        let mut source = Cursor::new(Vec::new());
        let report = hub.relay(sender, "empty", 0, &mut source).await.unwrap();
        assert_eq!(report.observed, 0);

        let (_, size, bytes) = expect_file(&mut a);
        assert_eq!(size, 0);
        assert!(bytes.is_empty());
    }
}

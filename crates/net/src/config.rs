//! Hub configuration
//!
//! Listen parameters and buffer sizes. Every field has a default, so a
//! partial TOML table (or none at all) yields a usable configuration.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default listen port
pub const DEFAULT_PORT: u16 = 5555;

/// Runtime configuration for the hub
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Interface to bind, e.g. `0.0.0.0` or `::1`
    pub bind_address: String,
    /// TCP port (0 picks an ephemeral port)
    pub port: u16,
    /// Listen backlog
    pub max_pending_connections: u32,
    /// Capacity of each session's buffered reader
    pub read_buffer_size: usize,
    /// Chunk size used while receiving a file payload
    pub file_chunk_size: usize,
    /// Largest accepted control frame, in bytes
    pub max_frame_size: u32,
    /// Largest file a client may announce, in bytes. Larger announcements
    /// are refused and end the sender's session.
    pub max_file_size: u64,
    /// Queued outbound items per connection
    pub outbox_capacity: usize,
    /// How long fan-out waits on a full outbox before giving up on that
    /// client, in milliseconds
    pub send_timeout_ms: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            max_pending_connections: 100,
            read_buffer_size: 4096,
            file_chunk_size: 8192,
            max_frame_size: 1024 * 1024,
            max_file_size: 64 * 1024 * 1024,
            outbox_capacity: 64,
            send_timeout_ms: 2000,
        }
    }
}

impl HubConfig {
    /// Resolve the configured address and port into a socket address
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .bind_address
            .parse()
            .map_err(|_| Error::InvalidAddress(self.bind_address.clone()))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

//! Switchboard relay library
//!
//! A TCP hub that tracks connected clients by handle and fans out chat
//! messages and file payloads to everyone else.
//!
//! # Architecture
//!
//! - **Server**: owns the listening socket, spawns one session per connection
//! - **Session**: reads frames from one client and dispatches them
//! - **Hub**: shared registry plus broadcast and file relay
//! - **Protocol**: length-prefixed JSON control messages; file bytes follow
//!   the frame that announces their length
//!
//! # Usage
//!
//! ```ignore
//! let server = Server::start(HubConfig::default()).await?;
//! server
//!     .run_until(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//! ```

mod broadcast;
pub mod config;
pub mod error;
pub mod frame;
pub mod hub;
pub mod protocol;
pub mod registry;
mod relay;
pub mod server;
pub mod session;

pub use config::{HubConfig, DEFAULT_PORT};
pub use error::{Error, Result};
pub use hub::Hub;
pub use protocol::{ClientMessage, ServerMessage};
pub use registry::{ClientInfo, ClientRegistry, ConnectionHandle, Outbound, Outbox};
pub use relay::RelayReport;
pub use server::Server;

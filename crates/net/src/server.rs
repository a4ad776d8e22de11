//! TCP server accepting relay clients
//!
//! Binds the listening socket and spawns one session per accepted
//! connection. Shutdown notifies every registered client, clears the
//! registry and drops the listener.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::HubConfig;
use crate::error::{Error, Result};
use crate::hub::Hub;
use crate::session::run_session;

/// Pause after a transient accept failure, in milliseconds
const ACCEPT_BACKOFF_MS: u64 = 100;

/// Linux errno values for descriptor exhaustion
const ENFILE: i32 = 23;
const EMFILE: i32 = 24;

/// Relay server handle
pub struct Server {
    addr: SocketAddr,
    hub: Arc<Hub>,
    shutdown_tx: broadcast::Sender<()>,
    acceptor: JoinHandle<Result<()>>,
}

impl Server {
    /// Bind the configured address and start accepting
    pub async fn start(config: HubConfig) -> Result<Self> {
        let listener = bind(&config)?;
        let bound_addr = listener.local_addr()?;

        info!(
            addr = %bound_addr,
            backlog = config.max_pending_connections,
            "Server started"
        );

        let (shutdown_tx, _) = broadcast::channel(1);
        let hub = Arc::new(Hub::new(config));

        let acceptor = tokio::spawn(accept_loop(listener, hub.clone(), shutdown_tx.subscribe()));

        Ok(Server {
            addr: bound_addr,
            hub,
            shutdown_tx,
            acceptor,
        })
    }

    /// Get the server's bound address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Ask the accept loop to stop; `join` waits for it
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        info!("Server shutdown initiated");
    }

    /// Wait for the accept loop to finish
    pub async fn join(self) -> Result<()> {
        self.acceptor
            .await
            .map_err(|e| Error::Io(io::Error::other(e)))?
    }

    /// Serve until `signal` resolves or the listener fails
    pub async fn run_until<F>(mut self, signal: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(signal);

        let finished = tokio::select! {
            _ = &mut signal => None,
            result = &mut self.acceptor => Some(result),
        };

        if let Some(result) = finished {
            return result.map_err(|e| Error::Io(io::Error::other(e)))?;
        }

        self.shutdown();
        self.join().await
    }
}

fn bind(config: &HubConfig) -> Result<TcpListener> {
    let addr = config.listen_addr()?;
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    Ok(socket.listen(config.max_pending_connections)?)
}

/// Accept failures that leave the listener usable
fn is_transient(e: &io::Error) -> bool {
    if matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    ) {
        return true;
    }

    // Out of descriptors; recovers once connections close
    matches!(e.raw_os_error(), Some(ENFILE) | Some(EMFILE))
}

/// Accept incoming connections
async fn accept_loop(
    listener: TcpListener,
    hub: Arc<Hub>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<()> {
    let outcome = loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        info!(addr = %addr, "New connection");
                        tokio::spawn(run_session(stream, addr, hub.clone()));
                    }
                    Err(e) if is_transient(&e) => {
                        warn!(error = %e, "Accept failed; retrying");
                        tokio::time::sleep(Duration::from_millis(ACCEPT_BACKOFF_MS)).await;
                    }
                    Err(e) => {
                        error!(error = %e, "Listener unusable");
                        break Err(Error::Io(e));
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                debug!("Accept loop shutting down");
                break Ok(());
            }
        }
    };

    hub.shutdown().await;
    drop(listener);
    info!("Server stopped");

    outcome
}

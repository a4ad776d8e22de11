//! Client session
//!
//! One task per accepted connection. The socket is split: the session owns
//! the buffered read half and decodes frames; a writer task owns the write
//! half and drains the connection's outbox in order. Everything addressed to
//! a connection, including its own replies, goes through that outbox.
//!
//! A registered session also ends when the hub removes it from the registry,
//! e.g. after its outbox stayed full past the send timeout.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::frame::{drain_payload, read_message, write_message, write_payload};
use crate::hub::Hub;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::registry::{ClientInfo, ConnectionHandle, Outbound, Outbox};

/// How long teardown waits for queued frames to flush before abandoning
/// the writer
const CLOSE_GRACE_MS: u64 = 2000;

/// Session lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Accepted, no `connect` yet
    Connecting,
    /// Registered under `username`
    Active { username: String },
    Terminated,
}

/// Whether the read loop keeps going after a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Per-connection state
pub struct Session {
    handle: ConnectionHandle,
    addr: SocketAddr,
    hub: Arc<Hub>,
    outbox: Outbox,
    state: SessionState,
    /// Fires when this connection leaves the registry
    removed: Option<Arc<Notify>>,
}

impl Session {
    pub fn new(handle: ConnectionHandle, addr: SocketAddr, hub: Arc<Hub>, outbox: Outbox) -> Self {
        Self {
            handle,
            addr,
            hub,
            outbox,
            state: SessionState::Connecting,
            removed: None,
        }
    }

    pub fn handle(&self) -> ConnectionHandle {
        self.handle
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Act on one decoded client message.
    ///
    /// `reader` is the session's own stream; a file transfer reads its raw
    /// payload from it.
    async fn dispatch<R: AsyncRead + Unpin>(&mut self, msg: ClientMessage, reader: &mut R) -> Result<Flow> {
        match msg {
            ClientMessage::Connect { username } => {
                self.handle_connect(username).await;
                Ok(Flow::Continue)
            }
            ClientMessage::Message { content } => {
                self.handle_chat(content).await;
                Ok(Flow::Continue)
            }
            ClientMessage::FileRequest { filename, filesize } => {
                self.handle_file_request(&filename, filesize, reader).await?;
                Ok(Flow::Continue)
            }
            ClientMessage::Disconnect => {
                debug!(handle = %self.handle, "Client requested disconnect");
                Ok(Flow::Stop)
            }
        }
    }

    async fn handle_connect(&mut self, username: String) {
        if let SessionState::Active { username: current } = &self.state {
            warn!(handle = %self.handle, username = %current, "Ignoring repeated connect");
            return;
        }

        let info = ClientInfo {
            username: username.clone(),
            remote_address: self.addr.to_string(),
        };
        let removed = self
            .hub
            .registry()
            .insert(self.handle, info, self.outbox.clone())
            .await;
        self.removed = Some(removed);
        self.state = SessionState::Active {
            username: username.clone(),
        };

        info!(handle = %self.handle, addr = %self.addr, username = %username, "User joined");

        if self
            .outbox
            .send(Outbound::Frame(ServerMessage::connect_success(&username)))
            .await
            .is_err()
        {
            debug!(handle = %self.handle, "Writer gone before connect reply");
        }

        self.hub.broadcast_user_list().await;
        self.hub
            .broadcast(ServerMessage::user_joined(&username), Some(self.handle))
            .await;
    }

    async fn handle_chat(&self, content: String) {
        let Some(sender) = self.hub.registry().lookup(self.handle).await else {
            debug!(handle = %self.handle, "Message from unregistered connection ignored");
            return;
        };

        info!(username = %sender.username, content = %content, "Message");
        self.hub
            .broadcast(ServerMessage::chat(&sender.username, content), None)
            .await;
    }

    async fn handle_file_request<R: AsyncRead + Unpin>(
        &self,
        filename: &str,
        filesize: u64,
        reader: &mut R,
    ) -> Result<()> {
        if let Err(e) = self.hub.check_file_size(filesize) {
            let _ = self
                .outbox
                .try_send(Outbound::Frame(ServerMessage::error(e.to_string())));
            return Err(e);
        }

        let Some(sender) = self.hub.registry().lookup(self.handle).await else {
            // Keep the stream framed even though nobody gets the file
            let drained = drain_payload(reader, filesize).await?;
            debug!(handle = %self.handle, filename, drained, "File from unregistered connection discarded");
            return Ok(());
        };

        info!(username = %sender.username, filename, filesize, "File transfer started");
        self.hub
            .broadcast(
                ServerMessage::file_notification(&sender.username, filename, filesize),
                None,
            )
            .await;

        self.hub.relay(self.handle, filename, filesize, reader).await?;
        Ok(())
    }

    /// Leave the registry (if ever joined) and close the connection
    async fn terminate(mut self, mut writer: JoinHandle<()>) {
        let was_active = matches!(self.state, SessionState::Active { .. });
        self.state = SessionState::Terminated;

        if was_active {
            self.hub.disconnect(self.handle).await;
        }

        let _ = self.outbox.try_send(Outbound::Close);
        drop(self.outbox);

        let grace = Duration::from_millis(CLOSE_GRACE_MS);
        if tokio::time::timeout(grace, &mut writer).await.is_err() {
            debug!(handle = %self.handle, "Writer did not finish in time; aborting");
            writer.abort();
        }

        info!(handle = %self.handle, addr = %self.addr, "Connection closed");
    }
}

/// Drive one accepted connection until it ends
pub async fn run_session(stream: TcpStream, addr: SocketAddr, hub: Arc<Hub>) {
    let handle = ConnectionHandle::new();
    let config = hub.config().clone();
    let mut closing = hub.subscribe_closing();

    let (read_half, write_half) = stream.into_split();
    let mut reader = BufReader::with_capacity(config.read_buffer_size, read_half);

    let (outbox, outbox_rx) = mpsc::channel(config.outbox_capacity.max(1));
    let writer = tokio::spawn(writer_task(write_half, outbox_rx, handle));

    let mut session = Session::new(handle, addr, hub, outbox);
    debug!(handle = %handle, addr = %addr, "Session started");

    loop {
        let removed = session.removed.clone();
        let next = tokio::select! {
            frame = read_message::<_, ClientMessage>(&mut reader, config.max_frame_size) => Some(frame),
            _ = session.outbox.closed() => {
                debug!(handle = %handle, "Writer stopped");
                None
            }
            _ = closing.recv() => {
                debug!(handle = %handle, "Hub closing");
                None
            }
            _ = removal(removed) => {
                debug!(handle = %handle, "Removed from registry");
                None
            }
        };

        let Some(frame) = next else {
            break;
        };

        match frame {
            Ok(msg) => match session.dispatch(msg, &mut reader).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop) => break,
                Err(e) => {
                    warn!(handle = %handle, error = %e, "Session failed");
                    break;
                }
            },
            Err(e) if e.is_recoverable() => {
                warn!(handle = %handle, addr = %addr, error = %e, "Dropping malformed frame");
            }
            Err(Error::ConnectionClosed) => {
                debug!(handle = %handle, "Connection closed by peer");
                break;
            }
            Err(e) => {
                warn!(handle = %handle, error = %e, "Read error");
                break;
            }
        }
    }

    session.terminate(writer).await;
}

/// Resolves once the registry drops this connection; never before it joins
async fn removal(notice: Option<Arc<Notify>>) {
    match notice {
        Some(notice) => notice.notified().await,
        None => std::future::pending().await,
    }
}

/// Writer task - sends queued items to the client in order
async fn writer_task(mut writer: OwnedWriteHalf, mut rx: mpsc::Receiver<Outbound>, handle: ConnectionHandle) {
    while let Some(item) = rx.recv().await {
        let result = match item {
            Outbound::Frame(msg) => write_message(&mut writer, &msg).await,
            Outbound::File { header, payload } => write_file(&mut writer, &header, &payload).await,
            Outbound::Close => break,
        };

        if let Err(e) = result {
            debug!(handle = %handle, error = %e, "Write failed");
            return;
        }
    }

    let _ = writer.shutdown().await;
}

async fn write_file(writer: &mut OwnedWriteHalf, header: &ServerMessage, payload: &[u8]) -> Result<()> {
    write_message(writer, header).await?;
    write_payload(writer, payload).await?;
    Ok(())
}

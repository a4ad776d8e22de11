//! Client registry
//!
//! Maps each registered connection to its client info and outbox. The map
//! sits behind one lock; every method takes it exactly once, so callers never
//! see a half-applied insert or remove. Fan-out works from the point-in-time
//! copies returned by `recipients`, never from the live map.
//!
//! Leaving the registry is what ends a registered connection: every entry
//! carries a removal notice that its session waits on.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, Notify, RwLock};
use uuid::Uuid;

use crate::protocol::ServerMessage;

/// Opaque identity of one live connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionHandle(Uuid);

impl ConnectionHandle {
    /// Mint a fresh handle
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Metadata recorded when a client connects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub username: String,
    pub remote_address: String,
}

/// Work item for a connection's writer task
#[derive(Debug, Clone)]
pub enum Outbound {
    /// One control frame
    Frame(ServerMessage),
    /// A `file_data` frame and its raw bytes, written back-to-back
    File {
        header: ServerMessage,
        payload: Arc<[u8]>,
    },
    /// Flush what is queued, then shut the socket down
    Close,
}

/// Sending side of a connection's writer queue
pub type Outbox = mpsc::Sender<Outbound>;

/// A copied registry entry, safe to use after the lock is released
#[derive(Debug, Clone)]
pub struct Recipient {
    pub handle: ConnectionHandle,
    pub outbox: Outbox,
}

struct Entry {
    info: ClientInfo,
    outbox: Outbox,
    removed: Arc<Notify>,
    /// Insertion order, for stable user lists
    joined: u64,
}

#[derive(Default)]
struct Inner {
    clients: HashMap<ConnectionHandle, Entry>,
    next_join: u64,
}

impl Inner {
    fn ordered(&self) -> Vec<(&ConnectionHandle, &Entry)> {
        let mut entries: Vec<_> = self.clients.iter().collect();
        entries.sort_by_key(|(_, entry)| entry.joined);
        entries
    }
}

/// Shared registry of connected clients
#[derive(Default)]
pub struct ClientRegistry {
    inner: RwLock<Inner>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. Re-inserting a handle replaces its entry.
    ///
    /// The returned notice fires once the entry is removed or drained.
    pub async fn insert(&self, handle: ConnectionHandle, info: ClientInfo, outbox: Outbox) -> Arc<Notify> {
        let removed = Arc::new(Notify::new());
        let mut inner = self.inner.write().await;
        let joined = inner.next_join;
        inner.next_join += 1;
        inner.clients.insert(
            handle,
            Entry {
                info,
                outbox,
                removed: removed.clone(),
                joined,
            },
        );
        removed
    }

    /// Remove a connection; `None` if it was never registered or already gone
    pub async fn remove(&self, handle: ConnectionHandle) -> Option<ClientInfo> {
        let entry = self.inner.write().await.clients.remove(&handle)?;
        entry.removed.notify_one();
        Some(entry.info)
    }

    pub async fn lookup(&self, handle: ConnectionHandle) -> Option<ClientInfo> {
        self.inner
            .read()
            .await
            .clients
            .get(&handle)
            .map(|entry| entry.info.clone())
    }

    /// Usernames in join order (duplicates included)
    pub async fn snapshot_usernames(&self) -> Vec<String> {
        self.inner
            .read()
            .await
            .ordered()
            .into_iter()
            .map(|(_, entry)| entry.info.username.clone())
            .collect()
    }

    /// Registered handles in join order
    pub async fn snapshot_handles(&self) -> Vec<ConnectionHandle> {
        self.inner
            .read()
            .await
            .ordered()
            .into_iter()
            .map(|(handle, _)| *handle)
            .collect()
    }

    /// Copy out every recipient except `exclude`
    pub async fn recipients(&self, exclude: Option<ConnectionHandle>) -> Vec<Recipient> {
        self.inner
            .read()
            .await
            .ordered()
            .into_iter()
            .filter(|(handle, _)| Some(**handle) != exclude)
            .map(|(handle, entry)| Recipient {
                handle: *handle,
                outbox: entry.outbox.clone(),
            })
            .collect()
    }

    /// Empty the registry, returning what it held
    pub async fn drain(&self) -> Vec<(ConnectionHandle, ClientInfo, Outbox)> {
        let mut inner = self.inner.write().await;
        let mut entries: Vec<_> = inner.clients.drain().collect();
        entries.sort_by_key(|(_, entry)| entry.joined);
        entries
            .into_iter()
            .map(|(handle, entry)| {
                entry.removed.notify_one();
                (handle, entry.info, entry.outbox)
            })
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.clients.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.clients.is_empty()
    }
}

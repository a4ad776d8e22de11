//! Control message types
//!
//! All control messages are JSON objects tagged by `type` and travel
//! length-prefixed on the wire (see `frame`). File bytes are not part of
//! any message: they follow a `file_request` or `file_data` frame raw, with
//! the length that frame announces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Messages sent by a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Register under a display name
    Connect { username: String },

    /// Chat text for everyone
    Message {
        #[serde(default)]
        content: String,
    },

    /// Announces `filesize` raw bytes following this frame
    FileRequest {
        #[serde(default = "unknown_filename")]
        filename: String,
        #[serde(default)]
        filesize: u64,
    },

    /// Graceful goodbye
    Disconnect,
}

fn unknown_filename() -> String {
    "unknown".to_string()
}

/// Messages sent by the hub
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Reply to a successful `connect`
    ConnectSuccess {
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Chat text relayed to everyone, sender included
    Message {
        username: String,
        content: String,
        timestamp: DateTime<Utc>,
    },

    UserJoined {
        username: String,
        message: String,
        timestamp: DateTime<Utc>,
    },

    UserLeft {
        username: String,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Registered usernames in join order
    UserList {
        users: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// A client started a transfer (declared size)
    FileNotification {
        username: String,
        filename: String,
        filesize: u64,
        timestamp: DateTime<Utc>,
    },

    /// Followed on the same connection by exactly `filesize` raw bytes
    FileData {
        filename: String,
        filesize: u64,
        timestamp: DateTime<Utc>,
    },

    ServerShutdown { message: String },

    /// Sent to one client just before the hub closes its connection
    Error {
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl ServerMessage {
    pub fn connect_success(username: &str) -> Self {
        ServerMessage::ConnectSuccess {
            message: format!("Welcome {}!", username),
            timestamp: Utc::now(),
        }
    }

    pub fn chat(username: &str, content: String) -> Self {
        ServerMessage::Message {
            username: username.to_string(),
            content,
            timestamp: Utc::now(),
        }
    }

    pub fn user_joined(username: &str) -> Self {
        ServerMessage::UserJoined {
            username: username.to_string(),
            message: format!("{} joined the chat", username),
            timestamp: Utc::now(),
        }
    }

    pub fn user_left(username: &str) -> Self {
        ServerMessage::UserLeft {
            username: username.to_string(),
            message: format!("{} left the chat", username),
            timestamp: Utc::now(),
        }
    }

    pub fn user_list(users: Vec<String>) -> Self {
        ServerMessage::UserList {
            users,
            timestamp: Utc::now(),
        }
    }

    pub fn file_notification(username: &str, filename: &str, filesize: u64) -> Self {
        ServerMessage::FileNotification {
            username: username.to_string(),
            filename: filename.to_string(),
            filesize,
            timestamp: Utc::now(),
        }
    }

    pub fn file_data(filename: &str, filesize: u64) -> Self {
        ServerMessage::FileData {
            filename: filename.to_string(),
            filesize,
            timestamp: Utc::now(),
        }
    }

    pub fn server_shutdown() -> Self {
        ServerMessage::ServerShutdown {
            message: "Server is shutting down".to_string(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Wire name of this message's `type` tag
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::ConnectSuccess { .. } => "connect_success",
            ServerMessage::Message { .. } => "message",
            ServerMessage::UserJoined { .. } => "user_joined",
            ServerMessage::UserLeft { .. } => "user_left",
            ServerMessage::UserList { .. } => "user_list",
            ServerMessage::FileNotification { .. } => "file_notification",
            ServerMessage::FileData { .. } => "file_data",
            ServerMessage::ServerShutdown { .. } => "server_shutdown",
            ServerMessage::Error { .. } => "error",
        }
    }
}

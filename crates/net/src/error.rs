//! Relay error types

use std::io;

/// Relay result type
pub type Result<T> = std::result::Result<T, Error>;

/// Relay errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Empty frame")]
    EmptyFrame,

    #[error("Frame too large: {len} bytes (max {max})")]
    FrameTooLarge { len: u32, max: u32 },

    #[error("Invalid message: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Serialization failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// A `file_request` announced more than `max_file_size` bytes. The
    /// limit bounds how much one transfer may buffer; the sender is told
    /// with an `error` message before its session ends.
    #[error("File too large: {declared} bytes declared (max {max})")]
    FileTooLarge { declared: u64, max: u64 },

    #[error("Invalid listen address: {0}")]
    InvalidAddress(String),
}

impl Error {
    /// Whether the session can keep reading after this error.
    ///
    /// Only content errors qualify: the frame boundary is intact, so the
    /// next frame can still be read. Everything else leaves the stream in
    /// an unknown position or closed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Decode(_) | Error::EmptyFrame)
    }
}

//! Length-prefixed frame encoding/decoding
//!
//! Wire format: [4-byte big-endian length][JSON payload]
//!
//! Raw file bytes are never framed on their own: the control frame in front
//! of them (`file_request` inbound, `file_data` outbound) carries their
//! length, and they follow it directly on the stream.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

fn map_read_err(e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        Error::ConnectionClosed
    } else {
        Error::Io(e)
    }
}

/// Read one length-prefixed frame and return its payload
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R, max_frame_size: u32) -> Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await.map_err(map_read_err)?;

    let len = u32::from_be_bytes(len_buf);
    if len > max_frame_size {
        return Err(Error::FrameTooLarge {
            len,
            max: max_frame_size,
        });
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await.map_err(map_read_err)?;

    if payload.is_empty() {
        return Err(Error::EmptyFrame);
    }
    Ok(payload)
}

/// Write one length-prefixed frame and flush
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    let len = u32::try_from(payload.len()).map_err(|_| {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "frame exceeds u32 length prefix",
        ))
    })?;

    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;

    Ok(())
}

/// Read a frame and decode it as `T`
///
/// A payload that fails to decode leaves the stream positioned at the next
/// frame, so `Error::Decode` is safe to skip.
pub async fn read_message<R, T>(reader: &mut R, max_frame_size: u32) -> Result<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let payload = read_frame(reader, max_frame_size).await?;
    serde_json::from_slice(&payload).map_err(Error::Decode)
}

/// Encode `msg` as JSON and write it as one frame
pub async fn write_message<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = serde_json::to_vec(msg).map_err(Error::Encode)?;
    write_frame(writer, &payload).await
}

/// Read up to `declared` raw bytes in `chunk_size` pieces.
///
/// Stops early if the stream ends; the returned buffer then holds only what
/// actually arrived.
pub async fn read_payload<R: AsyncRead + Unpin>(
    reader: &mut R,
    declared: u64,
    chunk_size: usize,
) -> std::io::Result<Vec<u8>> {
    let chunk_size = chunk_size.max(1);
    let mut payload = Vec::with_capacity(declared.min(chunk_size as u64 * 16) as usize);
    let mut chunk = vec![0u8; chunk_size];
    let mut remaining = declared;

    while remaining > 0 {
        let want = remaining.min(chunk_size as u64) as usize;
        let n = reader.read(&mut chunk[..want]).await?;
        if n == 0 {
            break;
        }
        payload.extend_from_slice(&chunk[..n]);
        remaining -= n as u64;
    }

    Ok(payload)
}

/// Write raw bytes and flush
pub async fn write_payload<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> std::io::Result<()> {
    writer.write_all(payload).await?;
    writer.flush().await
}

/// Consume and discard up to `declared` raw bytes; returns how many were read
pub async fn drain_payload<R: AsyncRead + Unpin>(reader: &mut R, declared: u64) -> std::io::Result<u64> {
    let mut limited = reader.take(declared);
    tokio::io::copy(&mut limited, &mut tokio::io::sink()).await
}

//! Wire codec for the local relay.
//!
//! Each connection carries exactly one frame from client to server, and for
//! activation requests exactly one frame back:
//!
//! ```text
//! [u32 BE length] [u8 tag] [payload: length - 1 bytes]
//! ```
//!
//! Tags:
//! - `0x01`: command URL (UTF-8)
//! - `0x02`: `ACTIVATE` marker (empty payload)
//! - `0x03`: window token (u64 BE)
//!
//! A frame is returned only once it has been read completely, so callers
//! never observe a partial message.

use futures::{FutureExt, select};
use futures_timer::Delay;
use std::future::Future;
use std::pin::pin;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::api::models::{IpcError, WindowHandle};
use crate::types::constants::frame;

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Frame {
    /// A command string to route.
    Command(String),
    /// Bring the primary's window forward and report its handle.
    Activate,
    /// The primary's window handle, in reply to `Activate`.
    WindowToken(WindowHandle),
}

impl Frame {
    /// Serializes the frame including its length prefix.
    pub(crate) fn encode(&self) -> Result<Vec<u8>, IpcError> {
        let (tag, payload): (u8, Vec<u8>) = match self {
            Self::Command(s) => (frame::TAG_COMMAND, s.as_bytes().to_vec()),
            Self::Activate => (frame::TAG_ACTIVATE, Vec::new()),
            Self::WindowToken(h) => (frame::TAG_WINDOW_TOKEN, h.as_u64().to_be_bytes().to_vec()),
        };

        let len = u32::try_from(payload.len() + 1)
            .ok()
            .filter(|len| *len <= frame::MAX_LEN)
            .ok_or_else(|| {
                IpcError::Frame(format!(
                    "payload of {} bytes exceeds {} byte limit",
                    payload.len(),
                    frame::MAX_LEN - 1
                ))
            })?;

        let mut out = Vec::with_capacity(4 + len as usize);
        out.extend_from_slice(&len.to_be_bytes());
        out.push(tag);
        out.extend_from_slice(&payload);
        Ok(out)
    }

    /// Decodes a tag and payload (without the length prefix).
    pub(crate) fn decode(tag: u8, payload: Vec<u8>) -> Result<Self, IpcError> {
        match tag {
            frame::TAG_COMMAND => String::from_utf8(payload)
                .map(Self::Command)
                .map_err(|e| IpcError::Frame(format!("command is not UTF-8: {e}"))),
            frame::TAG_ACTIVATE if payload.is_empty() => Ok(Self::Activate),
            frame::TAG_ACTIVATE => Err(IpcError::Frame(format!(
                "activate marker carries {} unexpected bytes",
                payload.len()
            ))),
            frame::TAG_WINDOW_TOKEN => {
                let raw: [u8; 8] = payload.as_slice().try_into().map_err(|_| {
                    IpcError::Frame(format!("window token must be 8 bytes, got {}", payload.len()))
                })?;
                Ok(Self::WindowToken(WindowHandle::new(u64::from_be_bytes(raw))))
            }
            other => Err(IpcError::Frame(format!("unknown frame tag {other:#04x}"))),
        }
    }
}

/// Writes one frame and flushes.
pub(crate) async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), IpcError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = frame.encode()?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads exactly one frame.
///
/// The length is validated before any payload is allocated; an oversized or
/// empty length is rejected without reading further.
pub(crate) async fn read_frame<R>(reader: &mut R) -> Result<Frame, IpcError>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32().await?;
    if len == 0 || len > frame::MAX_LEN {
        return Err(IpcError::Frame(format!("invalid frame length {len}")));
    }

    let tag = reader.read_u8().await?;
    let mut payload = vec![0u8; len as usize - 1];
    reader.read_exact(&mut payload).await?;

    Frame::decode(tag, payload)
}

/// Races `fut` against a timer (runtime-agnostic).
pub(crate) async fn with_timeout<T, F>(
    fut: F,
    limit: Duration,
    expired: impl FnOnce(Duration) -> IpcError,
) -> Result<T, IpcError>
where
    F: Future<Output = Result<T, IpcError>>,
{
    let mut fut = pin!(fut.fuse());
    let mut delay = pin!(Delay::new(limit).fuse());

    select! {
        res = fut => res,
        _ = delay => Err(expired(limit)),
    }
}

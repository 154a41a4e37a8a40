//! Length-prefixed message framing
//!
//! ```text
//! ┌──────────────────┬──────────────────────────┐
//! │ Length (4 bytes) │ Payload (variable)       │
//! │ Big-endian u32   │ JSON message             │
//! └──────────────────┴──────────────────────────┘
//! ```
//!
//! An oversized length prefix is a protocol violation and ends the stream.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::TransportError;

use super::message::Message;

/// Size of the length prefix
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Default upper bound on a single message payload (1 MiB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Serialize a message with its length prefix
pub fn encode(msg: &Message) -> Result<Bytes, TransportError> {
    let payload = serde_json::to_vec(msg).map_err(|e| TransportError::Encode(e.to_string()))?;
    let len = u32::try_from(payload.len()).map_err(|_| TransportError::MessageTooLarge {
        size: payload.len(),
        max: u32::MAX as usize,
    })?;

    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    buf.put_u32(len);
    buf.put_slice(&payload);
    Ok(buf.freeze())
}

/// Try to take one complete message off the front of `buf`
///
/// Returns `Ok(None)` when more bytes are needed.
pub fn decode(buf: &mut BytesMut, max_size: usize) -> Result<Option<Message>, TransportError> {
    if buf.len() < LENGTH_PREFIX_SIZE {
        return Ok(None);
    }

    let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if len > max_size {
        return Err(TransportError::MessageTooLarge {
            size: len,
            max: max_size,
        });
    }
    if buf.len() < LENGTH_PREFIX_SIZE + len {
        buf.reserve(LENGTH_PREFIX_SIZE + len - buf.len());
        return Ok(None);
    }

    buf.advance(LENGTH_PREFIX_SIZE);
    let payload = buf.split_to(len);
    serde_json::from_slice(&payload)
        .map(Some)
        .map_err(|e| TransportError::Decode(e.to_string()))
}

/// Reads framed messages from a byte stream
///
/// `read_message` is cancel safe: partial input stays buffered.
pub struct MessageReader<R> {
    inner: R,
    buf: BytesMut,
    max_size: usize,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_max_size(inner, DEFAULT_MAX_MESSAGE_SIZE)
    }

    pub fn with_max_size(inner: R, max_size: usize) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(4096),
            max_size,
        }
    }

    /// Read the next message; `Ok(None)` on a clean end of stream
    pub async fn read_message(&mut self) -> Result<Option<Message>, TransportError> {
        loop {
            if let Some(msg) = decode(&mut self.buf, self.max_size)? {
                return Ok(Some(msg));
            }

            let n = self.inner.read_buf(&mut self.buf).await?;
            if n == 0 {
                return if self.buf.is_empty() {
                    Ok(None)
                } else {
                    Err(TransportError::UnexpectedEof)
                };
            }
        }
    }
}

/// Writes framed messages to a byte stream
pub struct MessageWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> MessageWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Encode, write and flush one message
    pub async fn write_message(&mut self, msg: &Message) -> Result<(), TransportError> {
        let bytes = encode(msg)?;
        self.inner.write_all(&bytes).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Close the write side
    pub async fn shutdown(&mut self) -> Result<(), TransportError> {
        self.inner.shutdown().await?;
        Ok(())
    }
}

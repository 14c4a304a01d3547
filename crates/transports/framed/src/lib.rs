//! Length-delimited framed transport for iolink tunnels
//!
//! Carries tunnel messages over any ordered, reliable byte stream (a TCP
//! socket, a Unix socket, an SSH channel): each message is encoded with
//! bincode and prefixed with a 4-byte big-endian length. The core never
//! sees any of this; it only talks to the [`MessageTransport`] trait.

#![warn(clippy::all)]

use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tracing::trace;

use iolink_core::{Error, Message, MessageTransport, Result};

/// Upper bound on one frame.
///
/// Far above the core's chunk bound plus envelope overhead; mainly a guard
/// that fails fast when the stream desynchronizes and the length prefix is
/// garbage.
pub const MAX_FRAME: usize = 1024 * 1024;

/// A [`MessageTransport`] over split read/write halves of a byte stream.
///
/// Both halves sit behind async mutexes so the transport can be driven
/// through `&self` like every other transport; the core serializes sends
/// through its writer task anyway, so the locks are uncontended in
/// practice.
pub struct FramedTransport<R, W> {
    reader: Mutex<R>,
    writer: Mutex<W>,
}

impl<R, W> FramedTransport<R, W>
where
    R: AsyncRead + Send + Unpin,
    W: AsyncWrite + Send + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
        }
    }
}

impl<S> FramedTransport<ReadHalf<S>, WriteHalf<S>>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    /// Split a combined stream into a framed transport
    pub fn from_stream(stream: S) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self::new(reader, writer)
    }
}

#[async_trait]
impl<R, W> MessageTransport for FramedTransport<R, W>
where
    R: AsyncRead + Send + Unpin,
    W: AsyncWrite + Send + Unpin,
{
    async fn send(&self, msg: Message) -> Result<()> {
        let payload = bincode::serialize(&msg)
            .map_err(|e| Error::Transport(format!("frame encode failed: {e}")))?;
        if payload.len() > MAX_FRAME {
            return Err(Error::Transport(format!(
                "outbound frame of {} bytes exceeds the {} byte limit",
                payload.len(),
                MAX_FRAME
            )));
        }
        let mut frame = BytesMut::with_capacity(4 + payload.len());
        frame.put_u32(payload.len() as u32);
        frame.extend_from_slice(&payload);

        let mut writer = self.writer.lock().await;
        writer
            .write_all(&frame)
            .await
            .map_err(|e| Error::Transport(format!("frame write failed: {e}")))?;
        writer
            .flush()
            .await
            .map_err(|e| Error::Transport(format!("frame flush failed: {e}")))?;
        trace!("sent {} byte frame", payload.len());
        Ok(())
    }

    async fn recv(&self) -> Result<Option<Message>> {
        let mut reader = self.reader.lock().await;

        // EOF is only clean on a frame boundary, so the first header byte
        // is read separately: zero bytes here means the peer closed
        // between messages.
        let mut header = [0u8; 4];
        let n = reader
            .read(&mut header[..1])
            .await
            .map_err(|e| Error::Transport(format!("frame read failed: {e}")))?;
        if n == 0 {
            return Ok(None);
        }
        reader
            .read_exact(&mut header[1..])
            .await
            .map_err(|e| Error::Transport(format!("truncated frame header: {e}")))?;

        let len = u32::from_be_bytes(header) as usize;
        if len > MAX_FRAME {
            return Err(Error::Transport(format!(
                "inbound frame of {len} bytes exceeds the {MAX_FRAME} byte limit"
            )));
        }

        let mut payload = vec![0u8; len];
        reader
            .read_exact(&mut payload)
            .await
            .map_err(|e| Error::Transport(format!("truncated frame: {e}")))?;
        trace!("received {} byte frame", len);

        let msg: Message = bincode::deserialize(&payload)
            .map_err(|e| Error::Transport(format!("frame decode failed: {e}")))?;
        msg.validate()?;
        Ok(Some(msg))
    }
}

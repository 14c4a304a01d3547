//! Transport abstraction layer
//!
//! The core knows nothing about wire encodings. A transport only has to
//! deliver whole messages, in order, reliably, with one sender per
//! direction; everything else (framing, sockets, streams) lives in
//! transport crates that implement [`MessageTransport`].

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::message::Message;
use crate::{Error, Result};

/// A message-oriented, ordered, reliable transport.
///
/// # Contract
///
/// * `send` blocks until the transport accepts the message; the core calls
///   it from a single writer task per direction.
/// * `recv` blocks until a message arrives; `Ok(None)` means the peer
///   closed cleanly and is not an error.
///
/// The transport is borrowed by the endpoints, never closed by them.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Send one message
    async fn send(&self, msg: Message) -> Result<()>;

    /// Receive the next message; `Ok(None)` on clean close
    async fn recv(&self) -> Result<Option<Message>>;
}

/// Diagnostic wrapper that logs every message at debug level.
///
/// Transparent by design: results pass through unchanged. The prefix tags
/// which endpoint the trace belongs to.
pub struct Traced<T> {
    inner: T,
    prefix: String,
}

impl<T> Traced<T> {
    pub fn new(inner: T, prefix: impl Into<String>) -> Self {
        Self {
            inner,
            prefix: prefix.into(),
        }
    }
}

#[async_trait]
impl<T: MessageTransport> MessageTransport for Traced<T> {
    async fn send(&self, msg: Message) -> Result<()> {
        debug!("{} >> {}", self.prefix, msg.summary());
        self.inner.send(msg).await
    }

    async fn recv(&self) -> Result<Option<Message>> {
        let received = self.inner.recv().await;
        match &received {
            Ok(Some(msg)) => debug!("{} << {}", self.prefix, msg.summary()),
            Ok(None) => debug!("{} << (closed)", self.prefix),
            Err(e) => debug!("{} << error: {}", self.prefix, e),
        }
        received
    }
}

/// In-memory transport half backed by bounded channels.
///
/// [`pair`] returns two connected halves; what one half sends the other
/// receives. Dropping a half closes its direction, which the peer observes
/// as a clean `Ok(None)`. Used by the test suite and useful for wiring two
/// endpoints inside one process.
pub struct ChannelTransport {
    tx: mpsc::Sender<Message>,
    rx: Mutex<mpsc::Receiver<Message>>,
}

/// Create two connected in-memory transports
pub fn pair() -> (ChannelTransport, ChannelTransport) {
    let (a_tx, b_rx) = mpsc::channel(32);
    let (b_tx, a_rx) = mpsc::channel(32);
    (
        ChannelTransport {
            tx: a_tx,
            rx: Mutex::new(a_rx),
        },
        ChannelTransport {
            tx: b_tx,
            rx: Mutex::new(b_rx),
        },
    )
}

#[async_trait]
impl MessageTransport for ChannelTransport {
    async fn send(&self, msg: Message) -> Result<()> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| Error::Transport("peer closed".to_string()))
    }

    async fn recv(&self) -> Result<Option<Message>> {
        Ok(self.rx.lock().await.recv().await)
    }
}

/// Outbound writer loop: the single owner of `send` for one direction.
///
/// Copiers and the event fan-in enqueue onto the bounded channel feeding
/// this loop, which serializes all sends onto the transport. Exits when
/// every producer has dropped its sender or the session unwinds.
pub(crate) async fn run_writer(
    transport: std::sync::Arc<dyn MessageTransport>,
    mut messages: mpsc::Receiver<Message>,
    done: CancellationToken,
) -> Result<()> {
    loop {
        let msg = tokio::select! {
            _ = done.cancelled() => return Ok(()),
            msg = messages.recv() => match msg {
                Some(msg) => msg,
                None => return Ok(()),
            },
        };
        tokio::select! {
            _ = done.cancelled() => return Ok(()),
            sent = transport.send(msg) => sent?,
        }
    }
}

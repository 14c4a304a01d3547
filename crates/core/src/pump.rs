//! Transport receive pump
//!
//! `recv` blocks on the wire and cannot be interrupted by the session.
//! Isolating it on its own task and forwarding into a bounded channel lets
//! the dispatcher treat "a new message or cancellation" as an ordinary
//! select. An in-flight `recv` may outlive the session; teardown never
//! waits on the wire.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::message::Message;
use crate::transport::MessageTransport;
use crate::Result;

/// Receive loop. On clean transport EOF the channel sender is dropped so
/// the dispatcher observes end-of-channel; any other transport error is
/// returned as this task's result.
pub(crate) async fn run(
    transport: Arc<dyn MessageTransport>,
    inbound: mpsc::Sender<Message>,
    done: CancellationToken,
) -> Result<()> {
    loop {
        let received = tokio::select! {
            _ = done.cancelled() => return Ok(()),
            received = transport.recv() => received?,
        };
        match received {
            Some(msg) => {
                if inbound.send(msg).await.is_err() {
                    // Dispatcher is gone; the session is already unwinding.
                    return Ok(());
                }
            }
            None => {
                debug!("transport closed, stopping receive pump");
                return Ok(());
            }
        }
    }
}

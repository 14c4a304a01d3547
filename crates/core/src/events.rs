//! Attach-side event fan-in
//!
//! Resize and signal events arrive on their own channels, independent of
//! the byte streams, and are forwarded to the outbound writer as control
//! messages. Signals cross the wire by symbolic name; values without a
//! canonical name are dropped before they reach the transport.

use nix::sys::signal::Signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::message::Message;
use crate::signal::name_for;
use crate::{Error, Result};

pub(crate) async fn forward_signals(
    mut signals: mpsc::Receiver<Signal>,
    outbound: mpsc::Sender<Message>,
    done: CancellationToken,
) -> Result<()> {
    loop {
        let signal = tokio::select! {
            _ = done.cancelled() => return Ok(()),
            signal = signals.recv() => match signal {
                Some(signal) => signal,
                None => return Ok(()),
            },
        };
        let Some(name) = name_for(signal) else {
            debug!("dropping signal {} with no canonical name", signal);
            continue;
        };
        tokio::select! {
            _ = done.cancelled() => return Ok(()),
            sent = outbound.send(Message::signal(name)) => {
                sent.map_err(|_| event_writer_closed())?;
            }
        }
    }
}

pub(crate) async fn forward_resizes(
    mut resizes: mpsc::Receiver<(u16, u16)>,
    outbound: mpsc::Sender<Message>,
    done: CancellationToken,
) -> Result<()> {
    loop {
        let (rows, cols) = tokio::select! {
            _ = done.cancelled() => return Ok(()),
            resize = resizes.recv() => match resize {
                Some(resize) => resize,
                None => return Ok(()),
            },
        };
        tokio::select! {
            _ = done.cancelled() => return Ok(()),
            sent = outbound.send(Message::resize(rows.into(), cols.into())) => {
                sent.map_err(|_| event_writer_closed())?;
            }
        }
    }
}

fn event_writer_closed() -> Error {
    Error::Transport("outbound writer closed while forwarding events".to_string())
}

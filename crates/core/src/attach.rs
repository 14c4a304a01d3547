//! Attach endpoint
//!
//! The attach side owns the terminal-facing stdin/stdout/stderr. It opens
//! the session with `Init`, streams local stdin plus resize/signal events
//! to the peer, and writes received stdout/stderr to its local sinks. The
//! session ends naturally once both inbound streams have delivered EOF.

use std::sync::Arc;

use nix::sys::signal::Signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::dispatch::Dispatcher;
use crate::events;
use crate::lifecycle::TaskGroup;
use crate::message::{Message, STDIN_FD};
use crate::transport::{run_writer, MessageTransport};
use crate::{copier, pump};
use crate::{ByteSink, ByteSource, Error, Result};

const OUTBOUND_QUEUE: usize = 32;
const INBOUND_QUEUE: usize = 32;

/// Local terminal I/O handed to the attach endpoint.
///
/// Absent sides are simply not copied; received output for an absent sink
/// is dropped.
#[derive(Default)]
pub struct AttachIo {
    pub stdin: Option<ByteSource>,
    pub stdout: Option<ByteSink>,
    pub stderr: Option<ByteSink>,
    /// Set when `stdin` is controlled by the host (a shared terminal
    /// handle) and must not be closed on teardown. The stdin read task is
    /// then left parked until the host closes the handle; an owned stdin
    /// (the default) is closed when the session unwinds.
    pub host_owned_stdin: bool,
}

/// Attach-side options
#[derive(Default)]
pub struct AttachOptions {
    /// Session id carried in `Init`; a fresh UUID when unset
    pub session_id: Option<String>,
    /// Terminal size changes as `(rows, cols)` pairs
    pub resize_rx: Option<mpsc::Receiver<(u16, u16)>>,
    /// Platform signals to forward to the peer
    pub signal_rx: Option<mpsc::Receiver<Signal>>,
}

/// Run the attach endpoint until the remote output finishes, the caller
/// cancels, or a task fails.
///
/// # Arguments
///
/// * `transport` - message transport shared with the serve peer (borrowed,
///   never closed here)
/// * `io` - local stdin source and stdout/stderr sinks
/// * `opts` - session id and optional event sources
/// * `cancel` - caller's cancellation token
///
/// # Errors
///
/// * `Error::MissingSessionId` - an explicitly empty session id
/// * `Error::Cancelled` - the caller cancelled
/// * transport, protocol and local I/O failures as described on
///   [`crate::Error`]
pub async fn attach(
    transport: Arc<dyn MessageTransport>,
    io: AttachIo,
    opts: AttachOptions,
    cancel: CancellationToken,
) -> Result<()> {
    let session_id = match opts.session_id {
        Some(id) if id.is_empty() => return Err(Error::MissingSessionId),
        Some(id) => id,
        None => Uuid::new_v4().to_string(),
    };
    info!("session {}: attaching", session_id);

    let mut group = TaskGroup::new(&cancel);
    let done = group.done();

    let (out_tx, out_rx) = mpsc::channel(OUTBOUND_QUEUE);
    let (in_tx, in_rx) = mpsc::channel(INBOUND_QUEUE);

    // Init goes into the queue before the writer starts, so it is on the
    // wire ahead of anything the copiers produce.
    out_tx
        .send(Message::init(&session_id))
        .await
        .map_err(|_| Error::Transport("outbound queue closed before init".to_string()))?;

    group.spawn(
        "writer",
        run_writer(transport.clone(), out_rx, done.clone()),
    );
    group.spawn("recv-pump", pump::run(transport.clone(), in_tx, done.clone()));

    if let Some(stdin) = io.stdin {
        let shutdown = (!io.host_owned_stdin).then(|| done.clone());
        let chunks = copier::spawn_source_pump(STDIN_FD, stdin, shutdown);
        group.spawn(
            "stdin-copier",
            copier::copy_to_transport(STDIN_FD, chunks, out_tx.clone(), done.clone()),
        );
    }
    if let Some(resize_rx) = opts.resize_rx {
        group.spawn(
            "resize-events",
            events::forward_resizes(resize_rx, out_tx.clone(), done.clone()),
        );
    }
    if let Some(signal_rx) = opts.signal_rx {
        group.spawn(
            "signal-events",
            events::forward_signals(signal_rx, out_tx.clone(), done.clone()),
        );
    }

    let dispatcher = Dispatcher::attach(session_id.clone(), io.stdout, io.stderr);
    group.spawn("dispatcher", dispatcher.run(in_rx, done.clone()));

    // The group's producers hold the remaining outbound senders.
    drop(out_tx);

    let result = group.join(&cancel).await;
    info!("session {}: attach finished", session_id);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::pair;

    #[tokio::test]
    async fn test_explicit_empty_session_id_is_rejected() {
        let (near, _far) = pair();
        let err = attach(
            Arc::new(near),
            AttachIo::default(),
            AttachOptions {
                session_id: Some(String::new()),
                ..Default::default()
            },
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::MissingSessionId));
    }

    #[tokio::test]
    async fn test_init_is_first_on_the_wire() {
        let (near, far) = pair();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(attach(
            Arc::new(near),
            AttachIo {
                stdin: Some(Box::new(&b"data"[..])),
                ..Default::default()
            },
            AttachOptions {
                session_id: Some("s1".to_string()),
                ..Default::default()
            },
            cancel.clone(),
        ));

        assert_eq!(far.recv().await.unwrap(), Some(Message::init("s1")));
        assert_eq!(
            far.recv().await.unwrap(),
            Some(Message::data(STDIN_FD, b"data".to_vec()))
        );
        assert_eq!(far.recv().await.unwrap(), Some(Message::eof(STDIN_FD)));

        cancel.cancel();
        let result = task.await.unwrap();
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_generated_session_id_is_unique() {
        let (near_a, far_a) = pair();
        let (near_b, far_b) = pair();
        let cancel = CancellationToken::new();

        for near in [near_a, near_b] {
            tokio::spawn(attach(
                Arc::new(near),
                AttachIo::default(),
                AttachOptions::default(),
                cancel.clone(),
            ));
        }

        let id_of = |msg: Option<Message>| match msg {
            Some(Message::Init(init)) => init.session_id,
            other => panic!("expected init, got {:?}", other),
        };
        let a = id_of(far_a.recv().await.unwrap());
        let b = id_of(far_b.recv().await.unwrap());
        assert!(!a.is_empty());
        assert_ne!(a, b);
        cancel.cancel();
    }
}

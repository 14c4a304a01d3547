//! Serve endpoint
//!
//! The serve side hosts the process whose stdin/stdout/stderr is being
//! multiplexed. It requires `Init` as the first inbound message, hands the
//! session id to the initializer hook, then streams process stdout/stderr
//! to the peer while feeding received stdin into the process.

use std::sync::Arc;

use async_trait::async_trait;
use nix::sys::signal::Signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::dispatch::Dispatcher;
use crate::lifecycle::TaskGroup;
use crate::message::{InitPayload, Message, STDERR_FD, STDOUT_FD};
use crate::transport::{run_writer, MessageTransport};
use crate::{copier, pump};
use crate::{ByteSink, ByteSource, Error, Result};

const OUTBOUND_QUEUE: usize = 32;
const INBOUND_QUEUE: usize = 32;

/// Callbacks the serve side exposes to its host.
///
/// All methods default to no-ops. `initialize` failures are fatal to the
/// session; `resize` and `signal` failures are logged and swallowed.
#[async_trait]
pub trait ServeHooks: Send + Sync {
    /// Called once with the peer's init payload before any data flows
    async fn initialize(&self, init: &InitPayload) -> Result<()> {
        let _ = init;
        Ok(())
    }

    /// Terminal size changed on the attach side
    async fn resize(&self, rows: u32, cols: u32) -> Result<()> {
        let _ = (rows, cols);
        Ok(())
    }

    /// The attach side forwarded a signal
    async fn signal(&self, signal: Signal) -> Result<()> {
        let _ = signal;
        Ok(())
    }
}

/// Hooks for serves that ignore init, resize and signal events
pub struct NoHooks;

impl ServeHooks for NoHooks {}

/// Local I/O of the hosted process, as seen from the serve endpoint.
///
/// Absent sides are simply not copied; received stdin for an absent sink
/// is dropped.
#[derive(Default)]
pub struct ServeIo {
    pub stdin: Option<ByteSink>,
    pub stdout: Option<ByteSource>,
    pub stderr: Option<ByteSource>,
}

/// Run the serve endpoint until the peer disconnects, the caller cancels,
/// or a task fails.
///
/// # Arguments
///
/// * `transport` - message transport shared with the attach peer (borrowed,
///   never closed here)
/// * `io` - the hosted process's stdin sink and stdout/stderr sources
/// * `hooks` - initializer and control-event callbacks
/// * `cancel` - caller's cancellation token
///
/// # Errors
///
/// * `Error::UnexpectedMessage` / `Error::MissingSessionId` - the peer did
///   not open with a well-formed `Init`
/// * `Error::Initialize` - the initializer hook rejected the session
/// * `Error::Cancelled` - the caller cancelled
/// * transport and local I/O failures as described on [`crate::Error`]
pub async fn serve(
    transport: Arc<dyn MessageTransport>,
    io: ServeIo,
    hooks: Arc<dyn ServeHooks>,
    cancel: CancellationToken,
) -> Result<()> {
    let init = recv_init(transport.as_ref(), &cancel).await?;
    let session_id = init.session_id.clone();
    info!("session {}: serving", session_id);

    // A hung initializer must not make the session uncancellable.
    tokio::select! {
        _ = cancel.cancelled() => return Err(Error::Cancelled),
        initialized = hooks.initialize(&init) => {
            initialized.map_err(|e| Error::Initialize(e.to_string()))?;
        }
    }

    let mut group = TaskGroup::new(&cancel);
    let done = group.done();

    let (out_tx, out_rx) = mpsc::channel(OUTBOUND_QUEUE);
    let (in_tx, in_rx) = mpsc::channel(INBOUND_QUEUE);

    group.spawn(
        "writer",
        run_writer(transport.clone(), out_rx, done.clone()),
    );
    group.spawn("recv-pump", pump::run(transport.clone(), in_tx, done.clone()));

    // The process pipes are owned by this endpoint, so teardown closes
    // them through the pump's shutdown token.
    if let Some(stdout) = io.stdout {
        let chunks = copier::spawn_source_pump(STDOUT_FD, stdout, Some(done.clone()));
        group.spawn(
            "stdout-copier",
            copier::copy_to_transport(STDOUT_FD, chunks, out_tx.clone(), done.clone()),
        );
    }
    if let Some(stderr) = io.stderr {
        let chunks = copier::spawn_source_pump(STDERR_FD, stderr, Some(done.clone()));
        group.spawn(
            "stderr-copier",
            copier::copy_to_transport(STDERR_FD, chunks, out_tx.clone(), done.clone()),
        );
    }

    let dispatcher = Dispatcher::serve(session_id.clone(), io.stdin, hooks);
    group.spawn("dispatcher", dispatcher.run(in_rx, done.clone()));

    // The group's copiers hold the remaining outbound senders.
    drop(out_tx);

    let result = group.join(&cancel).await;
    info!("session {}: serve finished", session_id);
    result
}

/// First message must be `Init` with a non-empty session id.
async fn recv_init(
    transport: &dyn MessageTransport,
    cancel: &CancellationToken,
) -> Result<InitPayload> {
    let first = tokio::select! {
        _ = cancel.cancelled() => return Err(Error::Cancelled),
        first = transport.recv() => first?,
    };
    match first {
        None => Err(Error::Transport(
            "transport closed before init".to_string(),
        )),
        Some(Message::Init(init)) => {
            init_message_valid(&init)?;
            Ok(init)
        }
        Some(other) => Err(Error::UnexpectedMessage(format!(
            "expected init, got {}",
            other.kind()
        ))),
    }
}

fn init_message_valid(init: &InitPayload) -> Result<()> {
    if init.session_id.is_empty() {
        return Err(Error::MissingSessionId);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::pair;

    #[tokio::test]
    async fn test_recv_init_accepts_valid_init() {
        let (near, far) = pair();
        far.send(Message::init("s1")).await.unwrap();
        let init = recv_init(&near, &CancellationToken::new()).await.unwrap();
        assert_eq!(init.session_id, "s1");
    }

    #[tokio::test]
    async fn test_recv_init_rejects_non_init_first_message() {
        let (near, far) = pair();
        far.send(Message::data(0, b"x".to_vec())).await.unwrap();
        let err = recv_init(&near, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_protocol_violation());
    }

    #[tokio::test]
    async fn test_recv_init_rejects_empty_session_id() {
        let (near, far) = pair();
        far.send(Message::init("")).await.unwrap();
        let err = recv_init(&near, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingSessionId));
    }

    #[tokio::test]
    async fn test_recv_init_honors_cancellation() {
        let (near, _far) = pair();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = recv_init(&near, &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    struct HangingHooks;

    #[async_trait]
    impl ServeHooks for HangingHooks {
        async fn initialize(&self, _init: &InitPayload) -> Result<()> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_cancellation_unblocks_hung_initializer() {
        let (near, far) = pair();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(serve(
            Arc::new(near),
            ServeIo::default(),
            Arc::new(HangingHooks),
            cancel.clone(),
        ));

        far.send(Message::init("s1")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        cancel.cancel();

        let result = tokio::time::timeout(std::time::Duration::from_secs(1), task)
            .await
            .expect("serve should unwind despite the hung initializer")
            .unwrap();
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}

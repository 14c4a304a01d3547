//! Inbound message dispatcher
//!
//! Consumes the receive pump's channel and routes each message: `File`
//! chunks to the local sink for that descriptor, `Resize` and `Signal`
//! events to the configured hooks. Tracks per-descriptor EOF so late
//! chunks are discarded, and owns the done signal: whichever way the
//! dispatcher exits, the rest of the session unwinds behind it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::message::{FilePayload, Message, ResizePayload, SignalPayload};
use crate::message::{STDERR_FD, STDIN_FD, STDOUT_FD};
use crate::serve::ServeHooks;
use crate::signal::signal_for;
use crate::{ByteSink, Error, Result};

enum Flow {
    Continue,
    Done,
}

struct FdSink {
    sink: ByteSink,
    /// Serve closes its process stdin on EOF; attach leaves the local
    /// stdout/stderr open because the host may share those descriptors.
    close_on_eof: bool,
}

pub(crate) struct Dispatcher {
    session: String,
    sinks: HashMap<u32, FdSink>,
    expected: &'static [u32],
    eof_seen: HashSet<u32>,
    hooks: Option<Arc<dyn ServeHooks>>,
    /// Attach treats "every inbound descriptor has delivered EOF" as the
    /// natural end of the session (the remote process is finished).
    complete_on_all_eof: bool,
}

impl Dispatcher {
    pub(crate) fn attach(
        session: String,
        stdout: Option<ByteSink>,
        stderr: Option<ByteSink>,
    ) -> Self {
        let mut sinks = HashMap::new();
        if let Some(sink) = stdout {
            sinks.insert(
                STDOUT_FD,
                FdSink {
                    sink,
                    close_on_eof: false,
                },
            );
        }
        if let Some(sink) = stderr {
            sinks.insert(
                STDERR_FD,
                FdSink {
                    sink,
                    close_on_eof: false,
                },
            );
        }
        Self {
            session,
            sinks,
            expected: &[STDOUT_FD, STDERR_FD],
            eof_seen: HashSet::new(),
            hooks: None,
            complete_on_all_eof: true,
        }
    }

    pub(crate) fn serve(
        session: String,
        stdin: Option<ByteSink>,
        hooks: Arc<dyn ServeHooks>,
    ) -> Self {
        let mut sinks = HashMap::new();
        if let Some(sink) = stdin {
            sinks.insert(
                STDIN_FD,
                FdSink {
                    sink,
                    close_on_eof: true,
                },
            );
        }
        Self {
            session,
            sinks,
            expected: &[STDIN_FD],
            eof_seen: HashSet::new(),
            hooks: Some(hooks),
            complete_on_all_eof: false,
        }
    }

    /// Dispatch loop. Exits normally when the pump channel closes (clean
    /// transport EOF) or the session is complete; exits with an error on a
    /// protocol violation or local write failure. Cancels `done` on the
    /// way out in every case.
    pub(crate) async fn run(
        mut self,
        mut inbound: mpsc::Receiver<Message>,
        done: CancellationToken,
    ) -> Result<()> {
        let result = self.drain(&mut inbound, &done).await;
        if let Err(e) = &result {
            warn!("session {}: dispatcher failed: {}", self.session, e);
        }
        done.cancel();
        result
    }

    async fn drain(
        &mut self,
        inbound: &mut mpsc::Receiver<Message>,
        done: &CancellationToken,
    ) -> Result<()> {
        loop {
            let msg = tokio::select! {
                _ = done.cancelled() => return Ok(()),
                msg = inbound.recv() => match msg {
                    Some(msg) => msg,
                    None => return Ok(()),
                },
            };
            let flow = tokio::select! {
                _ = done.cancelled() => return Ok(()),
                handled = self.handle(msg) => handled?,
            };
            if let Flow::Done = flow {
                debug!("session {}: all inbound streams finished", self.session);
                return Ok(());
            }
        }
    }

    async fn handle(&mut self, msg: Message) -> Result<Flow> {
        match msg {
            Message::Init(_) => Err(Error::UnexpectedMessage(
                "init after session start".to_string(),
            )),
            Message::File(file) => self.handle_file(file).await,
            Message::Resize(resize) => {
                self.handle_resize(resize).await;
                Ok(Flow::Continue)
            }
            Message::Signal(signal) => {
                self.handle_signal(signal).await;
                Ok(Flow::Continue)
            }
        }
    }

    async fn handle_file(&mut self, file: FilePayload) -> Result<Flow> {
        if !self.expected.contains(&file.fd) {
            return Err(Error::UnexpectedFd(file.fd));
        }
        if self.eof_seen.contains(&file.fd) {
            debug!(
                "session {}: discarding chunk after EOF on fd {}",
                self.session, file.fd
            );
            return Ok(Flow::Continue);
        }
        let mut close_sink = false;
        if let Some(entry) = self.sinks.get_mut(&file.fd) {
            if !file.data.is_empty() {
                entry.sink.write_all(&file.data).await?;
                entry.sink.flush().await?;
            }
            if file.eof && entry.close_on_eof {
                entry.sink.shutdown().await?;
                close_sink = true;
            }
        } else if !file.data.is_empty() {
            // Expected descriptor without a local sink: drop the bytes.
            debug!(
                "session {}: no local sink for fd {}, dropping {} bytes",
                self.session,
                file.fd,
                file.data.len()
            );
        }
        if close_sink {
            self.sinks.remove(&file.fd);
        }
        if file.eof {
            self.eof_seen.insert(file.fd);
            if self.complete_on_all_eof
                && self.expected.iter().all(|fd| self.eof_seen.contains(fd))
            {
                return Ok(Flow::Done);
            }
        }
        Ok(Flow::Continue)
    }

    async fn handle_resize(&self, resize: ResizePayload) {
        match &self.hooks {
            Some(hooks) => {
                if let Err(e) = hooks.resize(resize.rows, resize.cols).await {
                    warn!("session {}: resize hook failed: {}", self.session, e);
                }
            }
            None => debug!(
                "session {}: no resize hook, dropping {}x{}",
                self.session, resize.rows, resize.cols
            ),
        }
    }

    async fn handle_signal(&self, signal: SignalPayload) {
        let Some(sig) = signal_for(&signal.name) else {
            debug!(
                "session {}: dropping unknown signal {:?}",
                self.session, signal.name
            );
            return;
        };
        if let Some(hooks) = &self.hooks {
            if let Err(e) = hooks.signal(sig).await {
                warn!("session {}: signal hook failed: {}", self.session, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::InitPayload;
    use async_trait::async_trait;
    use nix::sys::signal::Signal;
    use tokio::io::AsyncReadExt;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingHooks {
        resizes: Mutex<Vec<(u32, u32)>>,
        signals: Mutex<Vec<Signal>>,
        fail_hooks: bool,
    }

    #[async_trait]
    impl ServeHooks for RecordingHooks {
        async fn resize(&self, rows: u32, cols: u32) -> Result<()> {
            self.resizes.lock().await.push((rows, cols));
            if self.fail_hooks {
                return Err(Error::Other("resize hook broke".to_string()));
            }
            Ok(())
        }
        async fn signal(&self, signal: Signal) -> Result<()> {
            self.signals.lock().await.push(signal);
            Ok(())
        }
    }

    fn serve_dispatcher(
        stdin: Option<ByteSink>,
        hooks: Arc<RecordingHooks>,
    ) -> (Dispatcher, mpsc::Sender<Message>, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(16);
        let dispatcher = Dispatcher::serve("test".to_string(), stdin, hooks);
        (dispatcher, tx, rx)
    }

    #[tokio::test]
    async fn test_writes_stdin_and_closes_on_eof() {
        let (sink, mut check) = tokio::io::duplex(256);
        let hooks = Arc::new(RecordingHooks::default());
        let (dispatcher, tx, rx) = serve_dispatcher(Some(Box::new(sink)), hooks);
        let done = CancellationToken::new();
        let task = tokio::spawn(dispatcher.run(rx, done));

        tx.send(Message::data(STDIN_FD, b"hello\n".to_vec()))
            .await
            .unwrap();
        tx.send(Message::eof(STDIN_FD)).await.unwrap();
        drop(tx);

        task.await.unwrap().unwrap();

        let mut received = Vec::new();
        check.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"hello\n");
    }

    #[tokio::test]
    async fn test_discards_chunks_after_eof() {
        let (sink, mut check) = tokio::io::duplex(256);
        let hooks = Arc::new(RecordingHooks::default());
        let (dispatcher, tx, rx) = serve_dispatcher(Some(Box::new(sink)), hooks);
        let task = tokio::spawn(dispatcher.run(rx, CancellationToken::new()));

        tx.send(Message::data(STDIN_FD, b"early".to_vec()))
            .await
            .unwrap();
        tx.send(Message::eof(STDIN_FD)).await.unwrap();
        tx.send(Message::data(STDIN_FD, b"late".to_vec()))
            .await
            .unwrap();
        drop(tx);

        task.await.unwrap().unwrap();

        let mut received = Vec::new();
        check.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"early");
    }

    #[tokio::test]
    async fn test_unexpected_fd_fails_session() {
        let hooks = Arc::new(RecordingHooks::default());
        let (dispatcher, tx, rx) = serve_dispatcher(None, hooks);
        let task = tokio::spawn(dispatcher.run(rx, CancellationToken::new()));

        tx.send(Message::data(STDERR_FD, b"x".to_vec()))
            .await
            .unwrap();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(Error::UnexpectedFd(2))));
    }

    #[tokio::test]
    async fn test_missing_sink_discards_silently() {
        let hooks = Arc::new(RecordingHooks::default());
        let (dispatcher, tx, rx) = serve_dispatcher(None, hooks);
        let task = tokio::spawn(dispatcher.run(rx, CancellationToken::new()));

        tx.send(Message::data(STDIN_FD, b"dropped".to_vec()))
            .await
            .unwrap();
        drop(tx);

        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_init_fails_session() {
        let hooks = Arc::new(RecordingHooks::default());
        let (dispatcher, tx, rx) = serve_dispatcher(None, hooks);
        let task = tokio::spawn(dispatcher.run(rx, CancellationToken::new()));

        tx.send(Message::Init(InitPayload {
            session_id: "again".to_string(),
        }))
        .await
        .unwrap();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(Error::UnexpectedMessage(_))));
    }

    #[tokio::test]
    async fn test_resize_and_signal_reach_hooks() {
        let hooks = Arc::new(RecordingHooks::default());
        let (dispatcher, tx, rx) = serve_dispatcher(None, hooks.clone());
        let task = tokio::spawn(dispatcher.run(rx, CancellationToken::new()));

        tx.send(Message::resize(80, 24)).await.unwrap();
        tx.send(Message::signal("SIGINT")).await.unwrap();
        tx.send(Message::signal("SIGNOPE")).await.unwrap();
        drop(tx);

        task.await.unwrap().unwrap();
        assert_eq!(*hooks.resizes.lock().await, vec![(80, 24)]);
        assert_eq!(*hooks.signals.lock().await, vec![Signal::SIGINT]);
    }

    #[tokio::test]
    async fn test_hook_failure_is_not_fatal() {
        let hooks = Arc::new(RecordingHooks {
            fail_hooks: true,
            ..Default::default()
        });
        let (dispatcher, tx, rx) = serve_dispatcher(None, hooks.clone());
        let task = tokio::spawn(dispatcher.run(rx, CancellationToken::new()));

        tx.send(Message::resize(10, 10)).await.unwrap();
        tx.send(Message::resize(20, 20)).await.unwrap();
        drop(tx);

        task.await.unwrap().unwrap();
        assert_eq!(*hooks.resizes.lock().await, vec![(10, 10), (20, 20)]);
    }

    #[tokio::test]
    async fn test_attach_completes_after_both_eofs() {
        let dispatcher = Dispatcher::attach("test".to_string(), None, None);
        let (tx, rx) = mpsc::channel(16);
        let done = CancellationToken::new();
        let task = tokio::spawn(dispatcher.run(rx, done.clone()));

        tx.send(Message::eof(STDOUT_FD)).await.unwrap();
        assert!(!done.is_cancelled());
        tx.send(Message::eof(STDERR_FD)).await.unwrap();

        // Dispatcher exits on its own and trips the done signal; the
        // sender stays open to prove completion was EOF-driven.
        task.await.unwrap().unwrap();
        assert!(done.is_cancelled());
        drop(tx);
    }
}

//! Outbound file-descriptor copiers
//!
//! Each outbound descriptor is copied by a pair of tasks. The source pump
//! reads the local source into bounded chunks and hands them over a
//! capacity-1 channel; the copier turns chunks into `File` messages and
//! terminates the stream with exactly one EOF marker. The split exists so
//! teardown never waits on a read: the copier exits as soon as the session
//! unwinds.
//!
//! The source pump has two modes. A source the endpoint owns (a process
//! pipe, a socket half) gets a shutdown token: on teardown the pump
//! abandons the in-flight read, drops the source and thereby closes it. A
//! host-owned source (a terminal stdin shared with the host) gets no
//! token; its pump is detached and may stay parked on the read until the
//! host closes the handle. Only that one task outlives the session.

use std::io;

use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::message::{Message, MAX_CHUNK};
use crate::{ByteSource, Error, Result};

/// Spawn the source pump for one descriptor.
///
/// Reads chunks of at most [`MAX_CHUNK`] bytes until EOF or error. The
/// returned receiver yields the chunk stream; it closes after EOF, the
/// first error, or shutdown. With `shutdown` set the pump closes the
/// source when the token fires; without it the pump is left to the host
/// and dropping the receiver is how the session abandons it.
pub(crate) fn spawn_source_pump(
    fd: u32,
    mut source: ByteSource,
    shutdown: Option<CancellationToken>,
) -> mpsc::Receiver<io::Result<Bytes>> {
    let (tx, rx) = mpsc::channel::<io::Result<Bytes>>(1);
    tokio::spawn(async move {
        let mut buf = vec![0u8; MAX_CHUNK];
        loop {
            let read = match &shutdown {
                Some(token) => tokio::select! {
                    _ = token.cancelled() => {
                        trace!(fd, "session done, closing source");
                        break;
                    }
                    read = source.read(&mut buf) => read,
                },
                None => source.read(&mut buf).await,
            };
            match read {
                Ok(0) => {
                    trace!(fd, "source EOF");
                    break;
                }
                Ok(n) => {
                    if tx.send(Ok(Bytes::copy_from_slice(&buf[..n]))).await.is_err() {
                        debug!(fd, "chunk receiver dropped, abandoning source");
                        break;
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    break;
                }
            }
        }
        // Dropping `source` here is what closes an endpoint-owned handle.
    });
    rx
}

/// Copier loop for one outbound descriptor.
///
/// Forwards chunks as `File{fd, data}` messages and emits exactly one
/// `File{fd, eof}` when the source ends. A non-EOF read error or a failure
/// to enqueue outbound is fatal to the session.
pub(crate) async fn copy_to_transport(
    fd: u32,
    mut chunks: mpsc::Receiver<io::Result<Bytes>>,
    outbound: mpsc::Sender<Message>,
    done: CancellationToken,
) -> Result<()> {
    loop {
        let chunk = tokio::select! {
            _ = done.cancelled() => return Ok(()),
            chunk = chunks.recv() => chunk,
        };
        let msg = match chunk {
            Some(Ok(data)) => {
                if data.is_empty() {
                    continue;
                }
                Message::data(fd, data.to_vec())
            }
            Some(Err(e)) => {
                debug!(fd, "source read failed: {}", e);
                return Err(Error::Io(e));
            }
            None => {
                // Source EOF: terminate the stream and exit.
                let eof = Message::eof(fd);
                tokio::select! {
                    _ = done.cancelled() => return Ok(()),
                    sent = outbound.send(eof) => {
                        sent.map_err(|_| outbound_closed(fd))?;
                    }
                }
                return Ok(());
            }
        };
        tokio::select! {
            _ = done.cancelled() => return Ok(()),
            sent = outbound.send(msg) => {
                sent.map_err(|_| outbound_closed(fd))?;
            }
        }
    }
}

fn outbound_closed(fd: u32) -> Error {
    Error::Transport(format!("outbound writer closed while copying fd {fd}"))
}

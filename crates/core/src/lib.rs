//! iolink core - bidirectional multiplexed stdio tunneling
//!
//! This crate attaches a local interactive terminal to a remote process
//! (or the reverse) over a single message-oriented, ordered, reliable
//! transport. Both directions of stdin/stdout/stderr, terminal resize
//! events and named POSIX signals are multiplexed onto one framed stream.
//!
//! # Architecture
//!
//! The core is transport-agnostic: it speaks to the wire only through the
//! [`transport::MessageTransport`] trait. Concrete transports (see the
//! `iolink-framed` crate) are separate crates that implement the trait and
//! own their wire encoding.
//!
//! A session is a pair of endpoints sharing one message schema:
//!
//! * [`attach`]: client-like; owns the terminal-facing stdin/stdout/stderr,
//!   opens the session with `Init`, forwards resize and signal events.
//! * [`serve`]: server-like; owns the hosted process's pipes, requires
//!   `Init` first, dispatches control events to [`ServeHooks`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use iolink_core::{attach, AttachIo, AttachOptions, CancellationToken};
//! use iolink_core::transport::pair;
//!
//! # async fn run() -> iolink_core::Result<()> {
//! let (near, _far) = pair();
//! let io = AttachIo {
//!     stdin: Some(Box::new(tokio::io::stdin())),
//!     stdout: Some(Box::new(tokio::io::stdout())),
//!     stderr: Some(Box::new(tokio::io::stderr())),
//!     // The process terminal stays with the host; don't close it.
//!     host_owned_stdin: true,
//! };
//! attach(Arc::new(near), io, AttachOptions::default(), CancellationToken::new()).await
//! # }
//! ```

#![warn(clippy::all)]

pub mod attach;
pub mod message;
pub mod serve;
pub mod signal;
pub mod transport;

mod copier;
mod dispatch;
mod error;
mod events;
mod lifecycle;
mod pump;

pub use attach::{attach, AttachIo, AttachOptions};
pub use error::{Error, Result};
pub use message::{FilePayload, InitPayload, Message, ResizePayload, SignalPayload, MAX_CHUNK};
pub use serve::{serve, NoHooks, ServeHooks, ServeIo};
pub use transport::{MessageTransport, Traced};

// Sessions are cancelled through the caller's token; re-exported so users
// don't need a direct tokio-util dependency.
pub use tokio_util::sync::CancellationToken;

/// Boxed byte source for a local stdin/stdout/stderr read side
pub type ByteSource = Box<dyn tokio::io::AsyncRead + Send + Unpin>;

/// Boxed byte sink for a local stdin/stdout/stderr write side
pub type ByteSink = Box<dyn tokio::io::AsyncWrite + Send + Sync + Unpin>;

/// Initialize logging for binaries and tests.
///
/// Respects `RUST_LOG`; defaults to `info`.
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init()
        .map_err(|e| Error::Other(format!("logging already initialized: {e}")))
}

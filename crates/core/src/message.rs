//! Tunnel message schema
//!
//! One tagged enum covers everything that crosses the wire: session
//! initialization, file-descriptor chunks with an EOF marker, terminal
//! resize events, and symbolic POSIX signals. Transports pick their own
//! framing; the schema only requires that message boundaries and FIFO
//! order are preserved.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Upper bound on the payload of a single `File` message.
///
/// Keeps one large burst from hogging the transport and makes per-message
/// memory usage predictable.
pub const MAX_CHUNK: usize = 32 * 1024;

/// Descriptor index for stdin
pub const STDIN_FD: u32 = 0;
/// Descriptor index for stdout
pub const STDOUT_FD: u32 = 1;
/// Descriptor index for stderr
pub const STDERR_FD: u32 = 2;

/// Session identity, sent attach → serve before anything else
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitPayload {
    /// Opaque session identifier; must be non-empty
    pub session_id: String,
}

/// A chunk of bytes on one file descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePayload {
    /// Descriptor index (0 = stdin, 1 = stdout, 2 = stderr)
    pub fd: u32,
    /// Chunk contents; may be empty on the EOF marker
    #[serde(default)]
    pub data: Vec<u8>,
    /// End-of-stream marker; no further `File` for `fd` follows from this sender
    #[serde(default)]
    pub eof: bool,
}

/// Terminal window size change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizePayload {
    pub rows: u32,
    pub cols: u32,
}

/// Symbolic POSIX signal (e.g. `SIGINT`); unknown names are dropped by receivers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalPayload {
    pub name: String,
}

/// The tunnel wire message.
///
/// Modeled as a tagged variant so the dispatcher's exhaustiveness check is
/// a compile-time property; exactly one payload is present by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Session initialization (first attach → serve message)
    Init(InitPayload),
    /// File-descriptor data or EOF marker
    File(FilePayload),
    /// Terminal resize event
    Resize(ResizePayload),
    /// Named POSIX signal
    Signal(SignalPayload),
}

impl Message {
    /// Build an `Init` message
    pub fn init(session_id: impl Into<String>) -> Self {
        Message::Init(InitPayload {
            session_id: session_id.into(),
        })
    }

    /// Build a data chunk for `fd`
    pub fn data(fd: u32, data: Vec<u8>) -> Self {
        Message::File(FilePayload {
            fd,
            data,
            eof: false,
        })
    }

    /// Build the end-of-stream marker for `fd`
    pub fn eof(fd: u32) -> Self {
        Message::File(FilePayload {
            fd,
            data: Vec::new(),
            eof: true,
        })
    }

    /// Build a resize event
    pub fn resize(rows: u32, cols: u32) -> Self {
        Message::Resize(ResizePayload { rows, cols })
    }

    /// Build a named signal event
    pub fn signal(name: impl Into<String>) -> Self {
        Message::Signal(SignalPayload { name: name.into() })
    }

    /// Short name of the payload kind, for logs and protocol errors
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Init(_) => "init",
            Message::File(_) => "file",
            Message::Resize(_) => "resize",
            Message::Signal(_) => "signal",
        }
    }

    /// One-line human summary; never dumps chunk contents
    pub fn summary(&self) -> String {
        match self {
            Message::Init(init) => format!("init(session={})", init.session_id),
            Message::File(file) if file.eof => format!("file(fd={}, eof)", file.fd),
            Message::File(file) => format!("file(fd={}, {} bytes)", file.fd, file.data.len()),
            Message::Resize(resize) => format!("resize({}x{})", resize.rows, resize.cols),
            Message::Signal(signal) => format!("signal({})", signal.name),
        }
    }

    /// Validate payload-level invariants.
    ///
    /// Rejects an `Init` with an empty session id and a `File` on a
    /// descriptor outside stdin/stdout/stderr. Direction-specific fd rules
    /// are enforced by the dispatcher, which knows which side it is on.
    pub fn validate(&self) -> Result<()> {
        match self {
            Message::Init(init) if init.session_id.is_empty() => Err(Error::MissingSessionId),
            Message::File(file) if file.fd > STDERR_FD => Err(Error::UnexpectedFd(file.fd)),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        assert_eq!(
            Message::init("s1"),
            Message::Init(InitPayload {
                session_id: "s1".to_string()
            })
        );
        assert_eq!(
            Message::data(STDOUT_FD, b"abc".to_vec()),
            Message::File(FilePayload {
                fd: 1,
                data: b"abc".to_vec(),
                eof: false
            })
        );
        assert_eq!(
            Message::eof(STDIN_FD),
            Message::File(FilePayload {
                fd: 0,
                data: Vec::new(),
                eof: true
            })
        );
    }

    #[test]
    fn test_validate_accepts_well_formed_messages() {
        assert!(Message::init("s1").validate().is_ok());
        assert!(Message::data(STDIN_FD, vec![1, 2, 3]).validate().is_ok());
        assert!(Message::eof(STDERR_FD).validate().is_ok());
        assert!(Message::resize(80, 24).validate().is_ok());
        assert!(Message::signal("SIGINT").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_session_id() {
        let err = Message::init("").validate().unwrap_err();
        assert!(matches!(err, Error::MissingSessionId));
        assert!(err.is_protocol_violation());
    }

    #[test]
    fn test_validate_rejects_out_of_range_fd() {
        let err = Message::data(3, b"x".to_vec()).validate().unwrap_err();
        assert!(matches!(err, Error::UnexpectedFd(3)));
    }

    #[test]
    fn test_summary_does_not_dump_data() {
        let msg = Message::data(STDOUT_FD, vec![b'x'; 4096]);
        assert_eq!(msg.summary(), "file(fd=1, 4096 bytes)");
        assert_eq!(Message::eof(STDIN_FD).summary(), "file(fd=0, eof)");
        assert_eq!(Message::resize(80, 24).summary(), "resize(80x24)");
    }
}

//! Error types for the iolink tunnel core

use thiserror::Error;

/// Result type alias for tunnel operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while running a tunnel session
#[derive(Debug, Error)]
pub enum Error {
    /// Transport send/recv failed (a clean close is not an error)
    #[error("Transport error: {0}")]
    Transport(String),

    /// The peer sent a message the protocol does not allow at this point
    #[error("Unexpected message: {0}")]
    UnexpectedMessage(String),

    /// The peer sent a `File` chunk on a descriptor this endpoint never accepts
    #[error("Unexpected file descriptor {0}")]
    UnexpectedFd(u32),

    /// The init message carried an empty session id
    #[error("Init message is missing a session id")]
    MissingSessionId,

    /// The serve-side initializer hook failed
    #[error("Session initializer failed: {0}")]
    Initialize(String),

    /// A read from a local source or a write to a local sink failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The caller cancelled the session
    #[error("Session cancelled")]
    Cancelled,

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for the protocol-violation family (bad init, bad fd, bad payload)
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Error::UnexpectedMessage(_) | Error::UnexpectedFd(_) | Error::MissingSessionId
        )
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}

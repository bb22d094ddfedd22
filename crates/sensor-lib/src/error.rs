//! Error types for the telemetry core
//!
//! Link, framing, configuration and poller failures are kept as separate enums so the
//! poller can decide per class whether to retry, discard or abort.

use std::io;

use crate::models::Channel;

/// Errors raised by a serial link or its transport
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("device not found: {0}")]
    NotFound(String),

    #[error("permission denied opening {0}")]
    PermissionDenied(String),

    #[error("read timed out")]
    Timeout,

    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("I/O error ({kind:?}): {message}")]
    Io { kind: io::ErrorKind, message: String },

    #[error("link is not connected")]
    NotConnected,

    #[error("invalid link configuration: {0}")]
    InvalidConfig(String),
}

impl LinkError {
    /// Temporary conditions that do not mean the connection is gone
    pub fn is_transient(&self) -> bool {
        match self {
            LinkError::Timeout => true,
            LinkError::Io { kind, .. } => matches!(
                kind,
                io::ErrorKind::TimedOut | io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }

    /// Whether a reconnect cycle can fix this error
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, LinkError::InvalidConfig(_))
    }
}

impl From<io::Error> for LinkError {
    fn from(err: io::Error) -> Self {
        classify_io_error(&err)
    }
}

/// Map an OS-level I/O error onto the link taxonomy
pub fn classify_io_error(err: &io::Error) -> LinkError {
    match err.kind() {
        io::ErrorKind::NotFound => LinkError::NotFound(err.to_string()),
        io::ErrorKind::PermissionDenied => LinkError::PermissionDenied(err.to_string()),
        io::ErrorKind::TimedOut => LinkError::Timeout,
        io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected => LinkError::ConnectionLost(err.to_string()),
        kind => LinkError::Io {
            kind,
            message: err.to_string(),
        },
    }
}

/// Map a serial backend error onto the link taxonomy
pub fn classify_serial_error(err: &tokio_serial::Error) -> LinkError {
    match err.kind() {
        tokio_serial::ErrorKind::NoDevice => LinkError::NotFound(err.description.clone()),
        tokio_serial::ErrorKind::InvalidInput => LinkError::InvalidConfig(err.description.clone()),
        tokio_serial::ErrorKind::Io(kind) => {
            classify_io_error(&io::Error::new(kind, err.description.clone()))
        }
        tokio_serial::ErrorKind::Unknown => LinkError::Io {
            kind: io::ErrorKind::Other,
            message: err.description.clone(),
        },
    }
}

/// A line that could not be turned into a raw record
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("malformed frame ({reason}): {preview}")]
    Malformed { reason: String, preview: String },

    #[error("frame is valid JSON but not an object: {preview}")]
    NotAnObject { preview: String },

    #[error("frame of {len} bytes exceeds the {limit} byte limit")]
    Oversized { len: usize, limit: usize },
}

/// Configuration rejected before any loop starts
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("port must not be empty")]
    EmptyPort,

    #[error("unsupported baud rate {0}")]
    UnsupportedBaud(u32),

    #[error("window size {0} is too small, need at least 3 samples")]
    InvalidWindow(usize),

    #[error("invalid band for {channel}: {reason}")]
    InvalidBand { channel: Channel, reason: String },
}

/// Errors from interacting with a running poller
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PollerError {
    #[error("poller has stopped")]
    Stopped,

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error("poller task failed: {0}")]
    Join(String),
}

//! Error types for the core library.
//!
//! | Error | Raised by | Reaches the caller as |
//! |-------|-----------|-----------------------|
//! | [`NameError`] | Manager | rejected future |
//! | [`BusError::InterfaceNotFound`] / [`BusError::MemberNotFound`] | serving node | response `err` field |
//! | [`PathError`] | routing | logged, or rejected at the origin |
//! | [`TransportError`] | connections | status event / reconnect |

use thiserror::Error;

/// Result type alias for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Name-table (topology) errors raised by the Manager.
///
/// The display form always starts with the taxonomy tag (`duplicate node`,
/// `missing name`, ...) so that a message that crossed the wire can be
/// turned back into the typed error with [`NameError::from_remote`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("duplicate node: {0}")]
    DuplicateNode(String),

    #[error("missing node: {0}")]
    MissingNode(String),

    #[error("duplicate name: {0}")]
    DuplicateName(String),

    #[error("missing name: {0}")]
    MissingName(String),

    /// The authoritative manager could not be reached.
    #[error("manager unavailable: {0}")]
    Unavailable(String),
}

impl NameError {
    /// Parse an error string produced by a remote manager.
    ///
    /// Returns `None` when the message is not one of the name-table errors.
    pub fn from_remote(message: &str) -> Option<Self> {
        let (tag, key) = message.split_once(": ").unwrap_or((message, ""));
        let key = key.to_string();
        match tag {
            "duplicate node" => Some(NameError::DuplicateNode(key)),
            "missing node" => Some(NameError::MissingNode(key)),
            "duplicate name" => Some(NameError::DuplicateName(key)),
            "missing name" => Some(NameError::MissingName(key)),
            _ => None,
        }
    }
}

/// Malformed paths and call addresses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("malformed path: {0:?}")]
    Malformed(String),

    #[error("invalid address: {0:?}")]
    InvalidAddress(String),
}

/// Wire encoding failures.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame encoding failed: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("frame decoding failed: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Connection-level failures.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("connection refused: {0}")]
    Refused(String),

    #[error("i/o error: {0}")]
    Io(String),

    #[error("connection closed")]
    Closed,

    #[error("handshake failed: {0}")]
    Handshake(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err.to_string())
    }
}

/// Errors surfaced by the bus façade.
#[derive(Debug, Clone, Error)]
pub enum BusError {
    #[error(transparent)]
    Name(#[from] NameError),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("interface not found: {0}")]
    InterfaceNotFound(String),

    #[error("member not found: {0}")]
    MemberNotFound(String),

    /// Error string carried back in a response frame.
    #[error("{0}")]
    Remote(String),

    #[error("no route to {0}")]
    NoRoute(String),

    #[error("request {0} timed out")]
    Timeout(u64),

    #[error("node is shut down")]
    Shutdown,
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

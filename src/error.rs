//! Error types for the peer cache.

use std::io;
use thiserror::Error;

/// Result type alias for peer cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the peer cache.
///
/// Errors are `Clone` because a single coalesced load hands the same outcome
/// to every caller that joined it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The lookup key was empty.
    #[error("key is required")]
    EmptyKey,

    /// The data source has no value for the key.
    #[error("{0} not exist")]
    NotFound(String),

    /// The data source failed for a reason other than a missing key.
    #[error("loader error: {0}")]
    Loader(String),

    /// Peer communication errors.
    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    /// The named group is not registered.
    #[error("no such group: {0}")]
    NoSuchGroup(String),

    /// Configuration errors. These are programmer errors and should abort startup.
    #[error("config error: {0}")]
    Config(String),

    /// The operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error came from talking to a remote peer.
    pub fn is_remote(&self) -> bool {
        matches!(self, Error::Network(_))
    }

    /// Short label used for error metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::EmptyKey => "empty_key",
            Error::NotFound(_) => "not_found",
            Error::Loader(_) => "loader",
            Error::Network(_) => "network",
            Error::NoSuchGroup(_) => "no_such_group",
            Error::Config(_) => "config",
            Error::Timeout => "timeout",
            Error::Internal(_) => "internal",
        }
    }

    /// Status a peer server replies with when a fetch fails with this error.
    pub fn status(&self) -> Status {
        match self {
            Error::EmptyKey => Status::BadRequest,
            Error::NoSuchGroup(_) => Status::NoSuchGroup,
            _ => Status::Internal,
        }
    }
}

/// Reply status carried by a peer's error response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Status {
    /// The request was malformed (missing group or key).
    BadRequest,
    /// The peer has no group with the requested name.
    NoSuchGroup,
    /// The peer's lookup failed.
    Internal,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::BadRequest => f.write_str("bad request"),
            Status::NoSuchGroup => f.write_str("no such group"),
            Status::Internal => f.write_str("internal error"),
        }
    }
}

/// Network communication errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// Connection failed.
    #[error("connection failed to {addr}: {reason}")]
    ConnectionFailed { addr: String, reason: String },

    /// Connection was closed before a reply arrived.
    #[error("connection closed")]
    ConnectionClosed,

    /// The peer answered with a non-success status.
    #[error("server returned: {status}: {message}")]
    Remote { status: Status, message: String },

    /// The peer answered with a message that is not a fetch reply.
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// A frame exceeded the configured maximum size.
    #[error("frame too large: {len} bytes (max {max})")]
    FrameTooLarge { len: usize, max: usize },

    /// I/O error.
    #[error("io error: {0}")]
    Io(String),
}

impl From<io::Error> for NetworkError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            NetworkError::ConnectionClosed
        } else {
            NetworkError::Io(e.to_string())
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Network(e.into())
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Network(NetworkError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(Error::EmptyKey.to_string(), "key is required");
        assert_eq!(Error::NotFound("kkk".into()).to_string(), "kkk not exist");

        let err = Error::from(NetworkError::Remote {
            status: Status::NoSuchGroup,
            message: "scores".into(),
        });
        assert_eq!(
            err.to_string(),
            "network error: server returned: no such group: scores"
        );
        assert!(err.is_remote());
        assert_eq!(err.kind(), "network");
    }

    #[test]
    fn test_reply_status() {
        assert_eq!(Error::EmptyKey.status(), Status::BadRequest);
        assert_eq!(Error::NoSuchGroup("scores".into()).status(), Status::NoSuchGroup);
        assert_eq!(Error::NotFound("Tom".into()).status(), Status::Internal);
        assert_eq!(Error::Internal("load of Tom panicked".into()).status(), Status::Internal);
    }

    #[test]
    fn test_io_error_conversion() {
        let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        assert_eq!(NetworkError::from(eof), NetworkError::ConnectionClosed);

        let refused = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        assert!(matches!(Error::from(refused), Error::Network(NetworkError::Io(_))));
    }
}

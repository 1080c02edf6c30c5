//! Error types for dropbind

use thiserror::Error;

/// Structured error kinds reported by a remote file service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// The requested path does not exist
    PathNotFound,
    /// The upload session id is unknown or already finished
    SessionNotFound,
    /// An append or finish carried the wrong offset
    IncorrectOffset {
        /// Offset the service expected
        correct_offset: u64,
    },
    /// The destination already holds a file and the conflict policy forbids replacing it
    Conflict,
    /// The caller may not access the path
    AccessDenied,
    /// Any other classified failure
    Other,
}

/// A fault reported by the remote file service
///
/// `summary` carries the raw error summary string as the service sent it
/// (for example `path/not_found/`). `kind` is only set when the service
/// exposed a structured code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{summary}")]
pub struct ApiError {
    /// Structured kind, when the service provides one
    pub kind: Option<ApiErrorKind>,
    /// Raw error summary
    pub summary: String,
}

impl ApiError {
    /// Create an error with a structured kind
    pub fn new(kind: ApiErrorKind, summary: impl Into<String>) -> Self {
        Self {
            kind: Some(kind),
            summary: summary.into(),
        }
    }

    /// Create an error carrying only the service's summary string
    pub fn unclassified(summary: impl Into<String>) -> Self {
        Self {
            kind: None,
            summary: summary.into(),
        }
    }

    /// The error a service reports for a missing path
    pub fn path_not_found(path: impl std::fmt::Display) -> Self {
        Self::new(
            ApiErrorKind::PathNotFound,
            format!("path/not_found/ ({})", path),
        )
    }
}

/// Errors produced by bindings, streams and session clients
#[derive(Error, Debug)]
pub enum BindError {
    /// Remote service fault
    #[error("Remote API error: {0}")]
    Api(#[from] ApiError),

    /// Transport fault from the object store backend
    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Path does not match the remote path grammar
    #[error("Invalid remote path: {0}")]
    InvalidPath(String),

    /// Operation not supported by this stream
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Stream was already closed
    #[error("Stream closed: {0}")]
    Closed(String),

    /// Configuration or binding declaration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Async runtime could not be created or entered
    #[error("Runtime error: {0}")]
    Runtime(String),
}

pub type Result<T> = std::result::Result<T, BindError>;

impl From<BindError> for std::io::Error {
    fn from(err: BindError) -> Self {
        match err {
            BindError::Io(io_err) => io_err,
            BindError::UnsupportedOperation(msg) => {
                std::io::Error::new(std::io::ErrorKind::Unsupported, msg)
            }
            BindError::InvalidPath(msg) | BindError::Config(msg) => {
                std::io::Error::new(std::io::ErrorKind::InvalidInput, msg)
            }
            other => std::io::Error::new(std::io::ErrorKind::Other, other),
        }
    }
}

impl From<url::ParseError> for BindError {
    fn from(err: url::ParseError) -> Self {
        BindError::Config(format!("Invalid connection URL: {}", err))
    }
}

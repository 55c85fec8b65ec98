//! Error types for filestream-core
//!
//! This module defines error types using thiserror for ergonomic error handling.
//! Errors are grouped by where they surface: stream session lifecycle, file
//! access, buffers, and downloads.
//!
//! ## Propagation
//!
//! - Errors found while *setting up* a stream or download (bad path, bad URL,
//!   unopenable handle) are returned to the caller as `Err`.
//! - Errors found while a background task is running are never returned to
//!   the original caller. They are delivered once on the matching error event
//!   channel, carrying `to_string()` and `code()`.
//!
//! ## POSIX-style codes
//!
//! Host layers expect errno-like codes next to the message:
//! - `NotFound`, `InvalidStream`, `JobNotFound` → `ENOENT`
//! - `AccessDenied` → `EACCES`
//! - `StreamClosed`, `StreamInactive` → `EPIPE`
//! - `BufferError` → `ENOMEM`
//! - `Timeout` → `ETIMEDOUT`
//! - `Cancelled` → `ECANCELED`

use std::time::Duration;
use thiserror::Error;

/// Result type alias using our StreamError type
pub type Result<T> = std::result::Result<T, StreamError>;

/// Main error type for filestream-core
#[derive(Error, Debug)]
pub enum StreamError {
    // ===== File Errors =====

    /// Target file or directory does not exist
    #[error("ENOENT: File does not exist: {0}")]
    NotFound(String),

    /// Permission refused by the operating system
    #[error("EACCES: Permission denied: {0}")]
    AccessDenied(String),

    /// Generic disk or transport failure, message preserved
    #[error("I/O error: {0}")]
    IoError(String),

    // ===== Stream Lifecycle Errors =====

    /// Stream was closed and no longer accepts operations
    #[error("EPIPE: Stream is closed: {0}")]
    StreamClosed(String),

    /// Stream exists but its background task is no longer running
    #[error("EPIPE: Stream is not active: {0}")]
    StreamInactive(String),

    /// No stream registered under this id
    #[error("ENOENT: No such stream: {0}")]
    InvalidStream(String),

    /// Copying or allocating a buffer for a queued write failed
    #[error("Buffer error: {0}")]
    BufferError(String),

    // ===== Download Errors =====

    /// URL could not be parsed or uses an unsupported scheme
    #[error("Invalid download URL: {0}")]
    InvalidUrl(String),

    /// A download with this job id is already registered
    #[error("Download job already exists: {0}")]
    JobExists(u64),

    /// No download registered under this job id
    #[error("ENOENT: No such download job: {0}")]
    JobNotFound(u64),

    /// Job holds no resume token
    #[error("Download job {0} is not resumable")]
    NotResumable(u64),

    /// Network connectivity or protocol failure
    #[error("Network error: {message}")]
    Network {
        message: String,
        /// Whether this error might be transient
        is_transient: bool,
    },

    /// Connect or read deadline exceeded
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    // ===== General Errors =====

    /// Operation was cancelled by the caller
    #[error("Operation cancelled")]
    Cancelled,

    /// Requested operation does not fit the current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Configuration is invalid or incomplete
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    // ===== External Library Errors =====

    /// HTTP client error from reqwest
    #[error("HTTP client error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),
}

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => StreamError::NotFound(err.to_string()),
            std::io::ErrorKind::PermissionDenied => StreamError::AccessDenied(err.to_string()),
            _ => StreamError::IoError(err.to_string()),
        }
    }
}

impl From<url::ParseError> for StreamError {
    fn from(err: url::ParseError) -> Self {
        StreamError::InvalidUrl(err.to_string())
    }
}

// Helper methods for creating common errors
impl StreamError {
    /// Map an I/O error on `path`, keeping the path in the message for
    /// not-found and permission failures
    pub fn from_io(err: std::io::Error, path: &str) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => StreamError::NotFound(path.to_string()),
            std::io::ErrorKind::PermissionDenied => StreamError::AccessDenied(path.to_string()),
            _ => StreamError::IoError(format!("{}: {}", path, err)),
        }
    }

    /// Create an IoError with a message
    pub fn io<S: Into<String>>(message: S) -> Self {
        StreamError::IoError(message.into())
    }

    /// Create a Network error
    pub fn network<S: Into<String>>(message: S, is_transient: bool) -> Self {
        StreamError::Network {
            message: message.into(),
            is_transient,
        }
    }

    /// POSIX-style code reported alongside the message in error events
    pub fn code(&self) -> &'static str {
        match self {
            StreamError::NotFound(_)
            | StreamError::InvalidStream(_)
            | StreamError::JobNotFound(_) => "ENOENT",
            StreamError::AccessDenied(_) => "EACCES",
            StreamError::StreamClosed(_) | StreamError::StreamInactive(_) => "EPIPE",
            StreamError::BufferError(_) => "ENOMEM",
            StreamError::InvalidUrl(_)
            | StreamError::JobExists(_)
            | StreamError::NotResumable(_)
            | StreamError::InvalidState(_)
            | StreamError::InvalidConfiguration(_) => "EINVAL",
            StreamError::Timeout(_) => "ETIMEDOUT",
            StreamError::Cancelled => "ECANCELED",
            StreamError::IoError(_)
            | StreamError::Network { .. }
            | StreamError::ReqwestError(_)
            | StreamError::SerdeJsonError(_) => "EIO",
        }
    }

    /// Check if error is a transient transport failure
    ///
    /// Returns `true` for failures where a later attempt, or a resume from
    /// the last committed byte, may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            StreamError::Network { is_transient, .. } => *is_transient,
            StreamError::Timeout(_) => true,
            StreamError::ReqwestError(e) => e.is_timeout() || e.is_connect() || e.is_body(),
            _ => false,
        }
    }

    /// Check if error is due to misuse of a stream id
    pub fn is_lifecycle_error(&self) -> bool {
        matches!(
            self,
            StreamError::StreamClosed(_)
                | StreamError::StreamInactive(_)
                | StreamError::InvalidStream(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_mapping() {
        let err: StreamError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, StreamError::NotFound(_)));
        assert_eq!(err.code(), "ENOENT");

        let err = StreamError::from_io(
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope"),
            "/root/secret",
        );
        assert_eq!(err.to_string(), "EACCES: Permission denied: /root/secret");
    }

    #[test]
    fn test_lifecycle_codes() {
        assert_eq!(StreamError::StreamInactive("a".into()).code(), "EPIPE");
        assert_eq!(StreamError::InvalidStream("a".into()).code(), "ENOENT");
        assert!(StreamError::StreamClosed("a".into()).is_lifecycle_error());
        assert!(!StreamError::Cancelled.is_lifecycle_error());
    }

    #[test]
    fn test_retryable() {
        assert!(StreamError::network("reset", true).is_retryable());
        assert!(!StreamError::network("404", false).is_retryable());
        assert!(StreamError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(!StreamError::NotFound("x".into()).is_retryable());
    }
}

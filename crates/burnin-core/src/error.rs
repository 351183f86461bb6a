//! Error types for the burnin pipeline.

use thiserror::Error;

/// Main error type for pipeline operations.
///
/// Configuration and resource errors abort a run before any frame is
/// processed; codec errors abort mid-run with full teardown. Cancellation is
/// reported as its own variant so callers can tell it apart from failure.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Whether this error is the cooperative-cancellation marker.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

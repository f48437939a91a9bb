//! Error types for data source adapters.

use lifeline_core::Category;
use thiserror::Error;

/// Result type alias for source operations.
pub type Result<T> = std::result::Result<T, SourceError>;

/// Failures raised by platforms and adapters.
///
/// Per-category read failures are caught inside the adapters and never
/// reach callers; the variants that do escape abort the whole read.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SourceError {
    /// The platform cannot be queried on this device.
    #[error("source unavailable: {reason}")]
    Unavailable {
        /// Why the platform is unavailable
        reason: String,
    },

    /// The user has not granted access.
    #[error("{message}")]
    Unauthorized {
        /// User-facing explanation
        message: String,
    },

    /// Reading one category failed.
    #[error("failed to read {category}: {message}")]
    Read {
        /// Category being read
        category: Category,
        /// Underlying error
        message: String,
    },

    /// A record could not be converted into the payload representation.
    #[error("malformed record: {message}")]
    MalformedRecord {
        /// What is wrong with the record
        message: String,
    },

    /// Reading a backing file failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// A backing file could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),
}

impl SourceError {
    /// Creates an unavailable error.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable { reason: reason.into() }
    }

    /// Creates an unauthorized error.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized { message: message.into() }
    }

    /// Creates a per-category read error.
    pub fn read(category: Category, message: impl Into<String>) -> Self {
        Self::Read { category, message: message.into() }
    }

    /// Creates a malformed record error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedRecord { message: message.into() }
    }
}

impl From<std::io::Error> for SourceError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

//! Error types for webhook delivery.
//!
//! Every failure carries the text that ends up in the attempt log, so the
//! `Display` output of each variant is what users see in the log viewer and
//! CSV export.

use std::fmt;

use thiserror::Error;

/// Result type alias for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Why a payload could not be posted to a target.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The target list was empty; nothing was attempted.
    #[error("No webhook URLs configured")]
    NoTargets,

    /// The endpoint answered, but not with 2xx.
    #[error("HTTP {status_code}: {reason}")]
    HttpStatus {
        /// Status the endpoint returned
        status_code: u16,
        /// Canonical reason phrase, empty for unknown codes
        reason: String,
    },

    /// The endpoint could not be reached.
    #[error("network connection failed: {message}")]
    Network {
        /// Transport error text
        message: String,
    },

    /// The endpoint did not answer in time.
    #[error("request timeout after {timeout_seconds}s")]
    Timeout {
        /// Configured request timeout
        timeout_seconds: u64,
    },

    /// The request could not be built, e.g. an invalid URL or header.
    #[error("invalid webhook configuration: {message}")]
    Configuration {
        /// What was wrong with the target
        message: String,
    },
}

impl DeliveryError {
    /// Non-2xx response from a target.
    pub fn http_status(status_code: u16, reason: impl Into<String>) -> Self {
        Self::HttpStatus { status_code, reason: reason.into() }
    }

    /// Transport failure.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into() }
    }

    /// Request ran past `timeout_seconds`.
    pub fn timeout(timeout_seconds: u64) -> Self {
        Self::Timeout { timeout_seconds }
    }

    /// Target that cannot be turned into a request.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Whether another attempt against the same target may succeed.
    ///
    /// Every HTTP status and transport failure is retried, client errors
    /// included. Requests that cannot be built are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::HttpStatus { .. } | Self::Network { .. } | Self::Timeout { .. } => true,
            Self::NoTargets | Self::Configuration { .. } => false,
        }
    }

    /// HTTP status observed, if the endpoint answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }
}

/// Coarse failure class attached to delivery log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Unreachable or slow endpoint.
    Network,
    /// 4xx response.
    Client,
    /// Any other non-2xx response.
    Server,
    /// Missing targets or an unbuildable request.
    Configuration,
}

impl ErrorCategory {
    /// Lower-case label used as a log field.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Client => "client",
            Self::Server => "server",
            Self::Configuration => "configuration",
        }
    }
}

impl From<&DeliveryError> for ErrorCategory {
    fn from(error: &DeliveryError) -> Self {
        match error {
            DeliveryError::Network { .. } | DeliveryError::Timeout { .. } => Self::Network,
            DeliveryError::HttpStatus { status_code: 400..=499, .. } => Self::Client,
            DeliveryError::HttpStatus { .. } => Self::Server,
            DeliveryError::NoTargets | DeliveryError::Configuration { .. } => Self::Configuration,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

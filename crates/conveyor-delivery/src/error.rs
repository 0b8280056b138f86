//! Error types for webhook delivery operations.
//!
//! A 4xx response is deliberately absent from this taxonomy: the receiver
//! contract treats any status below 500 as terminal success ("delivered,
//! rejected"), so only server errors and transport failures are errors here.

use thiserror::Error;

/// Result type alias for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Failures a single delivery attempt can produce.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// Network-level connectivity failure (connection refused, DNS, TLS).
    #[error("network error: {message}")]
    Network {
        /// Description of the transport failure.
        message: String,
    },

    /// HTTP request timeout exceeded.
    #[error("request timeout after {timeout_seconds}s")]
    Timeout {
        /// Configured timeout that was exceeded.
        timeout_seconds: u64,
    },

    /// Receiver answered with a 5xx status.
    #[error("server error: HTTP {status_code}")]
    Server {
        /// The 5xx status code.
        status_code: u16,
    },

    /// Destination URL rejected by the SSRF guard.
    #[error("callback URL blocked: {url}")]
    BlockedUrl {
        /// The rejected URL.
        url: String,
    },

    /// Persisting an attempt or callback outcome failed.
    #[error("storage error during delivery: {0}")]
    Storage(#[from] conveyor_core::CoreError),
}

impl DeliveryError {
    /// Creates a network error from a message.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(timeout_seconds: u64) -> Self {
        Self::Timeout { timeout_seconds }
    }

    /// Creates a server error from a 5xx response.
    pub fn server(status_code: u16) -> Self {
        Self::Server { status_code }
    }

    /// Whether another attempt may succeed.
    ///
    /// Transport failures and 5xx responses are retryable; a blocked URL or
    /// storage fault is not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Timeout { .. } | Self::Server { .. })
    }

    /// HTTP status code carried by this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Server { status_code } => Some(*status_code),
            _ => None,
        }
    }
}

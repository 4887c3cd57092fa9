//! Transport-level errors for a single attempt.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Variant;

/// Why one network attempt against one variant failed.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum NetworkError {
    /// The call exceeded the configured timeout
    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// TCP/TLS connection or proxy handshake failed
    #[error("Connection failed: {message}")]
    Connect { message: String },

    /// Upstream answered with a non-success status
    #[error("Upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Any other transport failure (body read, redirect loop, ...)
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// The reply arrived but carried no usable text payload
    #[error("Invalid upstream reply: {message}")]
    InvalidReply { message: String },

    /// The client handle for this variant could not be built
    #[error("Client for {variant} variant unavailable: {message}")]
    ClientUnavailable { variant: Variant, message: String },
}

impl NetworkError {
    /// Whether retrying the same variant could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Connect { .. } | Self::Transport { .. } => true,
            Self::Status { status, .. } => {
                *status == 408 || *status == 429 || (500..=599).contains(status)
            },
            Self::InvalidReply { .. } | Self::ClientUnavailable { .. } => false,
        }
    }

    /// HTTP status reported by upstream, if the failure carried one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(NetworkError::Timeout { timeout_ms: 10 }.is_retryable());
        assert!(NetworkError::Connect { message: "refused".to_string() }.is_retryable());
        assert!(NetworkError::Status { status: 503, body: String::new() }.is_retryable());
        assert!(NetworkError::Status { status: 429, body: String::new() }.is_retryable());

        assert!(!NetworkError::Status { status: 400, body: String::new() }.is_retryable());
        assert!(!NetworkError::Status { status: 401, body: String::new() }.is_retryable());
        assert!(!NetworkError::InvalidReply { message: "no choices".to_string() }.is_retryable());
    }

    #[test]
    fn test_client_unavailable_display() {
        let err = NetworkError::ClientUnavailable {
            variant: Variant::Proxied,
            message: "bad proxy".to_string(),
        };
        assert_eq!(err.to_string(), "Client for proxied variant unavailable: bad proxy");
        assert_eq!(err.status(), None);
    }
}

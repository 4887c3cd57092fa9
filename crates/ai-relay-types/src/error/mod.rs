//! Typed error definitions for the AI relay.
//!
//! Errors are split by the stage that produces them:
//!
//! - **`ConfigError`** - malformed or missing configuration, never retried
//! - **`NetworkError`** - one attempt against one variant failed
//! - **`DecodeError`** - the provider answered but the payload did not match the schema
//!
//! `InvokeError` is the only type a caller of the relay ever sees. Individual
//! attempt failures stay inside `InvocationFailed` and the telemetry stream.

mod config;
mod decode;
mod network;

pub use config::ConfigError;
pub use decode::DecodeError;
pub use network::NetworkError;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::AttemptRecord;

/// Final outcome of a relay call that did not produce a value.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum InvokeError {
    /// Configuration could not be resolved or failed validation
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Every configured variant failed
    #[error("Invocation failed after {} attempt(s): {last_error}", .attempts.len())]
    InvocationFailed { attempts: Vec<AttemptRecord>, last_error: NetworkError },

    /// The provider reply did not decode against the requested schema
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Rejected by the admission gate before any network work
    #[error("Rate limit exceeded for {key}, retry after {retry_after_ms}ms")]
    RateLimitExceeded { key: String, retry_after_ms: u64 },

    /// Rejected because the circuit for this key is open
    #[error("Circuit breaker open for {key}, retry after {retry_after_ms}ms")]
    BreakerOpen { key: String, retry_after_ms: u64 },

    /// The route label is not in the configured set
    #[error("Unknown label '{label}'")]
    UnknownLabel { label: String },
}

impl InvokeError {
    /// Whether this error means the network path itself is failing.
    ///
    /// Only these outcomes count against a circuit breaker.
    pub fn is_path_failure(&self) -> bool {
        matches!(self, Self::InvocationFailed { .. })
    }

    /// Whether the call was refused before reaching the invocation engine.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::RateLimitExceeded { .. } | Self::BreakerOpen { .. })
    }

    /// Suggested delay before the caller tries again, if any.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimitExceeded { retry_after_ms, .. }
            | Self::BreakerOpen { retry_after_ms, .. } => Some(*retry_after_ms),
            _ => None,
        }
    }

    /// Get HTTP status code for this error.
    pub fn http_status_code(&self) -> u16 {
        match self {
            Self::Config(_) => 500,
            Self::InvocationFailed { last_error, .. } => match last_error {
                NetworkError::Timeout { .. } => 504,
                _ => 502,
            },
            Self::Decode(_) => 502,
            Self::RateLimitExceeded { .. } => 429,
            Self::BreakerOpen { .. } => 503,
            Self::UnknownLabel { .. } => 400,
        }
    }
}

/// Standard Result type using InvokeError.
pub type Result<T> = std::result::Result<T, InvokeError>;

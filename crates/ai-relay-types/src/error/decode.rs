//! Structured response decoding errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest raw fragment kept for diagnostics.
pub const MAX_RAW_FRAGMENT_CHARS: usize = 200;

/// The provider reply did not match the requested schema.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[error("Failed to decode {schema_name} response: {reason} (raw: {raw_fragment:?})")]
pub struct DecodeError {
    /// Schema the reply was decoded against
    pub schema_name: String,
    /// Leading part of the raw reply
    pub raw_fragment: String,
    /// What went wrong
    pub reason: String,
}

impl DecodeError {
    pub fn new(schema_name: &str, raw: &str, reason: impl Into<String>) -> Self {
        Self {
            schema_name: schema_name.to_string(),
            raw_fragment: truncate_fragment(raw),
            reason: reason.into(),
        }
    }
}

fn truncate_fragment(raw: &str) -> String {
    match raw.char_indices().nth(MAX_RAW_FRAGMENT_CHARS) {
        Some((idx, _)) => format!("{}…", &raw[..idx]),
        None => raw.to_string(),
    }
}

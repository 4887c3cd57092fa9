//! Configuration-related errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while resolving or validating a configuration snapshot.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum ConfigError {
    /// A required value was not supplied at all
    #[error("Missing required configuration: {field}")]
    Missing {
        /// Name of the missing field or environment variable
        field: String,
    },

    /// A value was supplied but could not be parsed
    #[error("Config parse error for {field}: {message}")]
    ParseError {
        /// Name of the field that failed to parse
        field: String,
        /// Description of the parse failure
        message: String,
    },

    /// Config validation error (invalid values)
    #[error("Config validation error for {field}: {message}")]
    ValidationError {
        /// Name of the field that failed validation
        field: String,
        /// Description of the validation failure
        message: String,
    },
}

impl ConfigError {
    /// Collapse validator output into the first failing field.
    pub fn from_validation(errors: &validator::ValidationErrors) -> Self {
        let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
        fields.sort_by(|a, b| a.0.cmp(&b.0));

        match fields.first() {
            Some((field, errs)) => {
                let message = errs
                    .first()
                    .map(|e| {
                        e.message.as_ref().map_or_else(|| e.code.to_string(), ToString::to_string)
                    })
                    .unwrap_or_else(|| "invalid value".to_string());
                Self::ValidationError { field: (*field).to_string(), message }
            },
            None => Self::ValidationError {
                field: "config".to_string(),
                message: errors.to_string(),
            },
        }
    }

    pub fn parse(field: &str, message: impl Into<String>) -> Self {
        Self::ParseError { field: field.to_string(), message: message.into() }
    }

    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::ValidationError { field: field.to_string(), message: message.into() }
    }
}

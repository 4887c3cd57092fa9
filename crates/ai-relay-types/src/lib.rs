//! # AI Relay Types
//!
//! Core types, models, and error definitions for the AI relay.
//!
//! - **`error`** - Typed error hierarchy for configuration, transport, decoding and admission
//! - **`models`** - Configuration snapshot, invocation requests, attempts and telemetry
//! - **`protocol`** - OpenAI-compatible chat completion wire types
//!
//! ## Architecture Role
//!
//! `ai-relay-types` sits at the bottom of the dependency graph:
//!
//! ```text
//!        ai-relay-types (this crate)
//!                │
//!                ▼
//!         ai-relay-core
//!                │
//!                ▼
//!        ai-relay-server
//! ```

pub mod error;
pub mod models;
pub mod protocol;

// Re-export error types for convenience
pub use error::{ConfigError, DecodeError, InvokeError, NetworkError, Result};

// Re-export core model types
pub use models::{
    normalize_proxy_address, redact_proxy_address, AttemptRecord, CallOptions, ChatMessage,
    ConfigFingerprint, FallbackPath, InvocationRequest, JsonSchemaSpec, LatencyPercentiles,
    ProxyStatus, RelayConfig, ResponseFormat, Role, SummaryEnvelope, SummaryMeta, TelemetryEvent,
    TelemetrySummary, Usage, Variant,
};

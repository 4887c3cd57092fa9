//! Core domain models for the AI relay.

mod config;
mod request;
mod telemetry;

pub use config::{
    normalize_proxy_address, redact_proxy_address, ConfigFingerprint, RelayConfig, Variant,
};
pub use request::{CallOptions, ChatMessage, InvocationRequest, JsonSchemaSpec, ResponseFormat, Role};
pub use telemetry::{
    AttemptRecord, FallbackPath, LatencyPercentiles, ProxyStatus, SummaryEnvelope, SummaryMeta,
    TelemetryEvent, TelemetrySummary, Usage,
};

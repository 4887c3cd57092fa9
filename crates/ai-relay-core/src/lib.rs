//! Core resilience layer for AI model invocation.
//!
//! Turns "ask the model for a structured answer" into a reliable operation:
//! cached client handles per configuration fingerprint, proxied→direct
//! fallback, per-key circuit breaking and rate limiting, and a bounded
//! telemetry ring with read-only summaries.

pub mod circuit_breaker;
pub mod client_manager;
pub mod clock;
pub mod config;
pub mod gateway;
pub mod invoker;
pub mod prometheus;
pub mod rate_limit;
pub mod structured;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod test_support;

pub use circuit_breaker::{
    CircuitBreakerConfig, CircuitBreakerManager, CircuitPermit, CircuitPhase,
};
pub use client_manager::{ClientFactory, ClientHandle, ClientManager, ModelClient, ModelReply};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CachedConfigSource, ConfigSource, EnvConfigSource, StaticConfigSource};
pub use gateway::Gateway;
pub use invoker::{Invoker, RetryPolicy};
pub use rate_limit::{Admission, RateLimitPolicy, RateLimiter};
pub use structured::StructuredInvoker;
pub use telemetry::{TelemetryAggregator, TelemetrySink};

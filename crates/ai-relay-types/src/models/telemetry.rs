//! Attempt, telemetry and status models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::config::Variant;
use crate::error::NetworkError;

/// One network call against one variant, including its intra-variant retries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub index: usize,
    pub variant: Variant,
    pub duration_ms: u64,
    pub success: bool,
    /// Tries made against this variant (1 + retries used)
    pub tries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<NetworkError>,
}

impl AttemptRecord {
    pub fn succeeded(index: usize, variant: Variant, duration_ms: u64, tries: u32) -> Self {
        Self { index, variant, duration_ms, success: true, tries, error: None }
    }

    pub fn failed(
        index: usize,
        variant: Variant,
        duration_ms: u64,
        tries: u32,
        error: NetworkError,
    ) -> Self {
        Self { index, variant, duration_ms, success: false, tries, error: Some(error) }
    }
}

/// Which variants one call actually went through.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum FallbackPath {
    /// First variant answered (or failed with nothing left to try)
    #[default]
    #[serde(rename = "none")]
    None,
    /// Proxied attempt failed and a direct attempt followed
    #[serde(rename = "proxied->direct")]
    ProxiedToDirect,
    /// No proxy configured; only the direct variant exists
    #[serde(rename = "direct-only")]
    DirectOnly,
}

impl FallbackPath {
    /// Derive the path from the ordered attempt list.
    ///
    /// `proxy_enabled` tells apart a direct-only configuration from a proxied
    /// configuration whose first attempt succeeded.
    pub fn from_attempts(attempts: &[AttemptRecord], proxy_enabled: bool) -> Self {
        if !proxy_enabled {
            return Self::DirectOnly;
        }
        match attempts {
            [first, second, ..]
                if first.variant == Variant::Proxied
                    && !first.success
                    && second.variant == Variant::Direct =>
            {
                Self::ProxiedToDirect
            },
            _ => Self::None,
        }
    }
}

impl std::fmt::Display for FallbackPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FallbackPath::None => write!(f, "none"),
            FallbackPath::ProxiedToDirect => write!(f, "proxied->direct"),
            FallbackPath::DirectOnly => write!(f, "direct-only"),
        }
    }
}

/// Token usage reported by the provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub total_tokens: u64,
}

/// Emitted exactly once per completed call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryEvent {
    pub label: String,
    /// Network outcome: some variant returned a reply
    pub success: bool,
    pub attempts: Vec<AttemptRecord>,
    pub total_backoff_ms: u64,
    /// Wall time from first attempt to final outcome
    pub duration_ms: u64,
    pub fallback_path: FallbackPath,
    pub proxy_enabled: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_error: Option<String>,
    pub usage: Usage,
}

/// Latency distribution over the buffered events, in milliseconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct LatencyPercentiles {
    pub p50: u64,
    pub p90: u64,
    pub p95: u64,
    pub p99: u64,
    pub max: u64,
}

/// Aggregates recomputed from the telemetry ring buffer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySummary {
    pub total_calls: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub success_rate: f64,
    pub fallback_rate: f64,
    pub latency_ms: LatencyPercentiles,
    pub total_tokens: u64,
    pub total_backoff_ms: u64,
    pub calls_by_label: BTreeMap<String, usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_call: Option<TelemetryEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SummaryMeta {
    pub generated_at: DateTime<Utc>,
}

/// Read surface handed to the reporting endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SummaryEnvelope {
    pub data: TelemetrySummary,
    pub meta: SummaryMeta,
}

/// Read surface handed to the health-check endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProxyStatus {
    /// Redacted proxy address, `None` when no proxy is configured
    pub address: Option<String>,
    pub healthy: bool,
    pub last_checked_at: Option<DateTime<Utc>>,
}

//! Prometheus metrics for relay observability.
//!
//! Exposes:
//! - `ai_relay_invocations_total{label,outcome,fallback}` - Counter of completed calls
//! - `ai_relay_invocation_duration_seconds{label}` - Histogram of call durations
//! - `ai_relay_fallbacks_total{label}` - Counter of proxied→direct fallbacks
//! - `ai_relay_tokens_total{label}` - Counter of provider-reported tokens
//! - `ai_relay_rejections_total{reason}` - Counter of calls refused before invocation
//! - `ai_relay_circuit_trips_total` - Counter of breaker openings
//!
//! Recording functions are no-ops until [`init_metrics`] installs the recorder.

use ai_relay_types::{FallbackPath, TelemetryEvent};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Buckets for LLM latency, which is bimodal: sub-second for short
/// structured answers, tens of seconds for long generations.
const LLM_LATENCY_BUCKETS: &[f64] = &[
    0.1,  // 100ms
    0.25, // 250ms
    0.5,  // 500ms
    1.0,  // 1s
    2.0,  // 2s
    5.0,  // 5s
    10.0, // 10s
    30.0, // 30s
    60.0, // 60s
];

/// Install the Prometheus recorder. Later calls return the existing handle.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().set_buckets(LLM_LATENCY_BUCKETS)?.install_recorder()?;

    describe_counter!("ai_relay_invocations_total", "Completed relay calls by outcome");
    describe_histogram!(
        "ai_relay_invocation_duration_seconds",
        "End-to-end relay call duration in seconds"
    );
    describe_counter!("ai_relay_fallbacks_total", "Calls answered by direct after a proxied failure");
    describe_counter!("ai_relay_tokens_total", "Total tokens reported by the provider");
    describe_counter!(
        "ai_relay_rejections_total",
        "Calls refused by the rate limiter or circuit breaker"
    );
    describe_counter!("ai_relay_circuit_trips_total", "Circuit breaker transitions to open");

    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

pub fn get_prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

/// Render metrics in Prometheus text format, empty if not initialized.
pub fn render_metrics() -> String {
    PROMETHEUS_HANDLE.get().map(PrometheusHandle::render).unwrap_or_default()
}

pub fn record_invocation(event: &TelemetryEvent) {
    let label = event.label.clone();
    let outcome = match (event.success, event.final_error.is_some()) {
        (true, false) => "success",
        (true, true) => "decode_error",
        (false, _) => "failure",
    };

    counter!(
        "ai_relay_invocations_total",
        "label" => label.clone(),
        "outcome" => outcome,
        "fallback" => event.fallback_path.to_string()
    )
    .increment(1);
    histogram!("ai_relay_invocation_duration_seconds", "label" => label.clone())
        .record(event.duration_ms as f64 / 1000.0);

    if event.fallback_path == FallbackPath::ProxiedToDirect {
        counter!("ai_relay_fallbacks_total", "label" => label.clone()).increment(1);
    }
    if event.usage.total_tokens > 0 {
        counter!("ai_relay_tokens_total", "label" => label).increment(event.usage.total_tokens);
    }
}

/// `reason` is `rate_limited` or `breaker_open`.
pub fn record_rejection(reason: &'static str) {
    counter!("ai_relay_rejections_total", "reason" => reason).increment(1);
}

pub fn record_circuit_trip() {
    counter!("ai_relay_circuit_trips_total").increment(1);
}

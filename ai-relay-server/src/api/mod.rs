//! API Routes
//!
//! Invocation entry point plus the read-only telemetry, proxy and circuit
//! surfaces.

mod invoke;
mod proxy;
mod resilience;
mod telemetry;

#[cfg(test)]
mod invoke_tests;

pub use resilience::get_metrics;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        // Invocation
        .route("/ai/invoke", post(invoke::invoke_structured))
        // Telemetry
        .route("/ai/telemetry", get(telemetry::get_summary))
        .route("/ai/telemetry/recent", get(telemetry::get_recent))
        .route("/ai/telemetry/clear", post(telemetry::clear_telemetry))
        // Proxy health
        .route("/ai/proxy-status", get(proxy::get_proxy_status))
        // Resilience (circuit breaker, rate limiter)
        .route("/ai/circuits", get(resilience::get_circuit_status))
        .route("/ai/circuits/:key/reset", post(resilience::reset_circuit))
        .route("/ai/rate-limits", get(resilience::get_rate_limit_status))
        // API fallback: return 404 for unknown API endpoints
        .fallback(api_not_found)
}

async fn api_not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(serde_json::json!({"error": "Not found"})))
}

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;

use ai_relay_core::circuit_breaker::{CircuitBreakerSummary, CircuitSnapshot};
use ai_relay_core::prometheus;

use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitStatusResponse {
    pub summary: CircuitBreakerSummary,
    pub circuits: Vec<CircuitSnapshot>,
}

pub async fn get_circuit_status(State(state): State<AppState>) -> Json<CircuitStatusResponse> {
    let breaker = state.circuit_breaker();
    Json(CircuitStatusResponse { summary: breaker.summary(), circuits: breaker.snapshot() })
}

pub async fn reset_circuit(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<CircuitSnapshot>, (StatusCode, String)> {
    let breaker = state.circuit_breaker();
    breaker.reset(&key);
    breaker
        .snapshot()
        .into_iter()
        .find(|c| c.key == key)
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, format!("Unknown circuit: {}", key)))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStatusResponse {
    pub policy: String,
    pub capacity: u32,
    pub refill_per_sec: f64,
    pub tracked_keys: usize,
}

pub async fn get_rate_limit_status(State(state): State<AppState>) -> Json<RateLimitStatusResponse> {
    let limiter = state.rate_limiter();
    let policy = limiter.default_policy();

    Json(RateLimitStatusResponse {
        policy: policy.name.clone(),
        capacity: policy.capacity,
        refill_per_sec: policy.refill_per_sec,
        tracked_keys: limiter.tracked_keys(),
    })
}

pub async fn get_metrics() -> Response {
    let metrics = prometheus::render_metrics();
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")], metrics).into_response()
}

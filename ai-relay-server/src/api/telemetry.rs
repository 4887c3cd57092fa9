//! Telemetry read surface

use axum::{
    extract::{Query, State},
    response::Json,
};
use serde::Deserialize;

use ai_relay_types::{SummaryEnvelope, TelemetryEvent};

use crate::state::AppState;

const DEFAULT_RECENT_LIMIT: usize = 50;

#[derive(Deserialize)]
pub struct RecentQuery {
    pub limit: Option<usize>,
}

pub async fn get_summary(State(state): State<AppState>) -> Json<SummaryEnvelope> {
    Json(state.telemetry().envelope())
}

pub async fn get_recent(
    State(state): State<AppState>,
    Query(query): Query<RecentQuery>,
) -> Json<Vec<TelemetryEvent>> {
    let telemetry = state.telemetry();
    let limit = query.limit.unwrap_or(DEFAULT_RECENT_LIMIT).min(telemetry.capacity());
    Json(telemetry.recent(limit))
}

pub async fn clear_telemetry(State(state): State<AppState>) -> Json<bool> {
    state.telemetry().clear();
    Json(true)
}

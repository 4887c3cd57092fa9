//! Proxy health surface

use axum::{extract::State, response::Json};
use tracing::debug;

use ai_relay_types::ProxyStatus;

use crate::state::AppState;

/// Refresh proxy health (subject to the probe debounce) and report it.
///
/// An unresolvable config skips the probe and reports the last known state.
pub async fn get_proxy_status(State(state): State<AppState>) -> Json<ProxyStatus> {
    match state.config_source().snapshot() {
        Ok(config) => {
            state.clients().is_proxy_healthy(&config).await;
        },
        Err(e) => {
            debug!(error = %e, "Config unavailable, reporting cached proxy status");
        },
    }
    Json(state.clients().proxy_status())
}

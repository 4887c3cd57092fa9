//! AI Relay Server - Headless Daemon
//!
//! A small HTTP server that:
//! - Runs schema-constrained model calls through the relay on /api/ai/invoke
//! - Exposes telemetry, proxy health and circuit state on /api/ai/*
//! - Serves Prometheus metrics on /metrics
//!
//! Access via: http://localhost:8046

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod api;
mod router;
mod server_utils;
mod settings;
mod state;

#[cfg(test)]
mod test_helpers;

use ai_relay_core::config::DEFAULT_CONFIG_TTL;
use ai_relay_core::{
    CachedConfigSource, ClientManager, ConfigSource, EnvConfigSource, SystemClock,
    TelemetryAggregator,
};
use settings::ServerSettings;
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let settings = ServerSettings::from_env()?;
    info!("🚀 AI Relay Server starting on port {}...", settings.port);

    if let Err(e) = ai_relay_core::prometheus::init_metrics() {
        warn!("⚠️ Prometheus recorder not installed: {}", e);
    }

    let config_source: Arc<dyn ConfigSource> = Arc::new(CachedConfigSource::new(
        EnvConfigSource,
        DEFAULT_CONFIG_TTL,
        Arc::new(SystemClock),
    ));
    match config_source.snapshot() {
        Ok(config) => info!(
            base = %config.base_address,
            model = %config.default_model,
            proxied = config.proxy_address.is_some(),
            "📋 Relay configuration resolved"
        ),
        Err(e) => warn!("⚠️ Relay configuration not usable yet, calls will fail: {}", e),
    }

    let clients = Arc::new(ClientManager::with_http());
    let telemetry = Arc::new(TelemetryAggregator::new(settings.telemetry_capacity));
    let state = AppState::new_with_components(config_source, clients, telemetry, &settings);

    info!(
        capacity = settings.rate_limit.capacity,
        refill_per_sec = settings.rate_limit.refill_per_sec,
        breaker_threshold = settings.breaker.failure_threshold,
        breaker_cooldown_ms = settings.breaker.cooldown.as_millis() as u64,
        allowed_labels = settings.allowed_labels.as_ref().map_or(0, |l| l.len()),
        "✅ Application state initialized"
    );

    let sweeper = server_utils::spawn_idle_sweep(state.clone());
    let app = router::build_router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], settings.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("🌐 Server listening on http://{}", addr);
    info!("🔌 API available at http://localhost:{}/api/", settings.port);
    info!("📊 Metrics at http://localhost:{}/metrics", settings.port);

    axum::serve(listener, app).with_graceful_shutdown(server_utils::shutdown_signal()).await?;

    sweeper.abort();
    info!("👋 Server stopped");
    Ok(())
}

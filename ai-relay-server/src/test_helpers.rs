//! Test helpers for ai-relay-server unit tests.

use std::sync::Arc;
use std::time::Duration;

use axum_test::TestServer;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ai_relay_core::rate_limit::RateLimitPolicy;
use ai_relay_core::{
    CircuitBreakerConfig, ClientManager, Invoker, RetryPolicy, StaticConfigSource,
    TelemetryAggregator,
};
use ai_relay_types::RelayConfig;

use crate::router::build_router;
use crate::settings::ServerSettings;
use crate::state::AppState;

/// Nothing listens here, so proxied attempts fail fast with a connect error.
pub const DEAD_PROXY: &str = "http://127.0.0.1:9";

pub fn relay_config(base_address: &str) -> RelayConfig {
    RelayConfig {
        credential: "sk-test".to_string(),
        base_address: base_address.to_string(),
        timeout_ms: 2_000,
        max_retries: 0,
        ..Default::default()
    }
}

pub fn test_settings() -> ServerSettings {
    ServerSettings {
        rate_limit: RateLimitPolicy::new("default", 100, 0.0),
        breaker: CircuitBreakerConfig { failure_threshold: 2, cooldown: Duration::from_secs(60) },
        telemetry_capacity: 20,
        ..Default::default()
    }
}

/// Create an `AppState` backed by real HTTP clients and a fixed config.
pub fn test_app_state(config: RelayConfig, settings: &ServerSettings) -> AppState {
    let source = Arc::new(StaticConfigSource::new(config).expect("valid test config"));
    let clients = Arc::new(ClientManager::with_http());
    let telemetry = Arc::new(TelemetryAggregator::new(settings.telemetry_capacity));
    let invoker = Invoker::new(source, clients, telemetry.clone())
        .with_retry_policy(RetryPolicy::immediate());
    AppState::with_invoker(Arc::new(invoker), telemetry, settings)
}

pub fn test_server(state: AppState) -> TestServer {
    TestServer::new(build_router(state)).expect("failed to start test server")
}

/// Provider stub answering every completion with `content`.
pub async fn mock_provider(content: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}],
            "usage": {"total_tokens": 12}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;
    server
}

pub fn provider_base(server: &MockServer) -> String {
    format!("{}/v1", server.uri())
}

#![allow(clippy::unwrap_used, clippy::indexing_slicing, reason = "test assertions")]

use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ai_relay_types::RelayConfig;

use super::invoke::CALLER_KEY_HEADER;
use crate::settings::ServerSettings;
use crate::test_helpers::{
    mock_provider, provider_base, relay_config, test_app_state, test_server, test_settings,
    DEAD_PROXY,
};

fn payload() -> Value {
    json!({
        "label": "generate-quiz",
        "messages": [
            {"role": "system", "content": "Answer in JSON."},
            {"role": "user", "content": "One question about birds"}
        ],
        "schema": {
            "type": "object",
            "properties": {"question": {"type": "string"}},
            "required": ["question"]
        },
        "schemaName": "Quiz",
        "options": {"temperature": 0.2}
    })
}

#[tokio::test]
async fn test_invoke_returns_decoded_value() {
    let provider = mock_provider("{\"question\":\"Can penguins fly?\"}").await;
    let state = test_app_state(relay_config(&provider_base(&provider)), &test_settings());
    let server = test_server(state.clone());

    let response = server.post("/api/ai/invoke").json(&payload()).await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["question"], "Can penguins fly?");

    let summary = state.telemetry().summary();
    assert_eq!(summary.total_calls, 1);
    assert_eq!(summary.total_tokens, 12);
    assert_eq!(summary.calls_by_label.get("generate-quiz"), Some(&1));
}

#[tokio::test]
async fn test_invoke_sends_schema_envelope_upstream() {
    let provider = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(wiremock::matchers::body_partial_json(json!({
            "temperature": 0.2,
            "response_format": {
                "type": "json_schema",
                "json_schema": {"name": "Quiz", "strict": true}
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"index": 0, "message": {"content": "{\"question\":\"q\"}"}}]
        })))
        .expect(1)
        .mount(&provider)
        .await;

    let state = test_app_state(relay_config(&provider_base(&provider)), &test_settings());
    test_server(state).post("/api/ai/invoke").json(&payload()).await.assert_status_ok();
}

#[tokio::test]
async fn test_dead_proxy_falls_back_to_direct() {
    let provider = mock_provider("{\"question\":\"q\"}").await;
    let config = RelayConfig {
        proxy_address: Some(DEAD_PROXY.to_string()),
        ..relay_config(&provider_base(&provider))
    };
    let state = test_app_state(config, &test_settings());

    test_server(state.clone()).post("/api/ai/invoke").json(&payload()).await.assert_status_ok();

    let event = state.telemetry().recent(1).pop().unwrap();
    assert_eq!(event.attempts.len(), 2);
    assert_eq!(event.fallback_path, ai_relay_types::FallbackPath::ProxiedToDirect);
    assert!(!state.clients().proxy_status().healthy);
    assert_eq!(state.clients().proxy_failure_count(), 1);
}

#[tokio::test]
async fn test_schema_mismatch_is_bad_gateway() {
    let provider = mock_provider("{\"answer\":\"missing question\"}").await;
    let state = test_app_state(relay_config(&provider_base(&provider)), &test_settings());

    let response = test_server(state.clone()).post("/api/ai/invoke").json(&payload()).await;

    response.assert_status(StatusCode::BAD_GATEWAY);
    let body: Value = response.json();
    assert_eq!(body["error"]["type"], "Decode");
    assert_eq!(body["error"]["details"]["schema_name"], "Quiz");
    // The path worked, so telemetry counts a network success
    assert_eq!(state.telemetry().summary().success_count, 1);
}

#[tokio::test]
async fn test_rate_limited_caller_gets_429_with_retry_after() {
    let provider = mock_provider("{\"question\":\"q\"}").await;
    let settings = ServerSettings {
        rate_limit: ai_relay_core::RateLimitPolicy::new("default", 1, 0.5),
        ..test_settings()
    };
    let state = test_app_state(relay_config(&provider_base(&provider)), &settings);
    let server = test_server(state.clone());
    let caller = HeaderName::from_static(CALLER_KEY_HEADER);

    server
        .post("/api/ai/invoke")
        .add_header(caller.clone(), HeaderValue::from_static("user:1"))
        .json(&payload())
        .await
        .assert_status_ok();

    let limited = server
        .post("/api/ai/invoke")
        .add_header(caller.clone(), HeaderValue::from_static("user:1"))
        .json(&payload())
        .await;
    limited.assert_status(StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(limited.header(header::RETRY_AFTER), "2");
    let body: Value = limited.json();
    assert_eq!(body["error"]["type"], "RateLimitExceeded");

    // Another caller has its own bucket
    server
        .post("/api/ai/invoke")
        .add_header(caller, HeaderValue::from_static("user:2"))
        .json(&payload())
        .await
        .assert_status_ok();

    assert_eq!(state.telemetry().len(), 2);
}

#[tokio::test]
async fn test_breaker_opens_after_repeated_upstream_failures() {
    let provider = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(2)
        .mount(&provider)
        .await;
    let state = test_app_state(relay_config(&provider_base(&provider)), &test_settings());
    let server = test_server(state.clone());

    for _ in 0..2 {
        server
            .post("/api/ai/invoke")
            .json(&payload())
            .await
            .assert_status(StatusCode::BAD_GATEWAY);
    }

    let rejected = server.post("/api/ai/invoke").json(&payload()).await;
    rejected.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = rejected.json();
    assert_eq!(body["error"]["type"], "BreakerOpen");
    assert_eq!(body["error"]["details"]["key"], "generate-quiz");
    assert_eq!(state.telemetry().len(), 2);
}

#[tokio::test]
async fn test_malformed_payload_is_rejected_before_invocation() {
    let provider = mock_provider("{}").await;
    let state = test_app_state(relay_config(&provider_base(&provider)), &test_settings());

    let response = test_server(state.clone())
        .post("/api/ai/invoke")
        .json(&json!({"label": "x"}))
        .expect_failure()
        .await;

    assert!(response.status_code().is_client_error());
    assert!(state.telemetry().is_empty());
}

#[tokio::test]
async fn test_label_outside_allowed_set_is_rejected() {
    let provider = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&provider)
        .await;
    let settings = ServerSettings {
        allowed_labels: Some(["generate-topics".to_string()].into_iter().collect()),
        ..test_settings()
    };
    let state = test_app_state(relay_config(&provider_base(&provider)), &settings);
    let server = test_server(state.clone());

    let response = server.post("/api/ai/invoke").json(&payload()).expect_failure().await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"]["type"], "UnknownLabel");
    assert_eq!(body["error"]["details"]["label"], "generate-quiz");
    assert_eq!(state.circuit_breaker().tracked_keys(), 0);
    assert!(state.telemetry().is_empty());
}

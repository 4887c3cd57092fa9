//! Structured invocation handler

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use ai_relay_types::{CallOptions, ChatMessage, InvocationRequest, InvokeError};

use crate::state::AppState;

/// Header naming the caller for rate limiting.
pub const CALLER_KEY_HEADER: &str = "x-caller-key";
const ANONYMOUS_CALLER: &str = "anonymous";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokePayload {
    /// Telemetry label; also selects the rate limit policy and circuit
    pub label: String,
    pub messages: Vec<ChatMessage>,
    pub schema: Value,
    pub schema_name: String,
    #[serde(default)]
    pub options: CallOptions,
}

#[derive(Serialize)]
pub struct InvokeResponse {
    pub data: Value,
}

/// Relay error rendered with its mapped status and a `Retry-After` hint.
pub struct ApiError(pub InvokeError);

#[derive(Serialize)]
struct ApiErrorBody<'a> {
    error: &'a InvokeError,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ApiErrorBody { error: &self.0, message: self.0.to_string() };
        let mut response = (status, Json(body)).into_response();

        if let Some(ms) = self.0.retry_after_ms() {
            let secs = ms.div_ceil(1000).max(1);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

fn caller_key(headers: &HeaderMap) -> String {
    headers
        .get(CALLER_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(ANONYMOUS_CALLER)
        .to_string()
}

pub async fn invoke_structured(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<InvokePayload>,
) -> Result<Json<InvokeResponse>, ApiError> {
    if !state.label_allowed(&payload.label) {
        return Err(ApiError(InvokeError::UnknownLabel { label: payload.label }));
    }

    let caller = caller_key(&headers);
    let request = InvocationRequest::new(payload.label, payload.messages);

    let data: Value = state
        .gateway()
        .invoke_structured(&caller, request, payload.schema, &payload.schema_name, payload.options)
        .await
        .map_err(ApiError)?;

    Ok(Json(InvokeResponse { data }))
}

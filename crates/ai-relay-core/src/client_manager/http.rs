//! reqwest-backed model client.

use ai_relay_types::protocol::{ChatCompletionRequest, ChatCompletionResponse};
use ai_relay_types::{ConfigError, NetworkError, RelayConfig, Variant};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use super::{ClientFactory, ModelClient, ModelReply};

/// Longest upstream error body kept in a `NetworkError::Status`.
const MAX_ERROR_BODY_CHARS: usize = 512;

const MAX_CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

/// Builds one `reqwest::Client` per variant: routed through the proxy for
/// `Proxied`, with system proxies disabled for `Direct`.
#[derive(Debug, Clone)]
pub struct HttpClientFactory {
    user_agent: String,
}

impl Default for HttpClientFactory {
    fn default() -> Self {
        Self { user_agent: format!("ai-relay/{}", env!("CARGO_PKG_VERSION")) }
    }
}

impl HttpClientFactory {
    pub fn with_user_agent(user_agent: impl Into<String>) -> Self {
        Self { user_agent: user_agent.into() }
    }
}

impl ClientFactory for HttpClientFactory {
    fn build(
        &self,
        variant: Variant,
        config: &RelayConfig,
    ) -> Result<Arc<dyn ModelClient>, ConfigError> {
        let builder = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.timeout().min(MAX_CONNECT_TIMEOUT))
            .pool_max_idle_per_host(8)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .tcp_nodelay(true)
            .user_agent(self.user_agent.as_str());

        let builder = match variant {
            Variant::Proxied => {
                let address = config
                    .proxy_address
                    .as_deref()
                    .ok_or_else(|| ConfigError::Missing { field: "proxy_address".to_string() })?;
                let proxy = reqwest::Proxy::all(address).map_err(|e| {
                    ConfigError::invalid("proxy_address", format!("invalid proxy URL: {}", e))
                })?;
                builder.proxy(proxy)
            },
            Variant::Direct => builder.no_proxy(),
        };

        let http = builder
            .build()
            .map_err(|e| ConfigError::invalid("client", format!("failed to build client: {}", e)))?;

        Ok(Arc::new(HttpModelClient {
            http,
            base_address: config.base_address.clone(),
            credential: config.credential.clone(),
            timeout_ms: config.timeout_ms,
        }))
    }
}

/// OpenAI-compatible client for one variant.
pub struct HttpModelClient {
    http: Client,
    base_address: String,
    credential: String,
    timeout_ms: u64,
}

impl HttpModelClient {
    fn map_error(&self, e: &reqwest::Error) -> NetworkError {
        if e.is_timeout() {
            NetworkError::Timeout { timeout_ms: self.timeout_ms }
        } else if e.is_connect() {
            NetworkError::Connect { message: e.to_string() }
        } else {
            NetworkError::Transport { message: e.to_string() }
        }
    }

    async fn check_status(&self, response: reqwest::Response) -> Result<reqwest::Response, NetworkError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(NetworkError::Status { status: status.as_u16(), body: truncate(&body) })
    }
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn complete(&self, request: &ChatCompletionRequest) -> Result<ModelReply, NetworkError> {
        let url = format!("{}/chat/completions", self.base_address);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.credential)
            .json(request)
            .send()
            .await
            .map_err(|e| self.map_error(&e))?;

        let response = self.check_status(response).await?;
        let reply: ChatCompletionResponse = response.json().await.map_err(|e| {
            if e.is_decode() {
                NetworkError::InvalidReply { message: format!("malformed completion envelope: {}", e) }
            } else {
                self.map_error(&e)
            }
        })?;

        let total_tokens = reply.total_tokens();
        match reply.first_content() {
            Some(text) => Ok(ModelReply { text: text.to_string(), total_tokens }),
            None => {
                let refusal = reply
                    .choices
                    .first()
                    .and_then(|c| c.message.refusal.clone())
                    .unwrap_or_else(|| "reply carried no message content".to_string());
                Err(NetworkError::InvalidReply { message: refusal })
            },
        }
    }

    async fn probe(&self) -> Result<(), NetworkError> {
        let url = format!("{}/models", self.base_address);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.credential)
            .send()
            .await
            .map_err(|e| self.map_error(&e))?;
        self.check_status(response).await.map(|_| ())
    }
}

fn truncate(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        Some((idx, _)) => format!("{}…", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use ai_relay_types::{ChatMessage, InvocationRequest};
    use serde_json::json;
    use wiremock::matchers::{bearer_token, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> RelayConfig {
        RelayConfig {
            credential: "sk-test".to_string(),
            base_address: format!("{}/v1", server.uri()),
            timeout_ms: 2_000,
            ..Default::default()
        }
        .validated()
        .unwrap()
    }

    fn request(config: &RelayConfig) -> ChatCompletionRequest {
        let invocation = InvocationRequest::new("quiz", vec![ChatMessage::user("hello")]);
        ChatCompletionRequest::from_request(&invocation, config)
    }

    #[tokio::test]
    async fn test_complete_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(bearer_token("sk-test"))
            .and(body_partial_json(json!({"model": "gpt-4o-mini"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"index": 0, "message": {"content": "{\"ok\":true}"}}],
                "usage": {"total_tokens": 42}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let config = config_for(&server);
        let client = HttpClientFactory::default().build(Variant::Direct, &config).unwrap();
        let reply = client.complete(&request(&config)).await.unwrap();

        assert_eq!(reply.text, "{\"ok\":true}");
        assert_eq!(reply.total_tokens, 42);
    }

    #[tokio::test]
    async fn test_complete_maps_status_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let config = config_for(&server);
        let client = HttpClientFactory::default().build(Variant::Direct, &config).unwrap();
        let err = client.complete(&request(&config)).await.unwrap_err();

        assert_eq!(err, NetworkError::Status { status: 503, body: "overloaded".to_string() });
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_complete_without_content_is_invalid_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let config = config_for(&server);
        let client = HttpClientFactory::default().build(Variant::Direct, &config).unwrap();
        let err = client.complete(&request(&config)).await.unwrap_err();

        assert!(matches!(err, NetworkError::InvalidReply { .. }));
    }

    #[tokio::test]
    async fn test_complete_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let config = RelayConfig { timeout_ms: 50, ..config_for(&server) };
        let client = HttpClientFactory::default().build(Variant::Direct, &config).unwrap();
        let err = client.complete(&request(&config)).await.unwrap_err();

        assert_eq!(err, NetworkError::Timeout { timeout_ms: 50 });
    }

    #[tokio::test]
    async fn test_probe_hits_models_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .expect(1)
            .mount(&server)
            .await;

        let config = config_for(&server);
        let client = HttpClientFactory::default().build(Variant::Direct, &config).unwrap();
        client.probe().await.unwrap();
    }

    #[test]
    fn test_proxied_build_requires_proxy() {
        let config = RelayConfig { credential: "sk".to_string(), ..Default::default() };
        let err = HttpClientFactory::default().build(Variant::Proxied, &config).err().unwrap();
        assert!(matches!(err, ConfigError::Missing { .. }));
    }

    #[test]
    fn test_truncate_long_body() {
        let body = "x".repeat(MAX_ERROR_BODY_CHARS + 10);
        let truncated = truncate(&body);
        assert_eq!(truncated.chars().count(), MAX_ERROR_BODY_CHARS + 1);
    }
}

//! Invocation engine.
//!
//! Runs one logical call across the configured variants in order
//! (proxied, then direct), strictly one after another, and stops at the first
//! variant that answers. Every completed call produces exactly one
//! telemetry event.

mod retry;


pub use retry::RetryPolicy;

use ai_relay_types::protocol::ChatCompletionRequest;
use ai_relay_types::{
    AttemptRecord, DecodeError, FallbackPath, InvocationRequest, InvokeError, NetworkError,
    RelayConfig, TelemetryEvent, Usage, Variant,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::client_manager::{ClientManager, ModelReply};
use crate::clock::{elapsed_ms, Clock, SystemClock};
use crate::config::ConfigSource;
use crate::prometheus;
use crate::telemetry::TelemetrySink;

/// Outcome of all tries against one variant.
struct VariantRun {
    result: Result<ModelReply, NetworkError>,
    tries: u32,
    backoff_ms: u64,
}

pub struct Invoker {
    config: Arc<dyn ConfigSource>,
    clients: Arc<ClientManager>,
    telemetry: Arc<dyn TelemetrySink>,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl Invoker {
    pub fn new(
        config: Arc<dyn ConfigSource>,
        clients: Arc<ClientManager>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self { config, clients, telemetry, retry: RetryPolicy::default(), clock: Arc::new(SystemClock) }
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn clients(&self) -> &Arc<ClientManager> {
        &self.clients
    }

    pub fn config_source(&self) -> &Arc<dyn ConfigSource> {
        &self.config
    }

    /// Execute `request` and hand the raw reply text to `parser` exactly once.
    ///
    /// A parser failure surfaces as [`InvokeError::Decode`] and never causes
    /// another variant to be tried.
    pub async fn invoke<T, P>(&self, request: &InvocationRequest, parser: P) -> Result<T, InvokeError>
    where
        P: FnOnce(&str) -> Result<T, DecodeError>,
    {
        let config = self.config.snapshot()?;
        let body = ChatCompletionRequest::from_request(request, &config);
        let started = self.clock.now();

        let mut attempts = Vec::with_capacity(config.variants().len());
        let mut total_backoff_ms = 0;
        let mut last_error = None;
        let mut reply = None;

        for (index, &variant) in config.variants().iter().enumerate() {
            let attempt_started = self.clock.now();
            let run = self.run_variant(variant, &config, &body).await;
            total_backoff_ms += run.backoff_ms;
            let duration_ms = elapsed_ms(self.clock.as_ref(), attempt_started);

            match run.result {
                Ok(answer) => {
                    attempts.push(AttemptRecord::succeeded(index, variant, duration_ms, run.tries));
                    reply = Some(answer);
                    break;
                },
                Err(error) => {
                    if variant == Variant::Proxied {
                        if let Some(address) = config.proxy_address.as_deref() {
                            self.clients.mark_proxy_failure(address, &error);
                        }
                    }
                    warn!(
                        label = %request.label,
                        variant = %variant,
                        tries = run.tries,
                        error = %error,
                        "Variant attempt failed"
                    );
                    attempts.push(AttemptRecord::failed(
                        index,
                        variant,
                        duration_ms,
                        run.tries,
                        error.clone(),
                    ));
                    last_error = Some(error);
                },
            }
        }

        let fallback_path = FallbackPath::from_attempts(&attempts, config.proxy_enabled());
        let mut event = TelemetryEvent {
            label: request.label.clone(),
            success: reply.is_some(),
            attempts,
            total_backoff_ms,
            duration_ms: elapsed_ms(self.clock.as_ref(), started),
            fallback_path,
            proxy_enabled: config.proxy_enabled(),
            timestamp: self.clock.wall(),
            final_error: None,
            usage: Usage::default(),
        };

        let Some(reply) = reply else {
            let last_error = last_error.unwrap_or_else(|| NetworkError::ClientUnavailable {
                variant: Variant::Direct,
                message: "no variant configured".to_string(),
            });
            event.final_error = Some(last_error.to_string());
            let attempts = event.attempts.clone();
            self.emit(event);
            return Err(InvokeError::InvocationFailed { attempts, last_error });
        };

        if fallback_path == FallbackPath::ProxiedToDirect {
            info!(label = %request.label, "Direct fallback answered after proxied failure");
        }

        event.usage = Usage { total_tokens: reply.total_tokens };
        let parsed = parser(&reply.text);
        if let Err(e) = &parsed {
            event.final_error = Some(e.to_string());
        }
        self.emit(event);

        parsed.map_err(InvokeError::Decode)
    }

    async fn run_variant(
        &self,
        variant: Variant,
        config: &RelayConfig,
        body: &ChatCompletionRequest,
    ) -> VariantRun {
        let handle = match self.clients.get_client(variant, config) {
            Ok(handle) => handle,
            Err(e) => {
                return VariantRun {
                    result: Err(NetworkError::ClientUnavailable { variant, message: e.to_string() }),
                    tries: 0,
                    backoff_ms: 0,
                };
            },
        };

        let mut tries = 0;
        let mut backoff_ms = 0;
        loop {
            tries += 1;
            let result =
                match tokio::time::timeout(config.timeout(), handle.client().complete(body)).await {
                    Ok(result) => result,
                    Err(_) => Err(NetworkError::Timeout { timeout_ms: config.timeout_ms }),
                };

            match result {
                Ok(reply) => return VariantRun { result: Ok(reply), tries, backoff_ms },
                Err(error) if error.is_retryable() && tries <= config.max_retries => {
                    let delay = self.retry.delay_for_attempt(tries - 1);
                    debug!(
                        variant = %variant,
                        try_number = tries,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Retrying variant after backoff"
                    );
                    tokio::time::sleep(delay).await;
                    backoff_ms += delay.as_millis() as u64;
                },
                Err(error) => return VariantRun { result: Err(error), tries, backoff_ms },
            }
        }
    }

    fn emit(&self, event: TelemetryEvent) {
        debug!(
            label = %event.label,
            success = event.success,
            attempts = event.attempts.len(),
            fallback = %event.fallback_path,
            duration_ms = event.duration_ms,
            "Invocation completed"
        );
        prometheus::record_invocation(&event);
        self.telemetry.emit(event);
    }
}

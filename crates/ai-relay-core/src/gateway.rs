//! Call path for route handlers: rate limiter, then circuit breaker, then the
//! structured invocation.

use ai_relay_types::{CallOptions, InvocationRequest, InvokeError};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::circuit_breaker::CircuitBreakerManager;
use crate::prometheus;
use crate::rate_limit::RateLimiter;
use crate::structured::StructuredInvoker;

pub struct Gateway {
    limiter: Arc<RateLimiter>,
    breaker: Arc<CircuitBreakerManager>,
    structured: StructuredInvoker,
}

impl Gateway {
    pub fn new(
        limiter: Arc<RateLimiter>,
        breaker: Arc<CircuitBreakerManager>,
        structured: StructuredInvoker,
    ) -> Self {
        Self { limiter, breaker, structured }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn breaker(&self) -> &Arc<CircuitBreakerManager> {
        &self.breaker
    }

    pub fn structured(&self) -> &StructuredInvoker {
        &self.structured
    }

    /// Admit `caller_key` under the policy named after the request label,
    /// then run the call under the circuit for that label.
    ///
    /// Rejections never reach the breaker or telemetry.
    pub async fn invoke_structured<T: DeserializeOwned>(
        &self,
        caller_key: &str,
        request: InvocationRequest,
        schema: Value,
        schema_name: &str,
        options: CallOptions,
    ) -> Result<T, InvokeError> {
        let admission = self.limiter.admit_with(&request.label, caller_key);
        if !admission.allowed {
            prometheus::record_rejection("rate_limited");
            return Err(InvokeError::RateLimitExceeded {
                key: caller_key.to_string(),
                retry_after_ms: admission.retry_after_ms.unwrap_or(1),
            });
        }
        debug!(
            caller = %caller_key,
            label = %request.label,
            remaining = admission.remaining,
            "Admitted relay call"
        );

        let label = request.label.clone();
        self.breaker
            .call(&label, self.structured.invoke_structured(request, schema, schema_name, options))
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::circuit_breaker::{CircuitBreakerConfig, CircuitPhase};
    use crate::client_manager::ClientManager;
    use crate::clock::ManualClock;
    use crate::config::StaticConfigSource;
    use crate::invoker::{Invoker, RetryPolicy};
    use crate::rate_limit::RateLimitPolicy;
    use crate::telemetry::TelemetryAggregator;
    use crate::test_support::{
        connect_error, direct_config, reply, ScriptedClient, ScriptedFactory,
    };
    use ai_relay_types::{ChatMessage, Variant};
    use serde_json::json;
    use std::time::Duration;

    struct Fixture {
        gateway: Gateway,
        telemetry: Arc<TelemetryAggregator>,
        direct: Arc<ScriptedClient>,
    }

    fn fixture(script: Vec<crate::test_support::Outcome>, capacity: u32) -> Fixture {
        let clock = Arc::new(ManualClock::new());
        let direct = ScriptedClient::new(script);
        let factory = ScriptedFactory::new().with(Variant::Direct, direct.clone());
        let clients = Arc::new(ClientManager::new(factory, clock.clone()));
        let telemetry = Arc::new(TelemetryAggregator::with_clock(10, clock.clone()));
        let source = Arc::new(StaticConfigSource::new(direct_config()).unwrap());
        let invoker = Invoker::new(source, clients, telemetry.clone())
            .with_retry_policy(RetryPolicy::immediate())
            .with_clock(clock.clone());

        let limiter = RateLimiter::with_clock(RateLimitPolicy::new("default", capacity, 0.0), clock.clone());
        let breaker = CircuitBreakerManager::with_clock(
            CircuitBreakerConfig { failure_threshold: 2, cooldown: Duration::from_secs(30) },
            clock,
        );
        let gateway = Gateway::new(
            Arc::new(limiter),
            Arc::new(breaker),
            StructuredInvoker::new(Arc::new(invoker)),
        );
        Fixture { gateway, telemetry, direct }
    }

    fn request() -> InvocationRequest {
        InvocationRequest::new("generate-quiz", vec![ChatMessage::user("birds")])
    }

    async fn call(gateway: &Gateway) -> Result<Value, InvokeError> {
        gateway
            .invoke_structured("ip:1", request(), json!({"type": "object"}), "Quiz", CallOptions::default())
            .await
    }

    #[tokio::test]
    async fn test_successful_call_flows_through() {
        let f = fixture(vec![reply("{\"ok\":true}")], 5);
        let value = call(&f.gateway).await.unwrap();
        assert_eq!(value, json!({"ok": true}));
        assert_eq!(f.telemetry.len(), 1);
    }

    #[tokio::test]
    async fn test_rate_limited_calls_skip_engine_and_telemetry() {
        let f = fixture(vec![reply("{}")], 1);
        call(&f.gateway).await.unwrap();

        let err = call(&f.gateway).await.unwrap_err();
        assert!(matches!(err, InvokeError::RateLimitExceeded { ref key, .. } if key == "ip:1"));
        assert_eq!(f.direct.call_count(), 1);
        assert_eq!(f.telemetry.len(), 1);
        assert_eq!(f.gateway.breaker().summary().open, 0);
    }

    #[tokio::test]
    async fn test_breaker_opens_on_repeated_path_failures() {
        let f = fixture(vec![connect_error()], 10);

        for _ in 0..2 {
            let err = call(&f.gateway).await.unwrap_err();
            assert!(err.is_path_failure());
        }
        assert_eq!(f.gateway.breaker().state("generate-quiz"), CircuitPhase::Open);

        let err = call(&f.gateway).await.unwrap_err();
        assert!(matches!(err, InvokeError::BreakerOpen { .. }));
        assert_eq!(f.direct.call_count(), 2);
        assert_eq!(f.telemetry.len(), 2);
    }

    #[tokio::test]
    async fn test_decode_errors_do_not_trip_breaker() {
        let f = fixture(vec![reply("not json")], 10);
        for _ in 0..3 {
            assert!(matches!(call(&f.gateway).await, Err(InvokeError::Decode(_))));
        }
        assert_eq!(f.gateway.breaker().state("generate-quiz"), CircuitPhase::Closed);
    }
}

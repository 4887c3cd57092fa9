//! Application State
//!
//! Holds the shared relay components behind one cheaply clonable handle.

use std::collections::HashSet;
use std::sync::Arc;

use ai_relay_core::{
    CircuitBreakerManager, ClientManager, ConfigSource, Gateway, Invoker, RateLimiter,
    StructuredInvoker, TelemetryAggregator,
};

use crate::settings::ServerSettings;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub(crate) inner: Arc<AppStateInner>,
}

pub struct AppStateInner {
    pub config_source: Arc<dyn ConfigSource>,
    pub clients: Arc<ClientManager>,
    pub telemetry: Arc<TelemetryAggregator>,
    pub gateway: Gateway,
    pub allowed_labels: Option<HashSet<String>>,
}

impl AppState {
    /// Wire the relay from pre-built components.
    pub fn new_with_components(
        config_source: Arc<dyn ConfigSource>,
        clients: Arc<ClientManager>,
        telemetry: Arc<TelemetryAggregator>,
        settings: &ServerSettings,
    ) -> Self {
        let invoker = Arc::new(Invoker::new(config_source, clients, telemetry.clone()));
        Self::with_invoker(invoker, telemetry, settings)
    }

    /// Same as [`AppState::new_with_components`] with a caller-configured engine.
    pub fn with_invoker(
        invoker: Arc<Invoker>,
        telemetry: Arc<TelemetryAggregator>,
        settings: &ServerSettings,
    ) -> Self {
        let config_source = invoker.config_source().clone();
        let clients = invoker.clients().clone();
        let gateway = Gateway::new(
            Arc::new(RateLimiter::new(settings.rate_limit.clone())),
            Arc::new(CircuitBreakerManager::with_config(settings.breaker.clone())),
            StructuredInvoker::new(invoker),
        );

        let allowed_labels = settings.allowed_labels.clone();

        Self {
            inner: Arc::new(AppStateInner {
                config_source,
                clients,
                telemetry,
                gateway,
                allowed_labels,
            }),
        }
    }

    pub fn config_source(&self) -> &Arc<dyn ConfigSource> {
        &self.inner.config_source
    }

    pub fn clients(&self) -> &Arc<ClientManager> {
        &self.inner.clients
    }

    pub fn telemetry(&self) -> &Arc<TelemetryAggregator> {
        &self.inner.telemetry
    }

    pub fn gateway(&self) -> &Gateway {
        &self.inner.gateway
    }

    pub fn circuit_breaker(&self) -> &Arc<CircuitBreakerManager> {
        self.inner.gateway.breaker()
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        self.inner.gateway.limiter()
    }

    /// Whether `label` may key a circuit and its metrics series.
    pub fn label_allowed(&self, label: &str) -> bool {
        self.inner.allowed_labels.as_ref().map_or(true, |labels| labels.contains(label))
    }
}

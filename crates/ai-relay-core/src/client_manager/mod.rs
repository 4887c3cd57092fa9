//! Client handle cache and proxy health tracking.
//!
//! One handle per network variant, rebuilt whenever the configuration
//! fingerprint changes. Proxy health is a debounced cache: probes run at most
//! once per window, while real attempt failures flip it immediately.

mod health;
mod http;


pub use health::{ProxyHealthState, DEFAULT_DEBOUNCE_WINDOW};
pub use http::{HttpClientFactory, HttpModelClient};

use ai_relay_types::protocol::ChatCompletionRequest;
use ai_relay_types::{
    redact_proxy_address, ConfigError, ConfigFingerprint, NetworkError, ProxyStatus, RelayConfig,
    Variant,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};

/// Text reply of one successful completion call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelReply {
    pub text: String,
    pub total_tokens: u64,
}

/// Connection to the model provider over one variant.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, request: &ChatCompletionRequest) -> Result<ModelReply, NetworkError>;

    /// Lightweight capability check used for proxy health.
    async fn probe(&self) -> Result<(), NetworkError>;
}

/// Builds clients for a variant. Must not perform I/O.
pub trait ClientFactory: Send + Sync {
    fn build(
        &self,
        variant: Variant,
        config: &RelayConfig,
    ) -> Result<Arc<dyn ModelClient>, ConfigError>;
}

/// Cached client plus the fingerprint of the config it was built from.
#[derive(Clone)]
pub struct ClientHandle {
    variant: Variant,
    fingerprint: ConfigFingerprint,
    client: Arc<dyn ModelClient>,
    generation: u64,
}

impl ClientHandle {
    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn fingerprint(&self) -> &ConfigFingerprint {
        &self.fingerprint
    }

    /// Whether both values refer to the same built client.
    pub fn same_as(&self, other: &ClientHandle) -> bool {
        self.generation == other.generation && Arc::ptr_eq(&self.client, &other.client)
    }

    pub(crate) fn client(&self) -> &Arc<dyn ModelClient> {
        &self.client
    }
}

impl std::fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandle")
            .field("variant", &self.variant)
            .field("fingerprint", &self.fingerprint.to_string())
            .field("generation", &self.generation)
            .finish()
    }
}

/// Owns client handles and the shared proxy health state.
pub struct ClientManager {
    factory: Arc<dyn ClientFactory>,
    clock: Arc<dyn Clock>,
    handles: RwLock<HashMap<Variant, ClientHandle>>,
    health: RwLock<ProxyHealthState>,
    /// Serializes probes so a burst of callers triggers one probe
    probe_lock: tokio::sync::Mutex<()>,
    generation: AtomicU64,
    probes: AtomicU64,
    failure_marks: AtomicU64,
}

impl ClientManager {
    pub fn new(factory: Arc<dyn ClientFactory>, clock: Arc<dyn Clock>) -> Self {
        Self::with_debounce(factory, clock, DEFAULT_DEBOUNCE_WINDOW)
    }

    pub fn with_debounce(
        factory: Arc<dyn ClientFactory>,
        clock: Arc<dyn Clock>,
        debounce_window: Duration,
    ) -> Self {
        Self {
            factory,
            clock,
            handles: RwLock::new(HashMap::new()),
            health: RwLock::new(ProxyHealthState::new(debounce_window)),
            probe_lock: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
            probes: AtomicU64::new(0),
            failure_marks: AtomicU64::new(0),
        }
    }

    /// Manager backed by real HTTP clients and the system clock.
    pub fn with_http() -> Self {
        Self::new(Arc::new(HttpClientFactory::default()), Arc::new(SystemClock))
    }

    /// Get the handle for `variant`, rebuilding it if `config` changed.
    pub fn get_client(
        &self,
        variant: Variant,
        config: &RelayConfig,
    ) -> Result<ClientHandle, ConfigError> {
        if variant == Variant::Proxied {
            let Some(address) = config.proxy_address.as_deref() else {
                return Err(ConfigError::Missing { field: "proxy_address".to_string() });
            };
            self.track_proxy_address(address);
        }

        let fingerprint = config.fingerprint();

        // Fast path: read lock
        {
            let handles = self.handles.read();
            if let Some(handle) = handles.get(&variant) {
                if handle.fingerprint == fingerprint {
                    return Ok(handle.clone());
                }
            }
        }

        // Build outside the lock; a concurrent rebuild for the same fingerprint
        // is harmless and the last insert wins.
        let client = self.factory.build(variant, config)?;
        let handle = ClientHandle {
            variant,
            fingerprint,
            client,
            generation: self.generation.fetch_add(1, Ordering::Relaxed) + 1,
        };

        info!(
            variant = %variant,
            fingerprint = %handle.fingerprint,
            generation = handle.generation,
            "Built new model client"
        );
        self.handles.write().insert(variant, handle.clone());
        Ok(handle)
    }

    /// Whether the proxied variant is believed healthy, probing at most once
    /// per debounce window.
    pub async fn is_proxy_healthy(&self, config: &RelayConfig) -> bool {
        if !config.health_check_enabled {
            return true;
        }
        let Some(address) = config.proxy_address.as_deref() else {
            return false;
        };

        if let Some(cached) = self.cached_health(address) {
            return cached;
        }

        let _probe_guard = self.probe_lock.lock().await;
        // Another caller may have probed while we waited
        if let Some(cached) = self.cached_health(address) {
            return cached;
        }

        let healthy = match self.get_client(Variant::Proxied, config) {
            Ok(handle) => {
                self.probes.fetch_add(1, Ordering::Relaxed);
                match tokio::time::timeout(config.timeout(), handle.client().probe()).await {
                    Ok(Ok(())) => true,
                    Ok(Err(e)) => {
                        warn!(error = %e, "Proxy health probe failed");
                        false
                    },
                    Err(_) => {
                        warn!(timeout_ms = config.timeout_ms, "Proxy health probe timed out");
                        false
                    },
                }
            },
            Err(e) => {
                warn!(error = %e, "Proxy client unavailable for health probe");
                false
            },
        };

        let now = self.clock.now();
        let wall = self.clock.wall();
        let mut health = self.health.write();
        health.retarget(Some(address));
        health.record(healthy, now, wall);
        drop(health);
        debug!(healthy, "Proxy health probe recorded");
        healthy
    }

    fn cached_health(&self, address: &str) -> Option<bool> {
        self.track_proxy_address(address);
        let health = self.health.read();
        (!health.probe_needed(self.clock.now())).then_some(health.healthy)
    }

    /// Health results belong to one proxy address; a new address starts unknown.
    fn track_proxy_address(&self, address: &str) {
        if self.health.read().address.as_deref() == Some(address) {
            return;
        }
        if self.health.write().retarget(Some(address)) {
            debug!(proxy = %redact_proxy_address(address), "Tracking new proxy address");
        }
    }

    /// Record a real proxied failure through `address`; takes effect immediately.
    ///
    /// A failure through a proxy other than the one currently tracked says
    /// nothing about the current proxy and is dropped.
    pub fn mark_proxy_failure(&self, address: &str, error: &NetworkError) {
        let now = self.clock.now();
        let wall = self.clock.wall();
        let mut health = self.health.write();
        match health.address.as_deref() {
            None => {
                health.retarget(Some(address));
            },
            Some(tracked) if tracked != address => {
                debug!(
                    proxy = %redact_proxy_address(address),
                    error = %error,
                    "Ignoring failure from a proxy that is no longer tracked"
                );
                return;
            },
            Some(_) => {},
        }

        self.failure_marks.fetch_add(1, Ordering::Relaxed);
        let was_healthy = health.healthy;
        health.record(false, now, wall);

        if was_healthy {
            warn!(error = %error, "Proxy marked unhealthy after failed attempt");
        } else {
            debug!(error = %error, "Proxy failure recorded");
        }
    }

    pub fn proxy_status(&self) -> ProxyStatus {
        self.health.read().status()
    }

    /// Drop every cached handle and forget proxy health.
    pub fn reset(&self) {
        self.handles.write().clear();
        let mut health = self.health.write();
        *health = ProxyHealthState::new(health.debounce_window);
        info!("Client manager reset");
    }

    /// Number of probes actually sent.
    pub fn probe_count(&self) -> u64 {
        self.probes.load(Ordering::Relaxed)
    }

    /// Number of proxy failures recorded since creation.
    pub fn proxy_failure_count(&self) -> u64 {
        self.failure_marks.load(Ordering::Relaxed)
    }

    /// Number of handles built since creation.
    pub fn rebuild_count(&self) -> u64 {
        self.generation.load(Ordering::Relaxed)
    }
}

//! Scripted clients for exercising the relay without a network.

use ai_relay_types::protocol::ChatCompletionRequest;
use ai_relay_types::{ConfigError, NetworkError, RelayConfig, Variant};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::client_manager::{ClientFactory, ModelClient, ModelReply};

pub(crate) type Outcome = Result<ModelReply, NetworkError>;

pub(crate) fn reply(text: &str) -> Outcome {
    Ok(ModelReply { text: text.to_string(), total_tokens: 10 })
}

pub(crate) fn connect_error() -> Outcome {
    Err(NetworkError::Connect { message: "connection refused".to_string() })
}

/// Replays outcomes in order; the last one repeats once the script runs out.
pub(crate) struct ScriptedClient {
    script: Mutex<VecDeque<Outcome>>,
    last: Mutex<Option<Outcome>>,
    probe_result: Mutex<Result<(), NetworkError>>,
    last_request: Mutex<Option<ChatCompletionRequest>>,
    pub calls: AtomicUsize,
    pub probes: AtomicUsize,
}

impl ScriptedClient {
    pub fn new(script: Vec<Outcome>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            probe_result: Mutex::new(Ok(())),
            last_request: Mutex::new(None),
            calls: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
        })
    }

    pub fn set_probe_result(&self, result: Result<(), NetworkError>) {
        *self.probe_result.lock() = result;
    }

    pub fn last_request(&self) -> Option<ChatCompletionRequest> {
        self.last_request.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    async fn complete(&self, request: &ChatCompletionRequest) -> Result<ModelReply, NetworkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock() = Some(request.clone());
        let next = self.script.lock().pop_front();
        match next {
            Some(outcome) => {
                *self.last.lock() = Some(outcome.clone());
                outcome
            },
            None => self.last.lock().clone().unwrap_or_else(|| connect_error()),
        }
    }

    async fn probe(&self) -> Result<(), NetworkError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.probe_result.lock().clone()
    }
}

/// Hands out one fixed client per variant and counts builds.
#[derive(Default)]
pub(crate) struct ScriptedFactory {
    clients: Mutex<HashMap<Variant, Arc<ScriptedClient>>>,
    pub builds: AtomicUsize,
}

impl ScriptedFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with(self: Arc<Self>, variant: Variant, client: Arc<ScriptedClient>) -> Arc<Self> {
        self.clients.lock().insert(variant, client);
        self
    }

    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

impl ClientFactory for ScriptedFactory {
    fn build(
        &self,
        variant: Variant,
        _config: &RelayConfig,
    ) -> Result<Arc<dyn ModelClient>, ConfigError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        let client = self
            .clients
            .lock()
            .entry(variant)
            .or_insert_with(|| ScriptedClient::new(vec![connect_error()]))
            .clone();
        Ok(client)
    }
}

pub(crate) fn direct_config() -> RelayConfig {
    RelayConfig { credential: "sk-test".to_string(), ..Default::default() }
}

pub(crate) const PROXY_ADDRESS: &str = "http://127.0.0.1:7890";

pub(crate) fn proxied_config() -> RelayConfig {
    RelayConfig {
        credential: "sk-test".to_string(),
        proxy_address: Some(PROXY_ADDRESS.to_string()),
        ..Default::default()
    }
}

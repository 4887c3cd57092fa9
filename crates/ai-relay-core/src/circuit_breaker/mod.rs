//! Circuit breaker for per-key fast-fail behavior
//!
//! Each protected key (typically a route label) gets its own circuit. After
//! enough consecutive path failures the circuit opens and calls fail fast
//! until the cooldown elapses; then exactly one trial call decides whether it
//! closes again or re-opens with a fresh cooldown.
//!
//! States:
//! - Closed: Normal operation, calls pass through
//! - Open: Path is failing, calls fail immediately
//! - Half-Open: One trial call is testing recovery

mod state;


use state::KeyCircuit;
pub use state::{
    CircuitBreakerConfig, CircuitBreakerSummary, CircuitPermit, CircuitPhase, CircuitSnapshot,
};

use ai_relay_types::InvokeError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::prometheus;

/// Retry hint given to callers arriving while a half-open trial runs.
const TRIAL_BUSY_RETRY: Duration = Duration::from_secs(1);

/// Manages circuit breakers for all keys
#[derive(Debug)]
pub struct CircuitBreakerManager {
    config: CircuitBreakerConfig,
    circuits: RwLock<HashMap<String, KeyCircuit>>,
    total_trips: AtomicU64,
    next_epoch: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl Default for CircuitBreakerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitBreakerManager {
    pub fn new() -> Self {
        Self::with_config(CircuitBreakerConfig::default())
    }

    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            circuits: RwLock::new(HashMap::new()),
            total_trips: AtomicU64::new(0),
            next_epoch: AtomicU64::new(0),
            clock,
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn fresh_epoch(&self) -> u64 {
        self.next_epoch.fetch_add(1, Ordering::Relaxed)
    }

    /// Check if a call may proceed.
    ///
    /// Returns a permit if it can, `Err(Duration)` with a retry delay if blocked.
    /// A trial permit in half-open holds the single trial slot; the caller must
    /// then report the outcome through `record_success`, `record_failure` or
    /// `record_neutral`.
    pub fn should_allow(&self, key: &str) -> Result<CircuitPermit, Duration> {
        let now = self.clock.now();
        let mut circuits = self.circuits.write();
        let circuit = circuits
            .entry(key.to_string())
            .or_insert_with(|| KeyCircuit::closed(self.fresh_epoch()));

        match circuit.phase {
            CircuitPhase::Closed => Ok(CircuitPermit { epoch: circuit.epoch, trial: false }),
            CircuitPhase::Open => {
                let Some(opened_at) = circuit.opened_at else {
                    return Err(self.config.cooldown);
                };
                let elapsed = now.saturating_duration_since(opened_at);
                if elapsed < self.config.cooldown {
                    return Err(self.config.cooldown.saturating_sub(elapsed));
                }

                debug!(key = %key, "Circuit breaker transitioning to half-open");
                circuit.phase = CircuitPhase::HalfOpen;
                circuit.trial_in_flight = true;
                Self::log_transition(
                    key,
                    CircuitPhase::Open,
                    CircuitPhase::HalfOpen,
                    Some("Cooldown elapsed, testing recovery"),
                );
                Ok(CircuitPermit { epoch: circuit.epoch, trial: true })
            },
            CircuitPhase::HalfOpen => {
                if circuit.trial_in_flight {
                    Err(TRIAL_BUSY_RETRY.min(self.config.cooldown).max(Duration::from_millis(1)))
                } else {
                    circuit.trial_in_flight = true;
                    Ok(CircuitPermit { epoch: circuit.epoch, trial: true })
                }
            },
        }
    }

    /// Circuit for `key` if `permit` still belongs to it.
    fn current<'a>(
        circuits: &'a mut HashMap<String, KeyCircuit>,
        key: &str,
        permit: CircuitPermit,
    ) -> Option<&'a mut KeyCircuit> {
        match circuits.get_mut(key) {
            Some(circuit) if circuit.epoch == permit.epoch => Some(circuit),
            _ => {
                debug!(
                    key = %key,
                    epoch = permit.epoch,
                    "Ignoring outcome from a previous circuit epoch"
                );
                None
            },
        }
    }

    pub fn record_success(&self, key: &str, permit: CircuitPermit) {
        let mut circuits = self.circuits.write();
        let Some(circuit) = Self::current(&mut circuits, key, permit) else {
            return;
        };

        match circuit.phase {
            CircuitPhase::Closed => {
                circuit.consecutive_failures = 0;
            },
            CircuitPhase::HalfOpen if permit.trial => {
                info!(key = %key, "Circuit breaker closing - trial call succeeded");
                *circuit = KeyCircuit::closed(circuit.epoch);
                Self::log_transition(
                    key,
                    CircuitPhase::HalfOpen,
                    CircuitPhase::Closed,
                    Some("Path recovered"),
                );
            },
            CircuitPhase::HalfOpen | CircuitPhase::Open => {
                debug!(key = %key, phase = ?circuit.phase, "Ignoring non-trial success");
            },
        }
    }

    pub fn record_failure(&self, key: &str, permit: CircuitPermit, reason: &str) {
        let now = self.clock.now();
        let mut circuits = self.circuits.write();
        let Some(circuit) = Self::current(&mut circuits, key, permit) else {
            return;
        };

        let previous = circuit.phase;
        match previous {
            CircuitPhase::Closed => {
                circuit.consecutive_failures = circuit.consecutive_failures.saturating_add(1);
                circuit.last_failure_reason = Some(reason.to_string());
                if circuit.consecutive_failures >= self.config.failure_threshold {
                    warn!(
                        key = %key,
                        failures = circuit.consecutive_failures,
                        reason = %reason,
                        "Circuit breaker opening - too many failures"
                    );
                    self.trip(circuit, now);
                    Self::log_transition(key, previous, CircuitPhase::Open, Some(reason));
                }
            },
            CircuitPhase::HalfOpen if permit.trial => {
                circuit.consecutive_failures = circuit.consecutive_failures.saturating_add(1);
                circuit.last_failure_reason = Some(reason.to_string());
                warn!(
                    key = %key,
                    reason = %reason,
                    "Circuit breaker re-opening - trial call failed"
                );
                self.trip(circuit, now);
                Self::log_transition(key, previous, CircuitPhase::Open, Some(reason));
            },
            CircuitPhase::HalfOpen | CircuitPhase::Open => {
                debug!(key = %key, phase = ?previous, "Ignoring non-trial failure");
            },
        }
    }

    /// Release a trial slot without judging the path.
    ///
    /// Used for outcomes that say nothing about the network path, such as
    /// configuration errors or a cancelled call.
    pub fn record_neutral(&self, key: &str, permit: CircuitPermit) {
        let mut circuits = self.circuits.write();
        if let Some(circuit) = Self::current(&mut circuits, key, permit) {
            if permit.trial && circuit.phase == CircuitPhase::HalfOpen {
                circuit.trial_in_flight = false;
            }
        }
    }

    /// Open the circuit under a new epoch so in-flight permits go stale.
    fn trip(&self, circuit: &mut KeyCircuit, now: Instant) {
        circuit.phase = CircuitPhase::Open;
        circuit.epoch = self.fresh_epoch();
        circuit.opened_at = Some(now);
        circuit.trial_in_flight = false;
        self.total_trips.fetch_add(1, Ordering::Relaxed);
        prometheus::record_circuit_trip();
    }

    /// Run `call` under the circuit for `key`.
    ///
    /// Only [`InvokeError::is_path_failure`] outcomes count as failures; a
    /// decode error means the path worked and counts as success.
    pub async fn call<T, F>(&self, key: &str, call: F) -> Result<T, InvokeError>
    where
        F: Future<Output = Result<T, InvokeError>>,
    {
        let permit = match self.should_allow(key) {
            Ok(permit) => permit,
            Err(wait) => {
                prometheus::record_rejection("breaker_open");
                return Err(InvokeError::BreakerOpen {
                    key: key.to_string(),
                    retry_after_ms: (wait.as_millis() as u64).max(1),
                });
            },
        };

        let mut guard = PermitGuard { manager: self, key, permit, armed: true };
        let result = call.await;
        guard.armed = false;

        match &result {
            Ok(_) | Err(InvokeError::Decode(_)) => self.record_success(key, permit),
            Err(e) if e.is_path_failure() => self.record_failure(key, permit, &e.to_string()),
            Err(_) => self.record_neutral(key, permit),
        }
        result
    }

    fn log_transition(key: &str, previous: CircuitPhase, next: CircuitPhase, reason: Option<&str>) {
        info!(
            "Circuit breaker state change: {} {:?} -> {:?} (reason: {:?})",
            key, previous, next, reason
        );
    }

    pub fn state(&self, key: &str) -> CircuitPhase {
        let circuits = self.circuits.read();
        circuits.get(key).map_or(CircuitPhase::Closed, |c| c.phase)
    }

    pub fn total_trips(&self) -> u64 {
        self.total_trips.load(Ordering::Relaxed)
    }

    pub fn reset(&self, key: &str) {
        let mut circuits = self.circuits.write();
        if let Some(circuit) = circuits.get_mut(key) {
            let previous = circuit.phase;
            info!(key = %key, previous_phase = ?previous, "Circuit breaker reset manually");
            if previous != CircuitPhase::Closed {
                Self::log_transition(key, previous, CircuitPhase::Closed, Some("Manual reset"));
            }
            *circuit = KeyCircuit::closed(self.fresh_epoch());
        }
    }

    pub fn summary(&self) -> CircuitBreakerSummary {
        let circuits = self.circuits.read();
        let mut closed = 0;
        let mut open = 0;
        let mut half_open = 0;

        for circuit in circuits.values() {
            match circuit.phase {
                CircuitPhase::Closed => closed += 1,
                CircuitPhase::Open => open += 1,
                CircuitPhase::HalfOpen => half_open += 1,
            }
        }

        CircuitBreakerSummary { closed, open, half_open, total_trips: self.total_trips() }
    }

    /// Forget closed circuits with no failures on record.
    ///
    /// Returns how many were removed. Permits issued for a removed circuit go
    /// stale, so their outcomes are ignored.
    pub fn cleanup_idle(&self) -> usize {
        let mut circuits = self.circuits.write();
        let before = circuits.len();
        circuits.retain(|_, circuit| !circuit.is_idle());
        let removed = before - circuits.len();
        if removed > 0 {
            debug!(removed, remaining = circuits.len(), "Cleaned up idle circuits");
        }
        removed
    }

    pub fn tracked_keys(&self) -> usize {
        self.circuits.read().len()
    }

    /// Every tracked circuit, sorted by key.
    pub fn snapshot(&self) -> Vec<CircuitSnapshot> {
        let now = self.clock.now();
        let circuits = self.circuits.read();
        let mut snapshots: Vec<CircuitSnapshot> = circuits
            .iter()
            .map(|(key, circuit)| CircuitSnapshot {
                key: key.clone(),
                phase: circuit.phase,
                consecutive_failures: circuit.consecutive_failures,
                retry_after_ms: match (circuit.phase, circuit.opened_at) {
                    (CircuitPhase::Open, Some(opened_at)) => Some(
                        self.config.cooldown.saturating_sub(now.saturating_duration_since(opened_at))
                            .as_millis() as u64,
                    ),
                    _ => None,
                },
                last_failure_reason: circuit.last_failure_reason.clone(),
            })
            .collect();
        snapshots.sort_by(|a, b| a.key.cmp(&b.key));
        snapshots
    }
}

/// Frees the half-open trial slot if the wrapped call is dropped mid-flight.
struct PermitGuard<'a> {
    manager: &'a CircuitBreakerManager,
    key: &'a str,
    permit: CircuitPermit,
    armed: bool,
}

impl Drop for PermitGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.manager.record_neutral(self.key, self.permit);
        }
    }
}

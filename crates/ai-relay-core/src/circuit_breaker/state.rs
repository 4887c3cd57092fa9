//! Circuit breaker state types and configuration

use serde::Serialize;
use std::time::{Duration, Instant};

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// How long the circuit stays open before allowing a trial call
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 5, cooldown: Duration::from_secs(30) }
    }
}

/// Phase of one circuit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitPhase {
    /// Calls pass through
    Closed,
    /// Calls fail fast until the cooldown elapses
    Open,
    /// One trial call decides between closed and open
    HalfOpen,
}

/// Admission handed out by `should_allow`; outcomes are reported with it.
///
/// Outcomes carrying an epoch other than the circuit's current one are
/// ignored, and only the trial permit may settle a half-open circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitPermit {
    pub(crate) epoch: u64,
    pub(crate) trial: bool,
}

impl CircuitPermit {
    pub fn is_trial(&self) -> bool {
        self.trial
    }
}

/// Per-key circuit state
#[derive(Debug)]
pub(crate) struct KeyCircuit {
    pub phase: CircuitPhase,
    /// Changes on every trip and reset; unique across the manager
    pub epoch: u64,
    pub consecutive_failures: u32,
    pub opened_at: Option<Instant>,
    /// Set while the single half-open trial is running
    pub trial_in_flight: bool,
    pub last_failure_reason: Option<String>,
}

impl KeyCircuit {
    pub fn closed(epoch: u64) -> Self {
        Self {
            phase: CircuitPhase::Closed,
            epoch,
            consecutive_failures: 0,
            opened_at: None,
            trial_in_flight: false,
            last_failure_reason: None,
        }
    }

    /// Closed with no failures on record; safe to forget.
    pub fn is_idle(&self) -> bool {
        self.phase == CircuitPhase::Closed && self.consecutive_failures == 0
    }
}

/// Counts of circuits per phase across all keys
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerSummary {
    pub closed: usize,
    pub open: usize,
    pub half_open: usize,
    pub total_trips: u64,
}

/// Reportable view of one circuit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitSnapshot {
    pub key: String,
    pub phase: CircuitPhase,
    pub consecutive_failures: u32,
    /// Remaining cooldown while open
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure_reason: Option<String>,
}

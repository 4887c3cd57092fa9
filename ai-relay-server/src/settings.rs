//! Daemon settings read from the environment at startup.
//!
//! Provider configuration is not read here: it is resolved per call through
//! the core config source so edits to the environment take effect without
//! a restart.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

use ai_relay_core::rate_limit::RateLimitPolicy;
use ai_relay_core::telemetry::DEFAULT_CAPACITY;
use ai_relay_core::CircuitBreakerConfig;

pub const ENV_PORT: &str = "AI_RELAY_PORT";
pub const ENV_RATE_LIMIT_CAPACITY: &str = "AI_RATE_LIMIT_CAPACITY";
pub const ENV_RATE_LIMIT_REFILL: &str = "AI_RATE_LIMIT_REFILL_PER_SEC";
pub const ENV_BREAKER_THRESHOLD: &str = "AI_BREAKER_THRESHOLD";
pub const ENV_BREAKER_COOLDOWN_MS: &str = "AI_BREAKER_COOLDOWN_MS";
pub const ENV_TELEMETRY_CAPACITY: &str = "AI_TELEMETRY_CAPACITY";
/// Comma-separated route labels accepted by `/api/ai/invoke`; unset accepts any.
pub const ENV_ALLOWED_LABELS: &str = "AI_ALLOWED_LABELS";

const DEFAULT_PORT: u16 = 8046;

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub port: u16,
    pub rate_limit: RateLimitPolicy,
    pub breaker: CircuitBreakerConfig,
    pub telemetry_capacity: usize,
    pub allowed_labels: Option<HashSet<String>>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            rate_limit: RateLimitPolicy::default(),
            breaker: CircuitBreakerConfig::default(),
            telemetry_capacity: DEFAULT_CAPACITY,
            allowed_labels: None,
        }
    }
}

impl ServerSettings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let read = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let capacity = parse_or(
            read(ENV_RATE_LIMIT_CAPACITY),
            ENV_RATE_LIMIT_CAPACITY,
            defaults.rate_limit.capacity,
        )?;
        let refill_per_sec = parse_or(
            read(ENV_RATE_LIMIT_REFILL),
            ENV_RATE_LIMIT_REFILL,
            defaults.rate_limit.refill_per_sec,
        )?;
        if capacity == 0 {
            anyhow::bail!("{} must be at least 1", ENV_RATE_LIMIT_CAPACITY);
        }
        if !refill_per_sec.is_finite() || refill_per_sec < 0.0 {
            anyhow::bail!("{} must be a non-negative number", ENV_RATE_LIMIT_REFILL);
        }

        let failure_threshold = parse_or(
            read(ENV_BREAKER_THRESHOLD),
            ENV_BREAKER_THRESHOLD,
            defaults.breaker.failure_threshold,
        )?;
        if failure_threshold == 0 {
            anyhow::bail!("{} must be at least 1", ENV_BREAKER_THRESHOLD);
        }
        let cooldown_ms = parse_or(
            read(ENV_BREAKER_COOLDOWN_MS),
            ENV_BREAKER_COOLDOWN_MS,
            defaults.breaker.cooldown.as_millis() as u64,
        )?;

        Ok(Self {
            port: parse_or(read(ENV_PORT), ENV_PORT, defaults.port)?,
            rate_limit: RateLimitPolicy::new("default", capacity, refill_per_sec),
            breaker: CircuitBreakerConfig {
                failure_threshold,
                cooldown: Duration::from_millis(cooldown_ms),
            },
            telemetry_capacity: parse_or(
                read(ENV_TELEMETRY_CAPACITY),
                ENV_TELEMETRY_CAPACITY,
                defaults.telemetry_capacity,
            )?
            .max(1),
            allowed_labels: read(ENV_ALLOWED_LABELS).map(|raw| parse_labels(&raw)),
        })
    }
}

fn parse_labels(raw: &str) -> HashSet<String> {
    raw.split(',').map(str::trim).filter(|l| !l.is_empty()).map(str::to_string).collect()
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(value) => value.parse().with_context(|| format!("Invalid {}: '{}'", key, value)),
        None => Ok(default),
    }
}

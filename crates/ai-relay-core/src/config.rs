//! Configuration resolution.
//!
//! The relay never owns its configuration long-term: every call asks a
//! [`ConfigSource`] for a fresh snapshot. Sources can be fixed, read from the
//! environment, or wrapped in a short-TTL cache.

use ai_relay_types::{ConfigError, RelayConfig};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::clock::Clock;

pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_BASE_URL: &str = "OPENAI_BASE_URL";
pub const ENV_TIMEOUT_MS: &str = "AI_TIMEOUT_MS";
pub const ENV_MAX_RETRIES: &str = "AI_MAX_RETRIES";
pub const ENV_MODEL: &str = "AI_MODEL";
pub const ENV_TEMPERATURE: &str = "AI_TEMPERATURE";
pub const ENV_MAX_TOKENS: &str = "AI_MAX_TOKENS";
pub const ENV_PROXY_URL: &str = "AI_PROXY_URL";
pub const ENV_PROXY_HEALTH_CHECK: &str = "AI_PROXY_HEALTH_CHECK";

pub const DEFAULT_CONFIG_TTL: Duration = Duration::from_secs(5);

/// Supplies an immutable configuration snapshot per call.
pub trait ConfigSource: Send + Sync {
    fn snapshot(&self) -> Result<RelayConfig, ConfigError>;
}

/// Holds one validated snapshot; `replace` swaps it atomically.
pub struct StaticConfigSource {
    config: RwLock<RelayConfig>,
}

impl StaticConfigSource {
    pub fn new(config: RelayConfig) -> Result<Self, ConfigError> {
        Ok(Self { config: RwLock::new(config.validated()?) })
    }

    pub fn replace(&self, config: RelayConfig) -> Result<(), ConfigError> {
        let config = config.validated()?;
        *self.config.write() = config;
        Ok(())
    }
}

impl ConfigSource for StaticConfigSource {
    fn snapshot(&self) -> Result<RelayConfig, ConfigError> {
        Ok(self.config.read().clone())
    }
}

/// Reads the process environment on every snapshot.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvConfigSource;

impl EnvConfigSource {
    /// Build a config from any key lookup (the environment in production).
    pub fn from_lookup<F>(lookup: F) -> Result<RelayConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = RelayConfig::default();

        let credential = read(ENV_API_KEY)
            .ok_or_else(|| ConfigError::Missing { field: ENV_API_KEY.to_string() })?;

        let config = RelayConfig {
            credential,
            base_address: read(ENV_BASE_URL).unwrap_or(defaults.base_address),
            timeout_ms: parse_or(read(ENV_TIMEOUT_MS), ENV_TIMEOUT_MS, defaults.timeout_ms)?,
            max_retries: parse_or(read(ENV_MAX_RETRIES), ENV_MAX_RETRIES, defaults.max_retries)?,
            default_model: read(ENV_MODEL).unwrap_or(defaults.default_model),
            default_temperature: parse_or(
                read(ENV_TEMPERATURE),
                ENV_TEMPERATURE,
                defaults.default_temperature,
            )?,
            default_max_tokens: parse_or(
                read(ENV_MAX_TOKENS),
                ENV_MAX_TOKENS,
                defaults.default_max_tokens,
            )?,
            proxy_address: read(ENV_PROXY_URL),
            health_check_enabled: match read(ENV_PROXY_HEALTH_CHECK) {
                Some(raw) => parse_flag(&raw, ENV_PROXY_HEALTH_CHECK)?,
                None => defaults.health_check_enabled,
            },
        };

        config.validated()
    }
}

impl ConfigSource for EnvConfigSource {
    fn snapshot(&self) -> Result<RelayConfig, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

fn parse_or<T>(raw: Option<String>, field: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::parse(field, e.to_string())),
        None => Ok(default),
    }
}

fn parse_flag(raw: &str, field: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::parse(field, format!("expected a boolean, got '{}'", other))),
    }
}

/// Caches another source's snapshot for a short TTL.
///
/// Errors are never cached, so a fixed environment is picked up on the next call.
pub struct CachedConfigSource<S> {
    inner: S,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    cached: RwLock<Option<(Instant, RelayConfig)>>,
}

impl<S: ConfigSource> CachedConfigSource<S> {
    pub fn new(inner: S, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { inner, ttl, clock, cached: RwLock::new(None) }
    }

    pub fn invalidate(&self) {
        *self.cached.write() = None;
    }
}

impl<S: ConfigSource> ConfigSource for CachedConfigSource<S> {
    fn snapshot(&self) -> Result<RelayConfig, ConfigError> {
        let now = self.clock.now();
        if let Some((loaded_at, config)) = self.cached.read().as_ref() {
            if now.saturating_duration_since(*loaded_at) < self.ttl {
                return Ok(config.clone());
            }
        }

        let config = self.inner.snapshot()?;
        *self.cached.write() = Some((now, config.clone()));
        Ok(config)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_defaults() {
        let config = EnvConfigSource::from_lookup(lookup(&[(ENV_API_KEY, "sk-live")])).unwrap();
        assert_eq!(config.credential, "sk-live");
        assert_eq!(config.base_address, "https://api.openai.com/v1");
        assert_eq!(config.proxy_address, None);
        assert!(config.health_check_enabled);
    }

    #[test]
    fn test_env_full() {
        let config = EnvConfigSource::from_lookup(lookup(&[
            (ENV_API_KEY, "sk-live"),
            (ENV_BASE_URL, "http://localhost:9000/v1/"),
            (ENV_TIMEOUT_MS, "1500"),
            (ENV_MAX_RETRIES, "2"),
            (ENV_MODEL, "gpt-4o"),
            (ENV_TEMPERATURE, "0.3"),
            (ENV_MAX_TOKENS, "512"),
            (ENV_PROXY_URL, "127.0.0.1:7890"),
            (ENV_PROXY_HEALTH_CHECK, "off"),
        ]))
        .unwrap();

        assert_eq!(config.base_address, "http://localhost:9000/v1");
        assert_eq!(config.timeout_ms, 1500);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.default_model, "gpt-4o");
        assert_eq!(config.default_max_tokens, 512);
        assert_eq!(config.proxy_address.as_deref(), Some("http://127.0.0.1:7890"));
        assert!(!config.health_check_enabled);
    }

    #[test]
    fn test_env_missing_credential() {
        let err = EnvConfigSource::from_lookup(lookup(&[(ENV_API_KEY, "   ")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing { field: ENV_API_KEY.to_string() });
    }

    #[test]
    fn test_env_bad_number_is_an_error() {
        let err = EnvConfigSource::from_lookup(lookup(&[
            (ENV_API_KEY, "sk-live"),
            (ENV_TIMEOUT_MS, "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { ref field, .. } if field == ENV_TIMEOUT_MS));
    }

    struct CountingSource {
        calls: AtomicUsize,
    }

    impl ConfigSource for CountingSource {
        fn snapshot(&self) -> Result<RelayConfig, ConfigError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            RelayConfig { credential: "sk".to_string(), ..Default::default() }.validated()
        }
    }

    #[test]
    fn test_cached_source_respects_ttl() {
        let clock = Arc::new(ManualClock::new());
        let cached = CachedConfigSource::new(
            CountingSource { calls: AtomicUsize::new(0) },
            Duration::from_secs(5),
            clock.clone(),
        );

        cached.snapshot().unwrap();
        cached.snapshot().unwrap();
        assert_eq!(cached.inner.calls.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_secs(5));
        cached.snapshot().unwrap();
        assert_eq!(cached.inner.calls.load(Ordering::SeqCst), 2);

        cached.invalidate();
        cached.snapshot().unwrap();
        assert_eq!(cached.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_static_source_replace_validates() {
        let source =
            StaticConfigSource::new(RelayConfig { credential: "sk".to_string(), ..Default::default() })
                .unwrap();
        assert!(source.replace(RelayConfig::default()).is_err());
        assert_eq!(source.snapshot().unwrap().credential, "sk");
    }
}

//! Admission gate: one token bucket per caller key.
//!
//! Runs before any invocation work, so local overload never shows up in
//! breaker accounting or telemetry.

mod bucket;


pub use bucket::TokenBucket;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::clock::{Clock, SystemClock};

/// Tracked keys above which an admission also sweeps idle buckets.
const CLEANUP_THRESHOLD: usize = 10_000;

/// Capacity and refill rate shared by every key under one name.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitPolicy {
    pub name: String,
    pub capacity: u32,
    pub refill_per_sec: f64,
}

impl RateLimitPolicy {
    pub fn new(name: impl Into<String>, capacity: u32, refill_per_sec: f64) -> Self {
        Self { name: name.into(), capacity, refill_per_sec }
    }

    /// `requests` per `period`, starting with a full burst of `requests`.
    pub fn per_period(name: impl Into<String>, requests: u32, period: Duration) -> Self {
        let secs = period.as_secs_f64();
        let refill = if secs > 0.0 { f64::from(requests) / secs } else { f64::from(requests) };
        Self::new(name, requests, refill)
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::per_period("default", 30, Duration::from_secs(60))
    }
}

/// Result of one admission check.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Admission {
    pub allowed: bool,
    /// Whole tokens left after this check
    pub remaining: u32,
    /// When the bucket will be full again
    pub reset_at: DateTime<Utc>,
    /// Wait before a retry can succeed, set only when rejected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

pub struct RateLimiter {
    default_policy: RateLimitPolicy,
    policies: HashMap<String, RateLimitPolicy>,
    buckets: DashMap<String, TokenBucket>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(default_policy: RateLimitPolicy) -> Self {
        Self::with_clock(default_policy, Arc::new(SystemClock))
    }

    pub fn with_clock(default_policy: RateLimitPolicy, clock: Arc<dyn Clock>) -> Self {
        Self { default_policy, policies: HashMap::new(), buckets: DashMap::new(), clock }
    }

    /// Register a named policy for use with [`admit_with`](Self::admit_with).
    #[must_use]
    pub fn with_policy(mut self, policy: RateLimitPolicy) -> Self {
        self.policies.insert(policy.name.clone(), policy);
        self
    }

    pub fn policy(&self, name: &str) -> &RateLimitPolicy {
        self.policies.get(name).unwrap_or(&self.default_policy)
    }

    pub fn default_policy(&self) -> &RateLimitPolicy {
        &self.default_policy
    }

    /// Admit `key` under the default policy.
    pub fn admit(&self, key: &str) -> Admission {
        self.check(&self.default_policy, key)
    }

    /// Admit `key` under the named policy; unknown names fall back to the default.
    pub fn admit_with(&self, policy: &str, key: &str) -> Admission {
        self.check(self.policy(policy), key)
    }

    fn check(&self, policy: &RateLimitPolicy, key: &str) -> Admission {
        if self.buckets.len() > CLEANUP_THRESHOLD {
            self.cleanup_idle();
        }

        let now = self.clock.now();
        let wall = self.clock.wall();
        let bucket_key = format!("{}:{}", policy.name, key);

        // The entry guard holds the shard lock, so take-and-read is atomic per key.
        let mut bucket = self
            .buckets
            .entry(bucket_key)
            .or_insert_with(|| TokenBucket::new(policy.capacity, policy.refill_per_sec, now));

        let allowed = bucket.try_take(now);
        let reset_at = wall + to_chrono(bucket.time_until_full());
        let retry_after_ms =
            (!allowed).then(|| bucket.time_until_next().as_millis().max(1) as u64);
        let remaining = bucket.remaining();
        drop(bucket);

        if !allowed {
            debug!(
                policy = %policy.name,
                key = %key,
                retry_after_ms = retry_after_ms.unwrap_or(0),
                "Rate limit rejected admission"
            );
        }

        Admission { allowed, remaining, reset_at, retry_after_ms }
    }

    /// Drop buckets that have refilled completely; they carry no state.
    pub fn cleanup_idle(&self) -> usize {
        let now = self.clock.now();
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| {
            bucket.refill(now);
            !bucket.is_full()
        });
        let removed = before.saturating_sub(self.buckets.len());
        if removed > 0 {
            debug!(removed, "Removed idle rate limit buckets");
        }
        removed
    }

    pub fn tracked_keys(&self) -> usize {
        self.buckets.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitPolicy::default())
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero())
}

//! Token bucket state for one admission key.

use std::time::{Duration, Instant};

/// Waits longer than this are reported as this (zero refill rate).
const MAX_WAIT: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// A full bucket.
    pub fn new(capacity: u32, refill_per_sec: f64, now: Instant) -> Self {
        let capacity = f64::from(capacity);
        Self {
            tokens: capacity,
            capacity,
            refill_per_sec: if refill_per_sec.is_finite() { refill_per_sec.max(0.0) } else { 0.0 },
            last_refill: now,
        }
    }

    /// Add tokens for the time elapsed since the last refill.
    pub fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
            self.last_refill = now;
        }
    }

    /// Take one token if available.
    pub fn try_take(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Whole tokens left.
    pub fn remaining(&self) -> u32 {
        self.tokens.floor().max(0.0) as u32
    }

    /// Time until at least one token is available.
    pub fn time_until_next(&self) -> Duration {
        self.time_until(1.0)
    }

    /// Time until the bucket is full again.
    pub fn time_until_full(&self) -> Duration {
        self.time_until(self.capacity)
    }

    pub fn is_full(&self) -> bool {
        self.tokens >= self.capacity
    }

    fn time_until(&self, target: f64) -> Duration {
        let missing = target - self.tokens;
        if missing <= 0.0 {
            return Duration::ZERO;
        }
        if self.refill_per_sec <= 0.0 {
            return MAX_WAIT;
        }
        let secs = missing / self.refill_per_sec;
        if !secs.is_finite() || secs >= MAX_WAIT.as_secs_f64() {
            MAX_WAIT
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

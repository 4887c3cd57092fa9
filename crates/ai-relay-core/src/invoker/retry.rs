//! Backoff between retries of the same variant.

use rand::Rng;
use std::time::Duration;

/// Exponential backoff with optional jitter.
///
/// Only used for retries within one variant; switching variants never waits.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Scale each delay by a random factor in `[0.5, 1.0]`
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(4),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Policy with no delay at all, for tests and latency-critical callers.
    pub fn immediate() -> Self {
        Self { initial_delay: Duration::ZERO, max_delay: Duration::ZERO, multiplier: 1.0, jitter: false }
    }

    /// Delay before retry number `retry` (0-indexed).
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());
        if !capped.is_finite() || capped <= 0.0 {
            return Duration::ZERO;
        }

        if self.jitter {
            let factor: f64 = rand::thread_rng().gen_range(0.5..=1.0);
            Duration::from_secs_f64(capped * factor)
        } else {
            Duration::from_secs_f64(capped)
        }
    }
}

//! Time source shared by every time-based component.
//!
//! Debounce windows, breaker cooldowns and bucket refills all read time
//! through [`Clock`], so tests drive them with [`ManualClock`] instead of
//! sleeping.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::time::{Duration, Instant};

pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Monotonic time, for measuring intervals.
    fn now(&self) -> Instant;
    /// Wall-clock time, for timestamps reported to callers.
    fn wall(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    wall_origin: DateTime<Utc>,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self { origin: Instant::now(), wall_origin: Utc::now(), offset: Mutex::new(Duration::ZERO) }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock();
        *offset = offset.saturating_add(by);
    }

    pub fn elapsed(&self) -> Duration {
        *self.offset.lock()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = *self.offset.lock();
        self.origin.checked_add(offset).unwrap_or(self.origin)
    }

    fn wall(&self) -> DateTime<Utc> {
        let offset = *self.offset.lock();
        let delta = chrono::Duration::from_std(offset).unwrap_or_else(|_| chrono::Duration::zero());
        self.wall_origin + delta
    }
}

/// Milliseconds between `start` and the clock's current instant.
pub(crate) fn elapsed_ms(clock: &dyn Clock, start: Instant) -> u64 {
    clock.now().saturating_duration_since(start).as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_moves_both_timelines() {
        let clock = ManualClock::new();
        let start = clock.now();
        let wall_start = clock.wall();

        clock.advance(Duration::from_millis(1500));

        assert_eq!(clock.now().duration_since(start), Duration::from_millis(1500));
        assert_eq!((clock.wall() - wall_start).num_milliseconds(), 1500);
        assert_eq!(elapsed_ms(&clock, start), 1500);
    }
}

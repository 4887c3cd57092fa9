//! In-memory telemetry for relay calls.
//!
//! Events land in a bounded FIFO ring; summaries are recomputed from whatever
//! the ring currently holds. Nothing survives a restart.


use ai_relay_types::{
    FallbackPath, LatencyPercentiles, SummaryEnvelope, SummaryMeta, TelemetryEvent,
    TelemetrySummary,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};

pub const DEFAULT_CAPACITY: usize = 500;

/// Receiver of completed-call events. `emit` must not block.
pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: TelemetryEvent);
}

/// Bounded ring of recent events plus the read-only summary surface.
pub struct TelemetryAggregator {
    events: Mutex<VecDeque<TelemetryEvent>>,
    capacity: usize,
    clock: Arc<dyn Clock>,
    total_emitted: AtomicU64,
}

impl TelemetryAggregator {
    pub fn new(capacity: usize) -> Self {
        Self::with_clock(capacity, Arc::new(SystemClock))
    }

    pub fn with_clock(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            clock,
            total_emitted: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Events emitted since creation, including evicted ones.
    pub fn total_emitted(&self) -> u64 {
        self.total_emitted.load(Ordering::Relaxed)
    }

    /// Aggregates over the buffered events.
    pub fn summary(&self) -> TelemetrySummary {
        let events = self.events.lock();
        let total_calls = events.len();
        if total_calls == 0 {
            return TelemetrySummary::default();
        }

        let mut success_count = 0;
        let mut fallback_count = 0;
        let mut total_tokens = 0;
        let mut total_backoff_ms = 0;
        let mut calls_by_label = BTreeMap::new();
        let mut durations = Vec::with_capacity(total_calls);

        for event in events.iter() {
            if event.success {
                success_count += 1;
            }
            if event.fallback_path != FallbackPath::None {
                fallback_count += 1;
            }
            total_tokens += event.usage.total_tokens;
            total_backoff_ms += event.total_backoff_ms;
            *calls_by_label.entry(event.label.clone()).or_insert(0) += 1;
            durations.push(event.duration_ms);
        }
        durations.sort_unstable();

        TelemetrySummary {
            total_calls,
            success_count,
            failure_count: total_calls - success_count,
            success_rate: success_count as f64 / total_calls as f64,
            fallback_rate: fallback_count as f64 / total_calls as f64,
            latency_ms: percentiles(&durations),
            total_tokens,
            total_backoff_ms,
            calls_by_label,
            last_call: events.back().cloned(),
        }
    }

    /// Summary wrapped for the reporting endpoint.
    pub fn envelope(&self) -> SummaryEnvelope {
        SummaryEnvelope { data: self.summary(), meta: SummaryMeta { generated_at: self.clock.wall() } }
    }

    /// Up to `limit` events, newest first.
    pub fn recent(&self, limit: usize) -> Vec<TelemetryEvent> {
        self.events.lock().iter().rev().take(limit).cloned().collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Default for TelemetryAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl TelemetrySink for TelemetryAggregator {
    fn emit(&self, event: TelemetryEvent) {
        self.total_emitted.fetch_add(1, Ordering::Relaxed);
        let mut events = self.events.lock();
        if events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }
}

/// Nearest-rank percentiles over an ascending slice.
fn percentiles(sorted: &[u64]) -> LatencyPercentiles {
    LatencyPercentiles {
        p50: nearest_rank(sorted, 50),
        p90: nearest_rank(sorted, 90),
        p95: nearest_rank(sorted, 95),
        p99: nearest_rank(sorted, 99),
        max: sorted.last().copied().unwrap_or(0),
    }
}

fn nearest_rank(sorted: &[u64], percentile: usize) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = (percentile * sorted.len()).div_ceil(100).max(1);
    sorted[rank.min(sorted.len()) - 1]
}

//! Lock-free aggregate counters
//!
//! Workers add to the counters with `fetch_add`; the stats reporter drains
//! them with `swap(0)` so an increment racing with a drain lands either in
//! this interval or the next, never in both and never in neither.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Shared success/failure/byte tallies for one run
#[derive(Debug, Default)]
pub struct AggregateCounters {
    successes: AtomicU64,
    failures: AtomicU64,
    bytes: AtomicU64,
    latency_nanos: AtomicU64,
}

/// Values displaced from the counters by one drain, or a running total
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub successes: u64,
    pub failures: u64,
    pub bytes: u64,
    /// Summed latency of successful items, in nanoseconds
    pub latency_nanos: u64,
}

impl AggregateCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one successful work item
    pub fn record_success(&self, bytes: u64, latency: Duration) {
        self.successes.fetch_add(1, Ordering::Relaxed);
        if bytes > 0 {
            self.bytes.fetch_add(bytes, Ordering::Relaxed);
        }
        let nanos = u64::try_from(latency.as_nanos()).unwrap_or(u64::MAX);
        self.latency_nanos.fetch_add(nanos, Ordering::Relaxed);
    }

    /// Record one failed work item
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Add bytes outside of a success, e.g. partial writes before an error
    pub fn add_bytes(&self, bytes: u64) {
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Read-and-clear every counter.
    ///
    /// Each field is swapped on its own, so a success racing the drain may
    /// land its count in one snapshot and its latency in the next. Totals
    /// are exact; a single interval's `average_latency` can be slightly off.
    pub fn drain(&self) -> CounterSnapshot {
        CounterSnapshot {
            successes: self.successes.swap(0, Ordering::AcqRel),
            failures: self.failures.swap(0, Ordering::AcqRel),
            bytes: self.bytes.swap(0, Ordering::AcqRel),
            latency_nanos: self.latency_nanos.swap(0, Ordering::AcqRel),
        }
    }

    /// Read the undrained values without clearing them
    pub fn peek(&self) -> CounterSnapshot {
        CounterSnapshot {
            successes: self.successes.load(Ordering::Acquire),
            failures: self.failures.load(Ordering::Acquire),
            bytes: self.bytes.load(Ordering::Acquire),
            latency_nanos: self.latency_nanos.load(Ordering::Acquire),
        }
    }
}

impl CounterSnapshot {
    /// Completed attempts, successful or not
    pub fn attempts(&self) -> u64 {
        self.successes + self.failures
    }

    /// Fold another delta into this running total
    pub fn absorb(&mut self, delta: &CounterSnapshot) {
        self.successes = self.successes.saturating_add(delta.successes);
        self.failures = self.failures.saturating_add(delta.failures);
        self.bytes = self.bytes.saturating_add(delta.bytes);
        self.latency_nanos = self.latency_nanos.saturating_add(delta.latency_nanos);
    }

    /// Mean latency of the successes in this snapshot; exact for running
    /// totals, approximate for a single drained interval
    pub fn average_latency(&self) -> Option<Duration> {
        if self.successes == 0 {
            None
        } else {
            Some(Duration::from_nanos(self.latency_nanos / self.successes))
        }
    }

    pub fn is_empty(&self) -> bool {
        self.attempts() == 0 && self.bytes == 0
    }
}

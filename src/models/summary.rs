//! Run summary data models
//!
//! Contains the per-interval stats line emitted by the reporter and the
//! final summary of a run, both serializable for sinks and history.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bench::{CancelReason, CounterSnapshot};
use crate::config::{RunConfig, WorkMode};
use crate::util::units::{calculate_rate, format_bytes, format_duration, format_latency, format_rate};

/// One reporter sample: the delta drained this interval plus running totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalStats {
    /// 1-based interval index
    pub index: u64,
    /// Time since the run started
    #[serde(with = "duration_serde")]
    pub elapsed: Duration,
    /// Length of the sampled window
    #[serde(with = "duration_serde")]
    pub window: Duration,
    /// Values displaced from the counters by this drain
    pub delta: CounterSnapshot,
    /// Cumulative totals including this delta
    pub totals: CounterSnapshot,
    /// Set on the residual drain taken after all workers joined
    pub final_flush: bool,
}

impl IntervalStats {
    /// Successes per second over this window
    pub fn success_rate(&self) -> f64 {
        calculate_rate(self.delta.successes, self.window)
    }

    /// Failures per second over this window
    pub fn failure_rate(&self) -> f64 {
        calculate_rate(self.delta.failures, self.window)
    }

    /// Single-line rendering used by the console sink
    pub fn display_line(&self) -> String {
        let label = if self.final_flush {
            "final".to_string()
        } else {
            format!("{:>5}", self.index)
        };
        format!(
            "[{}] {:>8}  {:>12} ok  {:>10} fail  total ok {} fail {}  {}",
            label,
            format_duration(self.elapsed),
            format_rate(self.success_rate()),
            format_rate(self.failure_rate()),
            self.totals.successes,
            self.totals.failures,
            format_bytes(self.totals.bytes),
        )
    }
}

/// Final result of one harness run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Timestamp when the run finished
    pub timestamp: DateTime<Utc>,
    /// Target descriptor the run was pointed at
    pub target: String,
    /// Probe used by the workers
    pub mode: WorkMode,
    /// Name reported by the work function
    pub work: String,
    /// Number of workers
    pub concurrency: usize,
    /// Per-worker rate limit, if any
    pub rate_limit: Option<f64>,
    /// Total successful work items
    pub successes: u64,
    /// Total failed work items
    pub failures: u64,
    /// Total bytes reported by the work function
    pub bytes: u64,
    /// Wall time from pool start to join
    #[serde(with = "duration_serde")]
    pub elapsed: Duration,
    /// Successes per second over the whole run
    pub rate: f64,
    /// Mean latency of successful work items
    #[serde(with = "option_duration_serde")]
    pub avg_latency: Option<Duration>,
    /// What ended the run
    pub stop_reason: Option<CancelReason>,
    /// Number of reporter lines emitted, including the final flush
    pub intervals: u64,
}

impl RunSummary {
    /// Build a summary from the final counter totals
    pub fn new(
        config: &RunConfig,
        work: &str,
        totals: CounterSnapshot,
        elapsed: Duration,
        stop_reason: Option<CancelReason>,
        intervals: u64,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            target: config.target.clone(),
            mode: config.mode,
            work: work.to_string(),
            concurrency: config.concurrency,
            rate_limit: config.rate_limit,
            successes: totals.successes,
            failures: totals.failures,
            bytes: totals.bytes,
            elapsed,
            rate: calculate_rate(totals.successes, elapsed),
            avg_latency: totals.average_latency(),
            stop_reason,
            intervals,
        }
    }

    /// Total attempts that completed, successful or not
    pub fn attempts(&self) -> u64 {
        self.successes + self.failures
    }

    /// Fraction of completed attempts that failed (0.0 to 1.0)
    pub fn error_rate(&self) -> f64 {
        if self.attempts() == 0 {
            0.0
        } else {
            self.failures as f64 / self.attempts() as f64
        }
    }

    /// Get a human-readable summary of the run
    pub fn summary(&self) -> String {
        let latency = self
            .avg_latency
            .map(format_latency)
            .unwrap_or_else(|| "n/a".to_string());
        format!(
            "{} - {} {} - {} ok / {} failed in {} - {} - {} avg latency",
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.mode.description(),
            self.target,
            self.successes,
            self.failures,
            format_duration(self.elapsed),
            format_rate(self.rate),
            latency,
        )
    }
}

// Custom serde modules for Duration serialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_nanos() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let nanos = u64::deserialize(deserializer)?;
        Ok(Duration::from_nanos(nanos))
    }
}

mod option_duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.map(|d| d.as_nanos() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let nanos = Option::<u64>::deserialize(deserializer)?;
        Ok(nanos.map(Duration::from_nanos))
    }
}

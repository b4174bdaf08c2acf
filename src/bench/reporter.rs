//! Periodic stats reporter
//!
//! Samples the aggregate counters once per interval and fans each sample out
//! to the configured sinks.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;

use super::cancel::CancellationObserver;
use super::counters::{AggregateCounters, CounterSnapshot};
use crate::models::{IntervalStats, RunSummary};
use crate::Result;

/// Destination for interval lines and the final summary
pub trait StatsSink: Send {
    /// Short name used in log messages
    fn name(&self) -> &str;

    /// Called once per reporter tick and once for the final flush
    fn record(&mut self, stats: &IntervalStats) -> Result<()>;

    /// Called once after the final flush
    fn finish(&mut self, summary: &RunSummary) -> Result<()>;
}

pub struct StatsReporter {
    counters: Arc<AggregateCounters>,
    interval: Duration,
    sinks: Vec<Box<dyn StatsSink>>,
    totals: CounterSnapshot,
    emitted: u64,
    started: Instant,
    last_sample: Instant,
}

impl StatsReporter {
    /// `started` is the run start; the first tick lands one interval later
    pub fn new(
        counters: Arc<AggregateCounters>,
        interval: Duration,
        started: Instant,
        sinks: Vec<Box<dyn StatsSink>>,
    ) -> Self {
        Self {
            counters,
            interval,
            sinks,
            totals: CounterSnapshot::default(),
            emitted: 0,
            started,
            last_sample: started,
        }
    }

    /// Cumulative totals of every drain so far
    pub fn totals(&self) -> CounterSnapshot {
        self.totals
    }

    /// Lines emitted so far, including a final flush
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Tick until cancellation, then hand the reporter back for the flush
    pub async fn run(mut self, cancel: CancellationObserver) -> Self {
        if self.interval.is_zero() {
            cancel.cancelled().await;
            return self;
        }

        let first = tokio::time::Instant::from_std(self.started + self.interval);
        let mut ticker = tokio::time::interval_at(first, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.sample(false);
                }
            }
        }

        tracing::debug!(intervals = self.emitted, "Reporter stopped");
        self
    }

    /// Emit the residual drain taken after every worker has joined
    pub fn flush_residual(&mut self) -> IntervalStats {
        self.sample(true)
    }

    /// Deliver the summary to every sink
    pub fn finish(&mut self, summary: &RunSummary) {
        for sink in &mut self.sinks {
            if let Err(e) = sink.finish(summary) {
                tracing::warn!(sink = sink.name(), error = %e, "Stats sink failed to finish");
            }
        }
    }

    fn sample(&mut self, final_flush: bool) -> IntervalStats {
        let delta = self.counters.drain();
        let now = Instant::now();
        self.totals.absorb(&delta);
        self.emitted += 1;

        let stats = IntervalStats {
            index: self.emitted,
            elapsed: now.duration_since(self.started),
            window: now.duration_since(self.last_sample),
            delta,
            totals: self.totals,
            final_flush,
        };
        self.last_sample = now;

        tracing::trace!(
            index = stats.index,
            successes = delta.successes,
            failures = delta.failures,
            final_flush,
            "Interval sampled"
        );

        for sink in &mut self.sinks {
            if let Err(e) = sink.record(&stats) {
                tracing::warn!(sink = sink.name(), error = %e, "Stats sink failed to record interval");
            }
        }

        stats
    }
}

//! Per-worker iteration pacing

use std::time::{Duration, Instant};

use rand::Rng;

use super::cancel::CancellationObserver;

/// Spaces a worker's iterations at least `1 / rate` seconds apart.
///
/// The wait is measured from the start of the iteration, so slow work items
/// eat into the wait instead of adding to it. Without a rate the pacer never
/// waits and the worker runs open-loop.
#[derive(Debug, Clone)]
pub struct Pacer {
    period: Option<Duration>,
}

impl Pacer {
    /// Build a pacer from an optional ops/sec rate; non-positive,
    /// non-finite or unrepresentably small rates disable pacing.
    pub fn new(rate: Option<f64>) -> Self {
        let period = rate
            .filter(|r| r.is_finite() && *r > 0.0)
            .and_then(|r| Duration::try_from_secs_f64(1.0 / r).ok());
        Self { period }
    }

    pub fn unlimited() -> Self {
        Self { period: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.period.is_some()
    }

    pub fn period(&self) -> Option<Duration> {
        self.period
    }

    /// Time left in the current period, if any
    pub fn remaining(&self, iteration_started: Instant) -> Option<Duration> {
        let period = self.period?;
        let elapsed = iteration_started.elapsed();
        if elapsed >= period {
            None
        } else {
            Some(period - elapsed)
        }
    }

    /// Random start offset in `[0, period)` so paced workers do not all
    /// fire on the same tick
    pub fn start_offset<R: Rng>(&self, rng: &mut R) -> Duration {
        match self.period {
            Some(period) if !period.is_zero() => {
                let nanos = u64::try_from(period.as_nanos()).unwrap_or(u64::MAX);
                Duration::from_nanos(rng.gen_range(0..nanos))
            }
            _ => Duration::ZERO,
        }
    }

    /// Wait out the rest of the period. Returns `false` if cancellation
    /// arrived during the wait.
    pub async fn pace(&self, iteration_started: Instant, cancel: &CancellationObserver) -> bool {
        match self.remaining(iteration_started) {
            Some(wait) => sleep_unless_cancelled(wait, cancel).await,
            None => !cancel.is_cancelled(),
        }
    }
}

impl Default for Pacer {
    fn default() -> Self {
        Self::unlimited()
    }
}

/// Sleep for `wait` unless cancellation fires first; `true` if the full
/// sleep completed
pub(crate) async fn sleep_unless_cancelled(wait: Duration, cancel: &CancellationObserver) -> bool {
    tokio::select! {
        biased;

        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(wait) => true,
    }
}

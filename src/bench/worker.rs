//! Load worker loop
//!
//! A worker repeats one work function until the run is cancelled. Every
//! attempt is bounded by the work timeout and raced against cancellation,
//! so a worker stuck on a slow peer still stops promptly. Failures are
//! counted and the loop carries on: see `RetryPolicy`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::{rngs::SmallRng, SeedableRng};

use super::cancel::CancellationObserver;
use super::counters::AggregateCounters;
use super::pacer::{sleep_unless_cancelled, Pacer};
use crate::work::{WorkContext, WorkError, WorkFn};

/// What a worker does after a failed attempt.
///
/// The only policy is to retry immediately, forever, until the run is
/// cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// Never give up, never back off
    #[default]
    Forever,
}

impl RetryPolicy {
    /// Whether the worker keeps looping after `error`
    pub fn should_continue(&self, _error: &WorkError) -> bool {
        match self {
            RetryPolicy::Forever => true,
        }
    }

    /// Extra delay before the next attempt after `consecutive_failures`
    pub fn backoff(&self, _consecutive_failures: u64) -> Duration {
        match self {
            RetryPolicy::Forever => Duration::ZERO,
        }
    }
}

/// Per-worker tallies returned when the worker exits
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerReport {
    /// Worker ID
    pub id: usize,
    /// Attempts started
    pub iterations: u64,
    /// Attempts counted as successes
    pub successes: u64,
    /// Attempts counted as failures (including timeouts)
    pub failures: u64,
    /// Attempts dropped uncounted because the run was cancelled mid-flight
    pub abandoned: u64,
}

impl WorkerReport {
    fn new(id: usize) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }
}

/// One member of the pool
pub struct Worker {
    id: usize,
    work: Arc<dyn WorkFn>,
    counters: Arc<AggregateCounters>,
    cancel: CancellationObserver,
    work_timeout: Duration,
    pacer: Pacer,
    policy: RetryPolicy,
    active: Arc<AtomicUsize>,
    exhaustion_warned: Arc<AtomicBool>,
}

impl Worker {
    pub fn new(
        id: usize,
        work: Arc<dyn WorkFn>,
        counters: Arc<AggregateCounters>,
        cancel: CancellationObserver,
        work_timeout: Duration,
    ) -> Self {
        Self {
            id,
            work,
            counters,
            cancel,
            work_timeout,
            pacer: Pacer::unlimited(),
            policy: RetryPolicy::Forever,
            active: Arc::new(AtomicUsize::new(0)),
            exhaustion_warned: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Set the iteration pacer
    pub fn with_pacer(mut self, pacer: Pacer) -> Self {
        self.pacer = pacer;
        self
    }

    /// Share a gauge counting workers currently inside `run`
    pub fn with_active_gauge(mut self, active: Arc<AtomicUsize>) -> Self {
        self.active = active;
        self
    }

    /// Share the once-per-run resource exhaustion warning flag
    pub fn with_exhaustion_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.exhaustion_warned = flag;
        self
    }

    /// Run the loop until cancellation
    pub async fn run(self) -> WorkerReport {
        let _active = ActiveGuard::enter(Arc::clone(&self.active));
        let mut report = WorkerReport::new(self.id);
        let mut ctx = WorkContext::new(self.id, self.work_timeout, self.cancel.clone());
        let mut consecutive_failures = 0u64;

        tracing::debug!(worker_id = self.id, "Worker started");

        if self.pacer.is_enabled() {
            let offset = self.pacer.start_offset(&mut SmallRng::from_entropy());
            if !sleep_unless_cancelled(offset, &self.cancel).await {
                return report;
            }
        }

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let started = Instant::now();
            let attempt = tokio::select! {
                biased;

                _ = self.cancel.cancelled() => None,
                result = tokio::time::timeout(self.work_timeout, self.work.call(&ctx, &self.counters)) => Some(result),
            };
            ctx.iteration += 1;
            report.iterations += 1;

            let outcome = match attempt {
                None | Some(Ok(Err(WorkError::Cancelled))) => {
                    report.abandoned += 1;
                    break;
                }
                Some(Ok(result)) => result,
                Some(Err(_elapsed)) => Err(WorkError::Timeout(self.work_timeout)),
            };

            match outcome {
                Ok(bytes) => {
                    self.counters.record_success(bytes, started.elapsed());
                    report.successes += 1;
                    consecutive_failures = 0;
                }
                Err(err) => {
                    self.counters.record_failure();
                    report.failures += 1;
                    consecutive_failures += 1;
                    self.note_failure(&err);
                    if !self.policy.should_continue(&err) {
                        break;
                    }
                }
            }

            if self.cancel.is_cancelled() {
                break;
            }

            let backoff = self.policy.backoff(consecutive_failures);
            if !backoff.is_zero() && !sleep_unless_cancelled(backoff, &self.cancel).await {
                break;
            }

            if self.pacer.is_enabled() {
                if !self.pacer.pace(started, &self.cancel).await {
                    break;
                }
            } else {
                // Unpaced loops yield so the reporter and deadline tasks get polled
                tokio::task::yield_now().await;
            }
        }

        tracing::debug!(
            worker_id = self.id,
            iterations = report.iterations,
            successes = report.successes,
            failures = report.failures,
            "Worker stopped"
        );

        report
    }

    fn note_failure(&self, err: &WorkError) {
        if err.is_resource_exhaustion() && !self.exhaustion_warned.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                worker_id = self.id,
                error = %err,
                "Out of file descriptors; failures will climb until load drops or the limit is raised"
            );
        }
    }
}

struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn enter(gauge: Arc<AtomicUsize>) -> Self {
        gauge.fetch_add(1, Ordering::SeqCst);
        Self(gauge)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bench::cancel::{CancelReason, CancellationSignal};
    use async_trait::async_trait;
    use tokio::time::timeout;

    struct Instant200;

    #[async_trait]
    impl WorkFn for Instant200 {
        fn name(&self) -> &str {
            "instant"
        }

        async fn call(
            &self,
            _ctx: &WorkContext,
            _counters: &AggregateCounters,
        ) -> Result<u64, WorkError> {
            Ok(200)
        }
    }

    struct AlwaysRefused;

    #[async_trait]
    impl WorkFn for AlwaysRefused {
        fn name(&self) -> &str {
            "refused"
        }

        async fn call(
            &self,
            _ctx: &WorkContext,
            _counters: &AggregateCounters,
        ) -> Result<u64, WorkError> {
            Err(WorkError::Io(std::io::Error::from(
                std::io::ErrorKind::ConnectionRefused,
            )))
        }
    }

    struct Hang;

    #[async_trait]
    impl WorkFn for Hang {
        fn name(&self) -> &str {
            "hang"
        }

        async fn call(
            &self,
            _ctx: &WorkContext,
            _counters: &AggregateCounters,
        ) -> Result<u64, WorkError> {
            std::future::pending::<()>().await;
            Ok(0)
        }
    }

    fn worker(work: Arc<dyn WorkFn>, signal: &CancellationSignal, counters: &Arc<AggregateCounters>) -> Worker {
        Worker::new(
            0,
            work,
            Arc::clone(counters),
            signal.observer(),
            Duration::from_millis(50),
        )
    }

    #[test]
    fn test_retry_policy_is_forever_without_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(policy, RetryPolicy::Forever);
        let err = WorkError::Status(500);
        assert!(policy.should_continue(&err));
        assert_eq!(policy.backoff(0), Duration::ZERO);
        assert_eq!(policy.backoff(1_000_000), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_worker_counts_successes_until_cancelled() {
        let signal = CancellationSignal::new();
        let counters = Arc::new(AggregateCounters::new());
        let handle = tokio::spawn(worker(Arc::new(Instant200), &signal, &counters).run());

        tokio::time::sleep(Duration::from_millis(50)).await;
        signal.fire(CancelReason::Interrupt);
        let report = timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();

        assert!(report.successes > 0);
        assert_eq!(report.failures, 0);
        let totals = counters.drain();
        assert_eq!(totals.successes, report.successes);
        assert_eq!(totals.bytes, report.successes * 200);
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_worker() {
        let signal = CancellationSignal::new();
        let counters = Arc::new(AggregateCounters::new());
        let handle = tokio::spawn(worker(Arc::new(AlwaysRefused), &signal, &counters).run());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());
        signal.fire(CancelReason::Deadline);
        let report = handle.await.unwrap();

        assert!(report.failures > 1);
        assert_eq!(report.successes, 0);
        assert_eq!(counters.drain().failures, report.failures);
    }

    #[tokio::test]
    async fn test_hung_work_times_out_as_failure() {
        let signal = CancellationSignal::new();
        let counters = Arc::new(AggregateCounters::new());
        let handle = tokio::spawn(worker(Arc::new(Hang), &signal, &counters).run());

        tokio::time::sleep(Duration::from_millis(180)).await;
        signal.fire(CancelReason::Deadline);
        let report = handle.await.unwrap();

        // 50ms timeout over ~180ms
        assert!(report.failures >= 2, "failures: {}", report.failures);
        assert_eq!(report.successes, 0);
    }

    #[tokio::test]
    async fn test_cancellation_abandons_in_flight_attempt() {
        let signal = CancellationSignal::new();
        let counters = Arc::new(AggregateCounters::new());
        let w = Worker::new(
            0,
            Arc::new(Hang),
            Arc::clone(&counters),
            signal.observer(),
            Duration::from_secs(60),
        );
        let handle = tokio::spawn(w.run());

        tokio::time::sleep(Duration::from_millis(20)).await;
        signal.fire(CancelReason::Interrupt);
        let report = timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker must not wait out the work timeout")
            .unwrap();

        assert_eq!(report.abandoned, 1);
        assert!(counters.drain().is_empty());
    }

    #[tokio::test]
    async fn test_pre_cancelled_worker_does_nothing() {
        let signal = CancellationSignal::new();
        signal.fire(CancelReason::Deadline);
        let counters = Arc::new(AggregateCounters::new());
        let report = worker(Arc::new(Instant200), &signal, &counters).run().await;
        assert_eq!(report.iterations, 0);
    }

    #[tokio::test]
    async fn test_paced_worker_respects_rate() {
        let signal = CancellationSignal::new();
        let counters = Arc::new(AggregateCounters::new());
        let w = worker(Arc::new(Instant200), &signal, &counters).with_pacer(Pacer::new(Some(20.0)));
        let handle = tokio::spawn(w.run());

        tokio::time::sleep(Duration::from_millis(500)).await;
        signal.fire(CancelReason::Deadline);
        let report = handle.await.unwrap();

        // 20/s over 0.5s allows 10 plus one for the period already open
        assert!(report.iterations <= 11, "iterations: {}", report.iterations);
        assert!(report.iterations >= 3, "iterations: {}", report.iterations);
    }

    #[tokio::test]
    async fn test_active_gauge_tracks_running_worker() {
        let signal = CancellationSignal::new();
        let counters = Arc::new(AggregateCounters::new());
        let gauge = Arc::new(AtomicUsize::new(0));
        let w = worker(Arc::new(Hang), &signal, &counters).with_active_gauge(Arc::clone(&gauge));
        let handle = tokio::spawn(w.run());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(gauge.load(Ordering::SeqCst), 1);
        signal.fire(CancelReason::Interrupt);
        handle.await.unwrap();
        assert_eq!(gauge.load(Ordering::SeqCst), 0);
    }
}

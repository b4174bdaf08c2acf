//! Worker pool coordinator
//!
//! Owns one run from start to summary: arms the deadline, spawns the workers
//! and the reporter, waits for cancellation, joins everything and takes the
//! residual drain.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use super::cancel::{CancelReason, CancellationSignal, DeadlineController};
use super::counters::AggregateCounters;
use super::pacer::Pacer;
use super::reporter::{StatsReporter, StatsSink};
use super::worker::{Worker, WorkerReport};
use crate::config::RunConfig;
use crate::models::RunSummary;
use crate::work::WorkFn;
use crate::{NetOrbError, Result};

/// Cloneable control surface for a run, usable from any task
#[derive(Debug, Clone)]
pub struct PoolHandle {
    signal: CancellationSignal,
    active: Arc<AtomicUsize>,
}

impl PoolHandle {
    /// Stop the run. Only the first call (or the deadline, if it got there
    /// first) has an effect; returns whether this call did.
    pub fn interrupt(&self) -> bool {
        let fired = self.signal.fire(CancelReason::Interrupt);
        if fired {
            tracing::info!("Interrupt requested, cancelling run");
        }
        fired
    }

    pub fn is_cancelled(&self) -> bool {
        self.signal.is_cancelled()
    }

    pub fn reason(&self) -> Option<CancelReason> {
        self.signal.reason()
    }

    /// Workers currently inside their loop
    pub fn active_workers(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub async fn cancelled(&self) {
        self.signal.cancelled().await
    }
}

/// Runs one load test against a validated configuration
pub struct Coordinator {
    config: RunConfig,
    signal: CancellationSignal,
    active: Arc<AtomicUsize>,
    sinks: Vec<Box<dyn StatsSink>>,
}

impl Coordinator {
    /// Validate `config` and prepare a run
    pub fn new(config: RunConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            signal: CancellationSignal::new(),
            active: Arc::new(AtomicUsize::new(0)),
            sinks: Vec::new(),
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Add a destination for interval lines
    pub fn with_sink(mut self, sink: impl StatsSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn add_sink(&mut self, sink: Box<dyn StatsSink>) {
        self.sinks.push(sink);
    }

    pub fn handle(&self) -> PoolHandle {
        PoolHandle {
            signal: self.signal.clone(),
            active: Arc::clone(&self.active),
        }
    }

    /// Run until the deadline or an interrupt, then return the summary
    pub async fn run(self, work: Arc<dyn WorkFn>) -> Result<RunSummary> {
        let Coordinator {
            config,
            signal,
            active,
            sinks,
        } = self;

        tracing::info!(
            target = %config.target,
            mode = config.mode.description(),
            work = work.name(),
            concurrency = config.concurrency,
            duration_secs = config.duration.as_secs_f64(),
            rate_limit = ?config.rate_limit,
            "Starting run"
        );

        let counters = Arc::new(AggregateCounters::new());
        let started = Instant::now();
        let deadline = DeadlineController::arm(config.duration, signal.clone());

        let pacer = Pacer::new(config.rate_limit);
        let exhaustion_warned = Arc::new(AtomicBool::new(false));
        let workers: Vec<_> = (0..config.concurrency)
            .map(|id| {
                let worker = Worker::new(
                    id,
                    Arc::clone(&work),
                    Arc::clone(&counters),
                    signal.observer(),
                    config.work_timeout,
                )
                .with_pacer(pacer.clone())
                .with_active_gauge(Arc::clone(&active))
                .with_exhaustion_flag(Arc::clone(&exhaustion_warned));
                tokio::spawn(worker.run())
            })
            .collect();

        let reporter = StatsReporter::new(
            Arc::clone(&counters),
            config.sample_interval,
            started,
            sinks,
        );
        let reporter_task = tokio::spawn(reporter.run(signal.observer()));

        signal.cancelled().await;
        let stop_reason = signal.reason();
        tracing::info!(reason = ?stop_reason, "Run cancelled, joining workers");

        let mut reports: Vec<WorkerReport> = Vec::with_capacity(workers.len());
        let mut join_errors = Vec::new();
        for handle in workers {
            match handle.await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    tracing::error!(error = %e, "Worker task failed");
                    join_errors.push(e.to_string());
                }
            }
        }
        deadline.join().await;

        let mut reporter = reporter_task
            .await
            .map_err(|e| NetOrbError::WorkerError(format!("Stats reporter task failed: {}", e)))?;
        let elapsed = started.elapsed();

        // Increments that landed after the last tick
        reporter.flush_residual();

        let summary = RunSummary::new(
            &config,
            work.name(),
            reporter.totals(),
            elapsed,
            stop_reason,
            reporter.emitted(),
        );
        reporter.finish(&summary);

        let abandoned: u64 = reports.iter().map(|r| r.abandoned).sum();
        tracing::info!(
            successes = summary.successes,
            failures = summary.failures,
            bytes = summary.bytes,
            abandoned,
            elapsed_secs = elapsed.as_secs_f64(),
            rate = summary.rate,
            "Run completed"
        );

        if !join_errors.is_empty() {
            return Err(NetOrbError::WorkerError(format!(
                "{} worker(s) failed: {}",
                join_errors.len(),
                join_errors.join("; ")
            )));
        }

        Ok(summary)
    }

    /// Like `run`, with Ctrl+C routed to `PoolHandle::interrupt`
    pub async fn run_with_signal_handling(self, work: Arc<dyn WorkFn>) -> Result<RunSummary> {
        let handle = self.handle();

        let signal_task = tokio::spawn(async move {
            tokio::select! {
                _ = handle.cancelled() => {}
                result = tokio::signal::ctrl_c() => match result {
                    Ok(()) => {
                        tracing::info!("Received Ctrl+C, stopping workers");
                        handle.interrupt();
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                    }
                },
            }
        });

        let result = self.run(work).await;
        signal_task.abort();
        result
    }
}

/// Validate, run with Ctrl+C handling, and return the summary
pub async fn run(config: RunConfig, work: Arc<dyn WorkFn>) -> Result<RunSummary> {
    Coordinator::new(config)?.run_with_signal_handling(work).await
}

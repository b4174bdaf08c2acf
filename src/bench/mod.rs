//! Load harness engine
//!
//! Contains the worker pool, cancellation and deadline control, pacing,
//! lock-free counters and the periodic stats reporter.

pub mod cancel;
pub mod counters;
pub mod pacer;
pub mod pool;
pub mod reporter;
pub mod worker;

// Re-export commonly used types
pub use cancel::{CancelReason, CancellationObserver, CancellationSignal, DeadlineController, SignalState};
pub use counters::{AggregateCounters, CounterSnapshot};
pub use pacer::Pacer;
pub use pool::{run, Coordinator, PoolHandle};
pub use reporter::{StatsReporter, StatsSink};
pub use worker::{RetryPolicy, Worker, WorkerReport};

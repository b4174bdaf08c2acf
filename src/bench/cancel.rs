//! Run cancellation and deadline control
//!
//! A run has exactly one cancellation signal. It moves from armed to fired
//! once and never back; the deadline timer and an external interrupt both
//! route through `CancellationSignal::fire`, and whichever arrives first
//! decides the recorded reason.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// What ended a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CancelReason {
    /// The configured duration elapsed
    Deadline,
    /// An operator abort or `PoolHandle::interrupt`
    Interrupt,
}

/// Observable state of the signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalState {
    Armed,
    Fired(CancelReason),
}

/// One-way, broadcast cancellation flag owned by the coordinator
#[derive(Debug, Clone)]
pub struct CancellationSignal {
    tx: Arc<watch::Sender<Option<CancelReason>>>,
}

/// Read-only view handed to workers and the reporter
#[derive(Debug, Clone)]
pub struct CancellationObserver {
    rx: watch::Receiver<Option<CancelReason>>,
}

impl CancellationSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Transition to fired. Returns `true` only for the call that made the
    /// transition; later calls leave the original reason in place.
    pub fn fire(&self, reason: CancelReason) -> bool {
        self.tx.send_if_modified(|state| {
            if state.is_none() {
                *state = Some(reason);
                true
            } else {
                false
            }
        })
    }

    pub fn is_cancelled(&self) -> bool {
        self.tx.borrow().is_some()
    }

    pub fn reason(&self) -> Option<CancelReason> {
        *self.tx.borrow()
    }

    pub fn state(&self) -> SignalState {
        match self.reason() {
            Some(reason) => SignalState::Fired(reason),
            None => SignalState::Armed,
        }
    }

    /// Resolve once the signal has fired (immediately if it already has)
    pub async fn cancelled(&self) {
        self.observer().cancelled().await;
    }

    pub fn observer(&self) -> CancellationObserver {
        CancellationObserver {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationObserver {
    pub fn is_cancelled(&self) -> bool {
        self.rx.borrow().is_some()
    }

    pub fn reason(&self) -> Option<CancelReason> {
        *self.rx.borrow()
    }

    /// Resolve once the signal has fired (immediately if it already has)
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // The sender lives as long as any CancellationSignal clone; if every
        // clone is gone the run is over and returning is the right answer.
        let _ = rx.wait_for(|state| state.is_some()).await;
    }
}

/// Timer that fires the signal with `CancelReason::Deadline`
#[derive(Debug)]
pub struct DeadlineController {
    handle: JoinHandle<()>,
}

impl DeadlineController {
    /// Arm the deadline. A zero duration fires before this returns so that
    /// no worker spawned afterwards can start an iteration.
    pub fn arm(duration: Duration, signal: CancellationSignal) -> Self {
        if duration.is_zero() && signal.fire(CancelReason::Deadline) {
            tracing::info!("Zero duration, deadline fired immediately");
        }

        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;

                _ = signal.cancelled() => {}
                _ = tokio::time::sleep(duration) => {
                    if signal.fire(CancelReason::Deadline) {
                        tracing::info!(duration_secs = duration.as_secs_f64(), "Deadline reached, cancelling run");
                    }
                }
            }
        });

        Self { handle }
    }

    /// Wait for the timer task to exit; it exits as soon as the signal fires
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "Deadline task did not exit cleanly");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tokio::time::timeout;

    #[test]
    fn test_fire_is_one_way_and_idempotent() {
        let signal = CancellationSignal::new();
        assert_eq!(signal.state(), SignalState::Armed);

        assert!(signal.fire(CancelReason::Interrupt));
        assert!(!signal.fire(CancelReason::Deadline));
        assert!(!signal.fire(CancelReason::Interrupt));

        assert_eq!(signal.state(), SignalState::Fired(CancelReason::Interrupt));
        assert!(signal.observer().is_cancelled());
    }

    #[test]
    fn test_concurrent_fires_make_one_transition() {
        let signal = CancellationSignal::new();
        let winners: usize = (0..16)
            .map(|i| {
                let signal = signal.clone();
                std::thread::spawn(move || {
                    let reason = if i % 2 == 0 {
                        CancelReason::Deadline
                    } else {
                        CancelReason::Interrupt
                    };
                    signal.fire(reason) as usize
                })
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap())
            .sum();
        assert_eq!(winners, 1);
        assert!(signal.is_cancelled());
    }

    #[tokio::test]
    async fn test_observer_created_before_fire_wakes() {
        let signal = CancellationSignal::new();
        let observer = signal.observer();
        let waiter = tokio::spawn(async move { observer.cancelled().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        signal.fire(CancelReason::Interrupt);

        timeout(Duration::from_secs(1), waiter)
            .await
            .expect("observer should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn test_observer_created_after_fire_returns_immediately() {
        let signal = CancellationSignal::new();
        signal.fire(CancelReason::Deadline);
        timeout(Duration::from_millis(50), signal.observer().cancelled())
            .await
            .expect("already fired");
    }

    #[tokio::test]
    async fn test_deadline_fires_after_duration() {
        let signal = CancellationSignal::new();
        let start = Instant::now();
        let deadline = DeadlineController::arm(Duration::from_millis(100), signal.clone());

        signal.cancelled().await;
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert_eq!(signal.reason(), Some(CancelReason::Deadline));
        deadline.join().await;
    }

    #[tokio::test]
    async fn test_zero_duration_fires_synchronously() {
        let signal = CancellationSignal::new();
        let deadline = DeadlineController::arm(Duration::ZERO, signal.clone());
        assert_eq!(signal.reason(), Some(CancelReason::Deadline));
        deadline.join().await;
    }

    #[tokio::test]
    async fn test_interrupt_wins_and_stops_timer() {
        let signal = CancellationSignal::new();
        let deadline = DeadlineController::arm(Duration::from_secs(60), signal.clone());

        assert!(signal.fire(CancelReason::Interrupt));
        timeout(Duration::from_secs(1), deadline.join())
            .await
            .expect("deadline task should exit on interrupt");
        assert_eq!(signal.reason(), Some(CancelReason::Interrupt));
    }
}

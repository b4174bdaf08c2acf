//! Pluggable units of work
//!
//! A `WorkFn` performs one attempt (one connection, one request) and reports
//! the bytes it moved. The worker loop owns timing, timeouts, counting and
//! retries; a work function only has to do its one thing and return.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::bench::{AggregateCounters, CancellationObserver};
use crate::config::{RunConfig, WorkMode};
use crate::Result;

pub mod http;
pub mod tcp;

pub use http::HttpGetWork;
pub use tcp::TcpConnectWork;

/// Per-attempt context handed to a work function
#[derive(Debug, Clone)]
pub struct WorkContext {
    /// Index of the worker running this attempt
    pub worker_id: usize,
    /// 0-based attempt number within this worker
    pub iteration: u64,
    /// Upper bound the worker enforces on this attempt
    pub timeout: Duration,
    cancel: CancellationObserver,
}

impl WorkContext {
    pub fn new(worker_id: usize, timeout: Duration, cancel: CancellationObserver) -> Self {
        Self {
            worker_id,
            iteration: 0,
            timeout,
            cancel,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when the run is cancelled; work functions with several
    /// blocking steps can race each step against this.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}

/// A single failed attempt. Counted, never fatal.
#[derive(Debug)]
pub enum WorkError {
    /// The attempt exceeded the work timeout
    Timeout(Duration),
    /// Socket-level failure (refused, reset, DNS, ...)
    Io(std::io::Error),
    /// HTTP client failure that is not a plain socket error
    Http(String),
    /// The server answered with a non-success status
    Status(u16),
    /// The work function gave up because the run was cancelled; not counted
    Cancelled,
}

impl fmt::Display for WorkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkError::Timeout(after) => write!(f, "timed out after {:?}", after),
            WorkError::Io(err) => write!(f, "I/O error: {}", err),
            WorkError::Http(msg) => write!(f, "HTTP error: {}", msg),
            WorkError::Status(code) => write!(f, "unexpected HTTP status {}", code),
            WorkError::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::error::Error for WorkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WorkError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for WorkError {
    fn from(err: std::io::Error) -> Self {
        WorkError::Io(err)
    }
}

impl WorkError {
    /// Out of file descriptors, process- or system-wide
    pub fn is_resource_exhaustion(&self) -> bool {
        match self {
            WorkError::Io(err) => is_fd_exhaustion(err),
            _ => false,
        }
    }
}

#[cfg(unix)]
fn is_fd_exhaustion(err: &std::io::Error) -> bool {
    matches!(err.raw_os_error(), Some(code) if code == libc::EMFILE || code == libc::ENFILE)
}

#[cfg(not(unix))]
fn is_fd_exhaustion(_err: &std::io::Error) -> bool {
    false
}

/// The unit of work a worker repeats
#[async_trait]
pub trait WorkFn: Send + Sync {
    /// Short name used in logs and summaries
    fn name(&self) -> &str;

    /// Perform one attempt and return the bytes it moved.
    ///
    /// `counters` is shared with every other worker; implementations may
    /// add bytes for partial progress but must not record successes or
    /// failures themselves.
    async fn call(
        &self,
        ctx: &WorkContext,
        counters: &AggregateCounters,
    ) -> std::result::Result<u64, WorkError>;
}

/// Build the shipped probe selected by `config.mode`
pub fn for_config(config: &RunConfig) -> Result<Arc<dyn WorkFn>> {
    Ok(match config.mode {
        WorkMode::TcpConnect => Arc::new(TcpConnectWork::new(
            config.target.clone(),
            config.payload_size as usize,
        )),
        WorkMode::Http => Arc::new(HttpGetWork::new(&config.target, config.work_timeout)?),
    })
}

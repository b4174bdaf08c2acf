//! TCP connect probe
//!
//! Each attempt opens a fresh connection to the target, optionally writes a
//! fixed payload, and closes the write half cleanly.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use super::{WorkContext, WorkError, WorkFn};
use crate::bench::AggregateCounters;

pub struct TcpConnectWork {
    target: String,
    payload: Arc<[u8]>,
}

impl TcpConnectWork {
    /// `target` is `host:port`; the host is resolved on every attempt
    pub fn new(target: impl Into<String>, payload_size: usize) -> Self {
        Self {
            target: target.into(),
            payload: create_payload(payload_size).into(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}

#[async_trait]
impl WorkFn for TcpConnectWork {
    fn name(&self) -> &str {
        "tcp-connect"
    }

    async fn call(
        &self,
        ctx: &WorkContext,
        _counters: &AggregateCounters,
    ) -> Result<u64, WorkError> {
        let mut stream = TcpStream::connect(self.target.as_str()).await?;
        stream.set_nodelay(true)?;

        if self.payload.is_empty() {
            return Ok(0);
        }

        // Connected, but the run may have ended while we were dialing
        if ctx.is_cancelled() {
            return Err(WorkError::Cancelled);
        }

        stream.write_all(&self.payload).await?;
        stream.shutdown().await?;
        Ok(self.payload.len() as u64)
    }
}

// Repeating byte ramp, same pattern on every connection
fn create_payload(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 256) as u8).collect()
}

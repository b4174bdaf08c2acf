//! HTTP GET probe
//!
//! One shared reqwest client per run, so keep-alive connections are reused
//! across attempts the way a real client population would.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};

use super::{WorkContext, WorkError, WorkFn};
use crate::bench::AggregateCounters;
use crate::{NetOrbError, Result};

pub struct HttpGetWork {
    client: Client,
    url: Url,
    timeout: Duration,
}

impl HttpGetWork {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| NetOrbError::ConfigError(format!("Invalid URL {}: {}", url, e)))?;

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("netorb/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| NetOrbError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url,
            timeout,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl WorkFn for HttpGetWork {
    fn name(&self) -> &str {
        "http-get"
    }

    async fn call(
        &self,
        ctx: &WorkContext,
        counters: &AggregateCounters,
    ) -> std::result::Result<u64, WorkError> {
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, self.timeout))?;

        if ctx.is_cancelled() {
            return Err(WorkError::Cancelled);
        }

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| map_reqwest_error(e, self.timeout))?;

        if !status.is_success() {
            // The body still crossed the wire
            counters.add_bytes(body.len() as u64);
            return Err(WorkError::Status(status.as_u16()));
        }

        Ok(body.len() as u64)
    }
}

fn map_reqwest_error(err: reqwest::Error, timeout: Duration) -> WorkError {
    if err.is_timeout() {
        return WorkError::Timeout(timeout);
    }

    // Surface the socket error underneath so fd exhaustion stays recognisable
    let mut source = std::error::Error::source(&err);
    while let Some(inner) = source {
        if let Some(io) = inner.downcast_ref::<std::io::Error>() {
            let io = match io.raw_os_error() {
                Some(code) => std::io::Error::from_raw_os_error(code),
                None => std::io::Error::new(io.kind(), io.to_string()),
            };
            return WorkError::Io(io);
        }
        source = inner.source();
    }

    WorkError::Http(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bench::CancellationSignal;
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned response per connection until the test ends
    async fn canned_server(status_line: &'static str, body: &'static str) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }
                    let response = format!(
                        "HTTP/1.1 {}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        status_line,
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        addr
    }

    fn context(signal: &CancellationSignal) -> WorkContext {
        WorkContext::new(0, Duration::from_secs(2), signal.observer())
    }

    #[test]
    fn test_invalid_url_is_config_error() {
        let err = HttpGetWork::new("::not a url::", Duration::from_secs(1))
            .err()
            .expect("should fail");
        assert!(matches!(err, NetOrbError::ConfigError(_)));
    }

    #[tokio::test]
    async fn test_success_counts_body_bytes() {
        let addr = canned_server("200 OK", "hello").await;
        let work = HttpGetWork::new(&format!("http://{}/", addr), Duration::from_secs(2)).unwrap();
        let signal = CancellationSignal::new();
        let counters = AggregateCounters::new();

        let bytes = work.call(&context(&signal), &counters).await.unwrap();
        assert_eq!(bytes, 5);
        assert_eq!(counters.peek().bytes, 0);
    }

    #[tokio::test]
    async fn test_error_status_is_failure_with_partial_bytes() {
        let addr = canned_server("503 Service Unavailable", "busy").await;
        let work = HttpGetWork::new(&format!("http://{}/", addr), Duration::from_secs(2)).unwrap();
        let signal = CancellationSignal::new();
        let counters = AggregateCounters::new();

        let err = work.call(&context(&signal), &counters).await.unwrap_err();
        assert!(matches!(err, WorkError::Status(503)));
        assert_eq!(counters.peek().bytes, 4);
    }

    #[tokio::test]
    async fn test_cancelled_before_body_is_read() {
        let addr = canned_server("200 OK", "hello").await;
        let work = HttpGetWork::new(&format!("http://{}/", addr), Duration::from_secs(2)).unwrap();
        let signal = CancellationSignal::new();
        let ctx = context(&signal);
        let counters = AggregateCounters::new();

        signal.fire(crate::bench::CancelReason::Interrupt);
        let err = work.call(&ctx, &counters).await.unwrap_err();
        assert!(matches!(err, WorkError::Cancelled));
        assert_eq!(counters.peek().bytes, 0);
    }

    #[tokio::test]
    async fn test_refused_connection_maps_to_error() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let work = HttpGetWork::new(&format!("http://{}/", addr), Duration::from_secs(2)).unwrap();
        let signal = CancellationSignal::new();
        let counters = AggregateCounters::new();

        let err = work.call(&context(&signal), &counters).await.unwrap_err();
        assert!(matches!(err, WorkError::Io(_) | WorkError::Http(_)));
    }
}

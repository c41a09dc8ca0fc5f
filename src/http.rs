//! Shared HTTP plumbing: timeouts and bounded exponential backoff.
//!
//! Every remote call in the crate goes through [`send_with_retry`]:
//! - configured rate-limit statuses → retry, surfacing
//!   [`CrossoverError::RateLimited`] once attempts run out
//! - HTTP 5xx and network errors (including timeouts) → retry
//! - any other non-success status → fail immediately
//! - backoff: `base * 2^(attempt-1)`, capped at `max`
//!
//! Request URLs may carry the API key, so errors never include them.

use std::time::Duration;

use crossover_core::error::CrossoverError;
use reqwest::{RequestBuilder, Response, StatusCode};

use crate::config::CatalogConfig;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base: Duration,
    pub max: Duration,
    pub rate_limit_statuses: Vec<u16>,
}

impl RetryPolicy {
    pub fn from_config(config: &CatalogConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base: Duration::from_millis(config.backoff_base_ms),
            max: Duration::from_millis(config.backoff_max_ms),
            rate_limit_statuses: config.rate_limit_statuses.clone(),
        }
    }

    /// Wait before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base.saturating_mul(factor).min(self.max)
    }

    pub fn is_rate_limited(&self, status: StatusCode) -> bool {
        self.rate_limit_statuses.contains(&status.as_u16())
    }
}

/// Which error kind a failed call turns into.
#[derive(Debug, Clone, Copy)]
pub enum CallKind {
    Search,
    Fetch,
}

impl CallKind {
    fn error(self, message: String) -> CrossoverError {
        match self {
            CallKind::Search => CrossoverError::SearchFailure(message),
            CallKind::Fetch => CrossoverError::FetchFailure(message),
        }
    }
}

pub async fn send_with_retry<F>(
    policy: &RetryPolicy,
    kind: CallKind,
    mut request: F,
) -> Result<Response, CrossoverError>
where
    F: FnMut() -> RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            tokio::time::sleep(policy.delay(attempt)).await;
        }

        match request().send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response);
                }

                if policy.is_rate_limited(status) {
                    last_err = Some(CrossoverError::RateLimited {
                        status: status.as_u16(),
                        attempts: attempt + 1,
                    });
                    continue;
                }

                let body_text = response.text().await.unwrap_or_default();
                if status.is_server_error() {
                    last_err = Some(kind.error(format!("HTTP {}: {}", status, body_text)));
                    continue;
                }

                return Err(kind.error(format!("HTTP {}: {}", status, body_text)));
            }
            Err(e) => {
                last_err = Some(kind.error(e.without_url().to_string()));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| kind.error("request failed after retries".to_string())))
}

/// Loopback HTTP server answering each request from a script.
#[cfg(test)]
pub(crate) mod test_server {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    pub(crate) struct ScriptedServer {
        pub url: String,
        hits: Arc<AtomicUsize>,
    }

    impl ScriptedServer {
        /// Answer request `n` (0-based) with `respond(n, base_url)`.
        pub(crate) async fn start<F>(respond: F) -> Self
        where
            F: Fn(usize, &str) -> (u16, String) + Send + 'static,
        {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let url = format!("http://{}", listener.local_addr().unwrap());
            let hits = Arc::new(AtomicUsize::new(0));

            let (counter, base) = (Arc::clone(&hits), url.clone());
            tokio::spawn(async move {
                while let Ok((mut stream, _)) = listener.accept().await {
                    read_request(&mut stream).await;
                    let (status, body) = respond(counter.fetch_add(1, Ordering::SeqCst), &base);
                    let response = format!(
                        "HTTP/1.1 {status} Scripted\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                }
            });
            Self { url, hits }
        }

        /// Replay `statuses` in order with empty JSON bodies, repeating the
        /// last one.
        pub(crate) async fn statuses(statuses: Vec<u16>) -> Self {
            Self::start(move |n, _| {
                let status = statuses[n.min(statuses.len() - 1)];
                (status, "{}".to_string())
            })
            .await
        }

        pub(crate) fn hits(&self) -> usize {
            self.hits.load(Ordering::SeqCst)
        }
    }

    async fn read_request(stream: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let Ok(n) = stream.read(&mut chunk).await else { return };
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let body_len = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + body_len {
                return;
            }
        }
    }
}

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tracing::{debug, warn};

use crate::document::Document;
use crate::transport::{Transport, TransportError};

/// Statuses the discovery crawl treats as transient.
pub const RETRY_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// Uniform random wait in `[min, max]`.
    Jitter { min: Duration, max: Duration },
    /// `factor * 2^(attempt - 1)`.
    Exponential { factor: Duration },
}

impl Backoff {
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Backoff::Jitter { min, max } => uniform(*min, *max),
            Backoff::Exponential { factor } => {
                factor.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
            }
        }
    }
}

/// Random duration in `[min, max]`; `max < min` collapses to `min`.
pub fn uniform(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let secs = rand::thread_rng().gen_range(min.as_secs_f64()..=max.as_secs_f64());
    Duration::from_secs_f64(secs)
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Non-2xx statuses that get another attempt.
    pub retry_statuses: Vec<u16>,
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Detail pages: retry connection failures only, 1-3s jitter.
    pub fn baseline(max_attempts: u32, min: Duration, max: Duration) -> Self {
        Self {
            max_attempts,
            retry_statuses: Vec::new(),
            backoff: Backoff::Jitter { min, max },
        }
    }

    /// Index pages: also retry throttling and gateway errors, exponential backoff.
    pub fn discovery() -> Self {
        Self {
            max_attempts: 5,
            retry_statuses: RETRY_STATUSES.to_vec(),
            backoff: Backoff::Exponential {
                factor: Duration::from_secs(1),
            },
        }
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::baseline(3, Duration::from_secs(1), Duration::from_secs(3))
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} for {url} after {attempts} attempt(s)")]
    Status { url: String, status: u16, attempts: u32 },
    #[error("gave up on {url} after {attempts} attempt(s): {source}")]
    Exhausted {
        url: String,
        attempts: u32,
        #[source]
        source: TransportError,
    },
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: TransportError,
    },
}

pub struct Fetcher {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    /// GET `url` and parse it, retrying per policy. Never panics on network failure.
    pub async fn fetch(&self, url: &str) -> Result<Document, FetchError> {
        let body = self.fetch_text(url).await?;
        Ok(Document::parse(&body))
    }

    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let max = self.policy.attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!("GET {} (attempt {}/{})", url, attempt, max);

            match self.transport.get(url).await {
                Ok(resp) if resp.is_success() => return Ok(resp.text()),
                Ok(resp) => {
                    let retryable = self.policy.retry_statuses.contains(&resp.status);
                    if !retryable || attempt >= max {
                        return Err(FetchError::Status {
                            url: url.to_string(),
                            status: resp.status,
                            attempts: attempt,
                        });
                    }
                    warn!("HTTP {} for {}. Retrying...", resp.status, url);
                }
                Err(e) if e.is_transient() => {
                    if attempt >= max {
                        return Err(FetchError::Exhausted {
                            url: url.to_string(),
                            attempts: attempt,
                            source: e,
                        });
                    }
                    warn!("Connection error for {}: {}. Retrying...", url, e);
                }
                Err(e) => {
                    return Err(FetchError::Transport {
                        url: url.to_string(),
                        source: e,
                    })
                }
            }

            tokio::time::sleep(self.policy.backoff.delay(attempt)).await;
        }
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::css;
    use crate::transport::stub::StubTransport;

    const URL: &str = "https://www.parfumo.com/Perfumes/Kilian/smoking-hot";

    fn no_wait(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::baseline(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    fn reset() -> TransportError {
        TransportError::Connect("connection reset".into())
    }

    #[tokio::test]
    async fn succeeds_on_third_attempt() {
        let stub = Arc::new(
            StubTransport::new()
                .fail(URL, reset())
                .fail(URL, reset())
                .page(URL, "<h1>ok</h1>"),
        );
        let fetcher = Fetcher::new(stub.clone(), no_wait(3));
        let doc = fetcher.fetch(URL).await.unwrap();
        let h1 = doc.root().find(&css("h1").unwrap()).unwrap();
        assert_eq!(h1.text(), "ok");
        assert_eq!(stub.calls_to(URL), 3);
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts() {
        let stub = Arc::new(StubTransport::new().fail(URL, reset()));
        let fetcher = Fetcher::new(stub.clone(), no_wait(3));
        let err = fetcher.fetch(URL).await.err().unwrap();
        assert!(matches!(err, FetchError::Exhausted { attempts: 3, .. }));
        assert_eq!(stub.calls_to(URL), 3);
    }

    #[tokio::test]
    async fn client_error_not_retried_by_baseline() {
        let stub = Arc::new(StubTransport::new().status(URL, 404));
        let fetcher = Fetcher::new(stub.clone(), no_wait(3));
        let err = fetcher.fetch(URL).await.err().unwrap();
        assert!(matches!(err, FetchError::Status { status: 404, attempts: 1, .. }));
        assert_eq!(stub.calls_to(URL), 1);
    }

    #[tokio::test]
    async fn server_error_retried_by_status_policy() {
        let stub = Arc::new(
            StubTransport::new()
                .status(URL, 503)
                .status(URL, 429)
                .page(URL, "<p>ok</p>"),
        );
        let policy = RetryPolicy {
            backoff: Backoff::Exponential { factor: Duration::ZERO },
            ..RetryPolicy::discovery()
        };
        let fetcher = Fetcher::new(stub.clone(), policy);
        assert!(fetcher.fetch(URL).await.is_ok());
        assert_eq!(stub.calls_to(URL), 3);
    }

    #[tokio::test]
    async fn permanent_transport_error_not_retried() {
        let stub = Arc::new(StubTransport::new().fail(URL, TransportError::Other("bad".into())));
        let fetcher = Fetcher::new(stub.clone(), no_wait(5));
        assert!(matches!(
            fetcher.fetch(URL).await,
            Err(FetchError::Transport { .. })
        ));
        assert_eq!(stub.calls_to(URL), 1);
    }

    #[tokio::test]
    async fn zero_attempts_still_tries_once() {
        let stub = Arc::new(StubTransport::new().page(URL, "<p/>"));
        let fetcher = Fetcher::new(stub.clone(), no_wait(0));
        assert!(fetcher.fetch(URL).await.is_ok());
        assert_eq!(stub.calls_to(URL), 1);
    }

    #[test]
    fn exponential_doubles() {
        let b = Backoff::Exponential { factor: Duration::from_secs(1) };
        assert_eq!(b.delay(1), Duration::from_secs(1));
        assert_eq!(b.delay(2), Duration::from_secs(2));
        assert_eq!(b.delay(4), Duration::from_secs(8));
    }

    #[test]
    fn jitter_within_bounds() {
        let (min, max) = (Duration::from_millis(1000), Duration::from_millis(3000));
        for _ in 0..100 {
            let d = uniform(min, max);
            assert!(d >= min && d <= max, "{:?}", d);
        }
        assert_eq!(uniform(max, min), max);
    }
}

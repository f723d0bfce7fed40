use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

/// A fully received HTTP response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("request failed: {0}")]
    Other(String),
}

impl TransportError {
    /// Connection-level failures worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::Timeout(_))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if e.is_connect() || e.is_request() || e.is_body() {
            Self::Connect(e.to_string())
        } else {
            Self::Other(e.to_string())
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<RawResponse, TransportError>;
}

/// reqwest-backed transport sending a browser-like User-Agent.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(user_agent: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<RawResponse, TransportError> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        Ok(RawResponse { status, body })
    }
}

#[cfg(test)]
pub mod stub {
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    use super::*;

    /// Scripted in-memory transport. Each URL replays its queued outcomes in
    /// order; the last one repeats once the queue is down to a single entry.
    /// Unknown URLs answer 404.
    #[derive(Default)]
    pub struct StubTransport {
        routes: Mutex<HashMap<String, VecDeque<Result<RawResponse, TransportError>>>>,
        calls: Mutex<Vec<String>>,
    }

    impl StubTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn page(self, url: &str, html: &str) -> Self {
            self.push(url, Ok(RawResponse { status: 200, body: html.as_bytes().to_vec() }))
        }

        pub fn bytes(self, url: &str, body: &[u8]) -> Self {
            self.push(url, Ok(RawResponse { status: 200, body: body.to_vec() }))
        }

        pub fn status(self, url: &str, status: u16) -> Self {
            self.push(url, Ok(RawResponse { status, body: Vec::new() }))
        }

        pub fn fail(self, url: &str, err: TransportError) -> Self {
            self.push(url, Err(err))
        }

        fn push(self, url: &str, outcome: Result<RawResponse, TransportError>) -> Self {
            self.routes
                .lock()
                .unwrap()
                .entry(url.to_string())
                .or_default()
                .push_back(outcome);
            self
        }

        pub fn calls_to(&self, url: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
        }
    }

    #[async_trait]
    impl Transport for StubTransport {
        async fn get(&self, url: &str) -> Result<RawResponse, TransportError> {
            self.calls.lock().unwrap().push(url.to_string());
            let mut routes = self.routes.lock().unwrap();
            match routes.get_mut(url) {
                Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
                Some(queue) => queue.front().cloned().unwrap(),
                None => Ok(RawResponse { status: 404, body: Vec::new() }),
            }
        }
    }
}

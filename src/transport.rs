//! HTTP transport abstraction.
//!
//! The client never talks to `reqwest` directly; it goes through the
//! [`HttpTransport`] trait so the embedding application can inject its own
//! transport and tests can run against the deterministic [`MockTransport`]
//! without any network.
//!
//! The transport deals in plain status codes and body strings. Status
//! interpretation, retries, and body parsing all live in the client.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

/// Transport-level failure, distinct from any HTTP status.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The attempt was aborted by a timeout.
    #[error("request timed out")]
    Timeout,

    /// Connection or protocol failure before a response was obtained.
    #[error("network error: {0}")]
    Network(String),
}

/// HTTP method for an outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// One outbound HTTP request.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// JSON-serialized body, present for POST requests.
    pub body: Option<String>,
}

/// Raw HTTP response: status code plus the full body text.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    /// True for any 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Abstract HTTP transport the client sends requests through.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Execute one request and return the raw response.
    ///
    /// Implementations must return `Ok` for any HTTP status they obtain a
    /// response for, reserving `Err` for transport-level failures.
    async fn execute(
        &self,
        request: TransportRequest,
    ) -> std::result::Result<TransportResponse, TransportError>;
}

// ============================================================================
// Default reqwest-backed transport
// ============================================================================

/// Production transport backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

/// Default transport-level timeout. Per-attempt deadlines are enforced by
/// the client on top of this; this is only the last-resort bound for calls
/// that do not override it.
const TRANSPORT_TIMEOUT_SECS: u64 = 300;

impl ReqwestTransport {
    /// Create a transport with the default client configuration.
    pub fn new() -> std::result::Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(TRANSPORT_TIMEOUT_SECS))
            .build()
            .map_err(|e| TransportError::Network(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Wrap an existing `reqwest::Client` (connection pooling is the
    /// client's own concern).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(
        &self,
        request: TransportRequest,
    ) -> std::result::Result<TransportResponse, TransportError> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };

        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Network(e.to_string())
            }
        })?;

        debug!(status, body_len = body.len(), "transport response");

        Ok(TransportResponse { status, body })
    }
}

// ============================================================================
// Mock transport for tests
// ============================================================================

/// One scripted mock outcome.
#[derive(Debug, Clone)]
enum MockOutcome {
    Response(TransportResponse),
    Error(TransportError),
}

/// A request the mock transport received, with its receive time.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub request: TransportRequest,
    /// Receive time on the tokio clock, so paused-clock tests can assert
    /// backoff gaps.
    pub received_at: tokio::time::Instant,
}

/// Deterministic transport for tests: outcomes are scripted in order and
/// every received request is recorded.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    outcomes: Arc<Mutex<VecDeque<MockOutcome>>>,
    recorded: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockTransport {
    /// Create an empty mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response with the given status and body.
    pub async fn push_response(&self, status: u16, body: impl Into<String>) {
        self.outcomes
            .lock()
            .await
            .push_back(MockOutcome::Response(TransportResponse {
                status,
                body: body.into(),
            }));
    }

    /// Queue a transport-level failure.
    pub async fn push_error(&self, error: TransportError) {
        self.outcomes
            .lock()
            .await
            .push_back(MockOutcome::Error(error));
    }

    /// All requests received so far.
    pub async fn recorded(&self) -> Vec<RecordedRequest> {
        self.recorded.lock().await.clone()
    }

    /// Number of requests received so far.
    pub async fn call_count(&self) -> usize {
        self.recorded.lock().await.len()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn execute(
        &self,
        request: TransportRequest,
    ) -> std::result::Result<TransportResponse, TransportError> {
        self.recorded.lock().await.push(RecordedRequest {
            request,
            received_at: tokio::time::Instant::now(),
        });

        match self.outcomes.lock().await.pop_front() {
            Some(MockOutcome::Response(response)) => Ok(response),
            Some(MockOutcome::Error(error)) => Err(error),
            None => Err(TransportError::Network(
                "mock transport outcome queue exhausted".to_string(),
            )),
        }
    }
}

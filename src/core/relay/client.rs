//! Retrying HTTP relay client.
//!
//! Performs one outbound POST with bounded attempts. Each attempt is capped by
//! a hard timeout; retryable failures are followed by an exponential backoff
//! wait. The caller always receives the final attempt's outcome verbatim.

use std::fmt;
use std::time::Duration;

use http::HeaderMap;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use reqwest::multipart::Form;
use tracing::{debug, info, warn};

use super::policy::{FailureKind, RetryPolicy, is_retryable_status};

/// Headers checked, in order, for an upstream correlation id.
const REQUEST_ID_HEADERS: [&str; 2] = ["x-request-id", "request-id"];

// =============================================================================
// Request
// =============================================================================

/// Body of a relay request.
///
/// Bodies are rebuilt for every attempt, so they are stored as plain text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayBody {
    /// No body
    Empty,
    /// Raw text with an explicit content type
    Text { content_type: String, body: String },
    /// `multipart/form-data` made of text fields
    Multipart(Vec<(String, String)>),
}

/// A single outbound POST, replayable across attempts.
#[derive(Clone)]
pub struct RelayRequest {
    pub url: String,
    pub bearer: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: RelayBody,
}

impl fmt::Debug for RelayRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayRequest")
            .field("url", &self.url)
            .field("bearer", &self.bearer.as_ref().map(|_| "<redacted>"))
            .field("headers", &self.headers)
            .field("body", &self.body)
            .finish()
    }
}

impl RelayRequest {
    pub fn post(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            bearer: None,
            headers: Vec::new(),
            body: RelayBody::Empty,
        }
    }

    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn text(mut self, content_type: impl Into<String>, body: impl Into<String>) -> Self {
        self.body = RelayBody::Text {
            content_type: content_type.into(),
            body: body.into(),
        };
        self
    }

    pub fn multipart(mut self, fields: Vec<(String, String)>) -> Self {
        self.body = RelayBody::Multipart(fields);
        self
    }

    fn build(&self, client: &reqwest::Client) -> reqwest::RequestBuilder {
        let mut builder = client.post(&self.url);

        if let Some(token) = &self.bearer {
            builder = builder.bearer_auth(token);
        }
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        match &self.body {
            RelayBody::Empty => builder,
            RelayBody::Text { content_type, body } => builder
                .header(http::header::CONTENT_TYPE, content_type.as_str())
                .body(body.clone()),
            RelayBody::Multipart(fields) => {
                let form = fields
                    .iter()
                    .fold(Form::new(), |form, (name, value)| {
                        form.text(name.clone(), value.clone())
                    });
                builder.multipart(form)
            }
        }
    }
}

// =============================================================================
// Result
// =============================================================================

/// Details of a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayFailure {
    /// Upstream status, or 500 for failures that produced no response
    pub status: u16,
    /// Upstream body or a local diagnostic
    pub message: String,
    /// Upstream correlation id, when the response carried one
    pub request_id: Option<String>,
    pub kind: FailureKind,
}

impl RelayFailure {
    fn local(kind: FailureKind, message: String) -> Self {
        Self {
            status: 500,
            message,
            request_id: None,
            kind,
        }
    }

    /// Whether this failure deserves another attempt.
    pub fn is_retryable(&self) -> bool {
        match self.kind {
            FailureKind::Timeout | FailureKind::Network => true,
            FailureKind::Http => is_retryable_status(self.status),
            FailureKind::Request => false,
        }
    }
}

/// Outcome of a relay call (or of a single attempt).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayResult {
    Success {
        body: String,
        request_id: Option<String>,
    },
    Failure(RelayFailure),
}

impl RelayResult {
    pub fn is_success(&self) -> bool {
        matches!(self, RelayResult::Success { .. })
    }
}

fn request_id_from(headers: &HeaderMap) -> Option<String> {
    REQUEST_ID_HEADERS.iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    })
}

/// Whether an upstream body is an HTML page (typically a proxy error page)
/// rather than a protocol payload.
pub fn is_html_body(body: &str) -> bool {
    let head: String = body.trim_start().chars().take(16).collect();
    let head = head.to_ascii_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html")
}

fn classify_transport_error(error: &reqwest::Error) -> FailureKind {
    if error.is_builder() || error.is_decode() || error.is_redirect() {
        FailureKind::Request
    } else if error.is_timeout() {
        FailureKind::Timeout
    } else {
        FailureKind::Network
    }
}

// =============================================================================
// Client
// =============================================================================

/// Retrying relay client.
///
/// Holds no per-call state: the only shared pieces are the connection pool of
/// the inner `reqwest::Client` and the jitter random source.
pub struct RelayClient {
    client: reqwest::Client,
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl Default for RelayClient {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

impl fmt::Debug for RelayClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayClient").finish_non_exhaustive()
    }
}

impl RelayClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_rng(client, StdRng::from_entropy())
    }

    /// Client with an explicit jitter source (deterministic in tests).
    pub fn with_rng(client: reqwest::Client, rng: impl RngCore + Send + 'static) -> Self {
        Self {
            client,
            rng: Mutex::new(Box::new(rng)),
        }
    }

    /// Run the request under `policy`, returning the final attempt's outcome.
    pub async fn relay(&self, request: &RelayRequest, policy: &RetryPolicy) -> RelayResult {
        let mut attempt: u32 = 1;

        loop {
            debug!(
                url = %request.url,
                attempt,
                max_attempts = policy.max_attempts,
                "Relay attempt"
            );

            let failure = match self.attempt(request, policy.per_attempt_timeout).await {
                success @ RelayResult::Success { .. } => {
                    if attempt > 1 {
                        info!(attempt, "Relay succeeded after retry");
                    }
                    return success;
                }
                RelayResult::Failure(failure) => failure,
            };

            if !failure.is_retryable() || !policy.has_attempts_left(attempt) {
                warn!(
                    status = failure.status,
                    kind = ?failure.kind,
                    request_id = ?failure.request_id,
                    attempt,
                    "Relay failed"
                );
                return RelayResult::Failure(failure);
            }

            let delay = {
                let mut rng = self.rng.lock();
                policy.delay_for(failure.kind, attempt, rng.as_mut())
            };
            info!(
                status = failure.status,
                kind = ?failure.kind,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Relay attempt failed, backing off"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn attempt(&self, request: &RelayRequest, timeout: Duration) -> RelayResult {
        let builder = request.build(&self.client);

        let exchange = async {
            let response = builder.send().await?;
            let status = response.status().as_u16();
            let request_id = request_id_from(response.headers());
            let body = response.text().await?;
            Ok::<_, reqwest::Error>((status, request_id, body))
        };

        match tokio::time::timeout(timeout, exchange).await {
            Err(_) => RelayResult::Failure(RelayFailure::local(
                FailureKind::Timeout,
                format!(
                    "Timed out waiting for upstream (aborted after {}ms)",
                    timeout.as_millis()
                ),
            )),
            Ok(Err(e)) => {
                let kind = classify_transport_error(&e);
                RelayResult::Failure(RelayFailure::local(kind, e.to_string()))
            }
            Ok(Ok((status, request_id, body))) if (200..300).contains(&status) => {
                RelayResult::Success { body, request_id }
            }
            Ok(Ok((status, request_id, body))) => RelayResult::Failure(RelayFailure {
                status,
                message: body,
                request_id,
                kind: FailureKind::Http,
            }),
        }
    }
}

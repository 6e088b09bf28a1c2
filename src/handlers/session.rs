//! Session signaling endpoint.
//!
//! `POST /session` takes a session offer as `application/sdp` (or
//! `text/plain`) text, forwards it upstream together with the session
//! descriptor, and returns the upstream answer as `application/sdp`.
//!
//! Failures are answered with a JSON body:
//!
//! ```json
//! { "error": "openai_error", "status": 401, "request_id": "req_...", "message": "..." }
//! ```

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::core::relay::{FailureKind, RelayRequest, RelayResult, is_html_body};
use crate::errors::{AppError, AppResult};
use crate::state::AppState;

/// Content types accepted for the offer body.
const ACCEPTED_CONTENT_TYPES: [&str; 2] = ["application/sdp", "text/plain"];

/// Inbound correlation header, forwarded upstream as [`CLIENT_REQUEST_ID_HEADER`].
const REQUEST_ID_HEADER: &str = "x-request-id";

/// Upstream header carrying the caller's correlation id.
const CLIENT_REQUEST_ID_HEADER: &str = "x-client-request-id";

/// Number of upstream body characters written to the log on failure.
const LOGGED_BODY_CHARS: usize = 800;

const HTML_GATEWAY_MESSAGE: &str = "OpenAI gateway timeout (upstream returned an HTML error page)";

/// Exchange a session offer for an answer.
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match relay_offer(&state, &headers, body).await {
        Ok(answer) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, HeaderValue::from_static("application/sdp"))],
            answer,
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

async fn relay_offer(state: &AppState, headers: &HeaderMap, body: Bytes) -> AppResult<String> {
    let config = &state.config;

    let api_key = config
        .openai_api_key
        .as_deref()
        .ok_or(AppError::MissingApiKey)?;

    let offer = extract_offer(headers, &body)?;

    let session = config
        .session_config()
        .ok_or(AppError::MissingRealtimeModel)?;

    info!(model = %session.model, voice = %session.voice(), "Relaying session offer");

    let session_json = serde_json::to_string(&session)
        .map_err(|e| AppError::Server(format!("Failed to encode session config: {e}")))?;

    let mut request = RelayRequest::post(config.realtime_calls_url.as_str())
        .bearer(api_key)
        .multipart(vec![
            ("sdp".to_string(), offer),
            ("session".to_string(), session_json),
        ]);
    if let Some(id) = client_request_id(headers) {
        request = request.header(CLIENT_REQUEST_ID_HEADER, id);
    }

    let result = state.relay.relay(&request, &state.retry_policy).await;
    classify_relay_result(result)
}

/// Validate the request body and return the offer text.
fn extract_offer(headers: &HeaderMap, body: &[u8]) -> AppResult<String> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            v.split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
        .unwrap_or_default();

    if !ACCEPTED_CONTENT_TYPES.contains(&content_type.as_str()) {
        warn!(content_type = %content_type, "Rejecting session offer with unsupported content type");
        return Err(AppError::MissingSdp);
    }

    let offer = std::str::from_utf8(body).map_err(|_| AppError::MissingSdp)?;
    if offer.is_empty() {
        return Err(AppError::MissingSdp);
    }

    Ok(offer.to_string())
}

/// Caller-supplied correlation id, if it is printable and non-blank.
fn client_request_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn log_upstream_failure(status: u16, request_id: Option<&str>, body: &str) {
    let excerpt: String = body.chars().take(LOGGED_BODY_CHARS).collect();
    error!(status, request_id = ?request_id, "Upstream session call failed");
    error!(body = %excerpt, "Upstream error body (first {LOGGED_BODY_CHARS} chars)");
}

/// Map the final relay outcome to an answer or a client-facing error.
pub fn classify_relay_result(result: RelayResult) -> AppResult<String> {
    match result {
        RelayResult::Success { body, request_id } => {
            if is_html_body(&body) {
                log_upstream_failure(200, request_id.as_deref(), &body);
                return Err(AppError::GatewayTimeout {
                    request_id,
                    message: HTML_GATEWAY_MESSAGE.to_string(),
                });
            }
            Ok(body)
        }
        RelayResult::Failure(failure) => {
            log_upstream_failure(failure.status, failure.request_id.as_deref(), &failure.message);

            if is_html_body(&failure.message) {
                return Err(AppError::GatewayTimeout {
                    request_id: failure.request_id,
                    message: HTML_GATEWAY_MESSAGE.to_string(),
                });
            }

            match failure.kind {
                FailureKind::Timeout => Err(AppError::GatewayTimeout {
                    request_id: failure.request_id,
                    message: failure.message,
                }),
                FailureKind::Network | FailureKind::Request => Err(AppError::Server(failure.message)),
                FailureKind::Http => {
                    let message = if failure.message.trim().is_empty() {
                        format!("OpenAI error ({})", failure.status)
                    } else {
                        failure.message
                    };
                    if failure.status == 504 {
                        Err(AppError::GatewayTimeout {
                            request_id: failure.request_id,
                            message,
                        })
                    } else {
                        Err(AppError::Upstream {
                            status: failure.status,
                            request_id: failure.request_id,
                            message,
                        })
                    }
                }
            }
        }
    }
}

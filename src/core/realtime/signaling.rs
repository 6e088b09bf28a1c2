//! HTTP client for the gateway's `/session` endpoint.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use super::base::{SessionAnswer, SessionOffer, SignalingError, SignalingExchange};
use crate::core::relay::is_html_body;

/// User-facing text for an HTML error page returned in place of an answer.
pub const GATEWAY_TIMEOUT_MESSAGE: &str = "OpenAI gateway timeout (504). Retry Connect.";

/// JSON body returned by the signaling server.
#[derive(Debug, Default, Deserialize)]
struct SignalingJson {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    sdp: Option<String>,
}

/// Posts offers to `<base>/session` and returns the answer.
#[derive(Debug, Clone)]
pub struct HttpSignalingClient {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpSignalingClient {
    /// Client for the gateway rooted at `base_url`.
    pub fn new(base_url: &str) -> Result<Self, SignalingError> {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Result<Self, SignalingError> {
        let endpoint = format!("{}/session", base_url.trim_end_matches('/'));
        let endpoint = Url::parse(&endpoint)
            .map_err(|e| SignalingError::Request(format!("Invalid signaling URL: {e}")))?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl SignalingExchange for HttpSignalingClient {
    async fn exchange(&self, offer: SessionOffer) -> Result<SessionAnswer, SignalingError> {
        debug!(endpoint = %self.endpoint, "Submitting session offer");

        let response = self
            .client
            .post(self.endpoint.clone())
            .header(http::header::CONTENT_TYPE, "application/sdp")
            .body(offer.into_sdp())
            .send()
            .await
            .map_err(|e| SignalingError::Request(e.to_string()))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response
            .text()
            .await
            .map_err(|e| SignalingError::Request(e.to_string()))?;

        let result = interpret_response(status.is_success(), status.as_u16(), &content_type, &body);
        if let Err(e) = &result {
            warn!(status = status.as_u16(), error = %e, "Signaling exchange failed");
        }
        result
    }
}

/// Turn a signaling response into an answer or a user-facing error.
pub fn interpret_response(
    ok: bool,
    status: u16,
    content_type: &str,
    body: &str,
) -> Result<SessionAnswer, SignalingError> {
    if content_type.contains("application/json") {
        let json: SignalingJson =
            serde_json::from_str(body).map_err(|_| SignalingError::UnexpectedResponse)?;

        if !ok {
            let message = [json.message, json.error]
                .into_iter()
                .flatten()
                .find(|m| !m.is_empty())
                .unwrap_or_else(|| "Server error".to_string());
            return Err(SignalingError::Server(message));
        }

        return match json.sdp {
            Some(sdp) if !sdp.is_empty() => Ok(SessionAnswer::new(sdp)),
            _ => Err(SignalingError::UnexpectedResponse),
        };
    }

    if !ok {
        if is_html_body(body) {
            return Err(SignalingError::Server(GATEWAY_TIMEOUT_MESSAGE.to_string()));
        }
        if body.trim().is_empty() {
            return Err(SignalingError::Server(format!("Server error ({status})")));
        }
        return Err(SignalingError::Server(body.to_string()));
    }

    Ok(SessionAnswer::new(body))
}

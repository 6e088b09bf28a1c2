use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Errors returned by the signaling endpoint.
///
/// Each variant maps to a stable `error` code in the JSON body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    #[error("Missing OPENAI_API_KEY")]
    MissingApiKey,

    #[error("Missing SDP offer (body must be SDP text)")]
    MissingSdp,

    #[error("Missing REALTIME_MODEL")]
    MissingRealtimeModel,

    /// Upstream timed out, answered 504, or returned an HTML error page
    #[error("{message}")]
    GatewayTimeout {
        request_id: Option<String>,
        message: String,
    },

    /// Upstream rejected the call
    #[error("{message}")]
    Upstream {
        status: u16,
        request_id: Option<String>,
        message: String,
    },

    /// The call could not be made
    #[error("{0}")]
    Server(String),
}

/// Result type for handlers.
pub type AppResult<T> = Result<T, AppError>;

/// JSON failure body.
#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<&'a str>,
    message: String,
}

impl AppError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::MissingApiKey => "missing_api_key",
            AppError::MissingSdp => "missing_sdp",
            AppError::MissingRealtimeModel => "missing_realtime_model",
            AppError::GatewayTimeout { .. } => "openai_gateway_timeout",
            AppError::Upstream { .. } => "openai_error",
            AppError::Server(_) => "server_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::MissingSdp => StatusCode::BAD_REQUEST,
            AppError::GatewayTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            AppError::Upstream { status, .. } => match StatusCode::from_u16(*status) {
                Ok(code) if code.is_client_error() || code.is_server_error() => code,
                _ => StatusCode::BAD_GATEWAY,
            },
            AppError::MissingApiKey | AppError::MissingRealtimeModel | AppError::Server(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn body(&self) -> ErrorBody<'_> {
        let (status, request_id) = match self {
            AppError::GatewayTimeout { request_id, .. } => (Some(504), request_id.as_deref()),
            AppError::Upstream {
                status, request_id, ..
            } => (Some(*status), request_id.as_deref()),
            _ => (None, None),
        };
        ErrorBody {
            error: self.code(),
            status,
            request_id,
            message: self.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.body())).into_response()
    }
}

//! Control-channel message types.
//!
//! Every frame is one JSON object discriminated by `type`.
//!
//! Client events (sent to the model):
//! - session.update - Adjust reply modalities and instructions
//!
//! Server events (received from the model):
//! - response.created - A reply started
//! - response.output_text.delta / response.text.delta - Reply text chunk
//! - response.done - Reply finished, carries the full output
//! - error - Error occurred
//!
//! Any other event type is accepted and ignored, except that a top-level
//! `error` field on it is still reported.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::config::{Modality, SESSION_UPDATE_INSTRUCTIONS};

// =============================================================================
// Client Events (sent to server)
// =============================================================================

/// Partial session settings carried by `session.update`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUpdate {
    pub output_modalities: Vec<Modality>,
    pub instructions: String,
}

/// Client events sent over the control channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionUpdate },
}

impl ClientEvent {
    /// The update sent once when the control channel opens: audio and text
    /// replies, with spoken answers.
    pub fn initial_session_update() -> Self {
        ClientEvent::SessionUpdate {
            session: SessionUpdate {
                output_modalities: vec![Modality::Audio, Modality::Text],
                instructions: SESSION_UPDATE_INSTRUCTIONS.to_string(),
            },
        }
    }
}

// =============================================================================
// Server Events (received from server)
// =============================================================================

/// Error payload reported by the model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default, rename = "type")]
    pub error_type: Option<String>,
}

impl ApiError {
    /// Human-readable text: the message, else the code, else `"error"`.
    pub fn display_message(&self) -> &str {
        [self.message.as_deref(), self.code.as_deref()]
            .into_iter()
            .flatten()
            .find(|s| !s.is_empty())
            .unwrap_or("error")
    }
}

/// One content part of a reply output item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ContentPart {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub transcript: Option<String>,
}

/// One output item of a reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct OutputItem {
    #[serde(default)]
    pub content: Vec<ContentPart>,
}

/// Terminal status detail of a reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StatusDetails {
    #[serde(default)]
    pub error: Option<ApiError>,
}

/// Reply payload of `response.created` / `response.done`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub output: Vec<OutputItem>,
    #[serde(default)]
    pub status_details: Option<StatusDetails>,
}

impl Response {
    /// Concatenation of every `text` and `transcript` string in the output.
    pub fn full_text(&self) -> String {
        self.output
            .iter()
            .flat_map(|item| item.content.iter())
            .flat_map(|part| [part.text.as_deref(), part.transcript.as_deref()])
            .flatten()
            .collect()
    }

    pub fn error(&self) -> Option<&ApiError> {
        self.status_details.as_ref()?.error.as_ref()
    }
}

/// Server events received over the control channel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Reply text chunk
    #[serde(rename = "response.output_text.delta", alias = "response.text.delta")]
    TextDelta {
        #[serde(default)]
        delta: Option<String>,
    },

    /// Reply started
    #[serde(rename = "response.created")]
    ResponseCreated {
        #[serde(default)]
        response: Option<Response>,
    },

    /// Reply finished
    #[serde(rename = "response.done")]
    ResponseDone {
        #[serde(default)]
        response: Response,
    },

    /// Error occurred
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        error: ApiError,
    },

    /// Any other event type
    #[serde(other)]
    Unknown,
}

impl ServerEvent {
    /// Parse one frame.
    ///
    /// Returns `None` for text that is not JSON or does not match the shape of
    /// its declared type. A frame without a recognised type that carries a
    /// top-level `error` object is surfaced as [`ServerEvent::Error`].
    pub fn parse(raw: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(raw).ok()?;
        match ServerEvent::deserialize(&value) {
            Ok(ServerEvent::Unknown) => Some(top_level_error(&value).unwrap_or(ServerEvent::Unknown)),
            Ok(event) => Some(event),
            Err(_) => top_level_error(&value),
        }
    }
}

fn top_level_error(value: &Value) -> Option<ServerEvent> {
    let error = value.get("error").filter(|e| !e.is_null())?;
    let error = ApiError::deserialize(error).unwrap_or_default();
    Some(ServerEvent::Error { error })
}

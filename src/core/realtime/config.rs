//! Realtime session configuration types.
//!
//! - Model and voice defaults
//! - Model identifier policy
//! - The session descriptor sent upstream alongside the offer

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upstream endpoint that accepts an offer and returns an answer.
pub const DEFAULT_REALTIME_CALLS_URL: &str = "https://api.openai.com/v1/realtime/calls";

/// Model used when none is configured and the policy allows a fallback.
pub const DEFAULT_REALTIME_MODEL: &str = "gpt-realtime";

/// Voice used when none is configured.
pub const DEFAULT_REALTIME_VOICE: &str = "marin";

/// Label of the control channel opened on the transport.
pub const CONTROL_CHANNEL_LABEL: &str = "oai-events";

/// Instructions sent in the `session.update` issued when the control channel opens.
pub const SESSION_UPDATE_INSTRUCTIONS: &str =
    "You are a helpful voice assistant. Always speak your replies.";

// =============================================================================
// Model Policy
// =============================================================================

/// How a missing model identifier is handled by the signaling endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelPolicy {
    /// Fall back to [`DEFAULT_REALTIME_MODEL`]
    #[default]
    Default,
    /// Reject the request when no model is configured
    Required,
}

impl ModelPolicy {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Required => "required",
        }
    }

    /// Resolve the model to use, or `None` when the policy rejects a missing one.
    pub fn resolve(&self, configured: Option<&str>) -> Option<String> {
        match configured.map(str::trim).filter(|m| !m.is_empty()) {
            Some(model) => Some(model.to_string()),
            None => match self {
                Self::Default => Some(DEFAULT_REALTIME_MODEL.to_string()),
                Self::Required => None,
            },
        }
    }
}

impl std::fmt::Display for ModelPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A configuration string that names no known policy or modality.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized {kind} {value:?}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Accepts `default` and `required`, case-insensitively.
impl FromStr for ModelPolicy {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "required" => Ok(Self::Required),
            _ => Err(UnknownVariant {
                kind: "model policy",
                value: s.to_string(),
            }),
        }
    }
}

// =============================================================================
// Modalities
// =============================================================================

/// Output modality of the model's replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Audio,
    Text,
}

impl Modality {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Text => "text",
        }
    }

    /// Parse a comma-separated list such as `"audio,text"`.
    ///
    /// Blank entries are skipped; duplicates keep their first position.
    pub fn parse_list(s: &str) -> Result<Vec<Self>, UnknownVariant> {
        let mut modalities = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let modality = part.parse()?;
            if !modalities.contains(&modality) {
                modalities.push(modality);
            }
        }
        Ok(modalities)
    }
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Modality {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Self::Audio, Self::Text]
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownVariant {
                kind: "output modality",
                value: s.to_string(),
            })
    }
}

// =============================================================================
// Session Descriptor
// =============================================================================

/// Discriminant of the session descriptor. Always `"realtime"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionType {
    #[default]
    Realtime,
}

/// Output audio settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioOutputConfig {
    pub voice: String,
}

/// Audio settings of the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioConfig {
    pub output: AudioOutputConfig,
}

/// Session descriptor submitted upstream with every offer.
///
/// Built once per signaling request and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(rename = "type")]
    pub session_type: SessionType,

    pub model: String,

    pub audio: AudioConfig,

    /// Reply modalities; omitted to keep the upstream default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_modalities: Option<Vec<Modality>>,

    /// System instructions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

impl SessionConfig {
    pub fn new(model: impl Into<String>, voice: impl Into<String>) -> Self {
        Self {
            session_type: SessionType::Realtime,
            model: model.into(),
            audio: AudioConfig {
                output: AudioOutputConfig {
                    voice: voice.into(),
                },
            },
            output_modalities: None,
            instructions: None,
        }
    }

    pub fn with_instructions(mut self, instructions: Option<String>) -> Self {
        self.instructions = instructions.filter(|i| !i.trim().is_empty());
        self
    }

    pub fn with_output_modalities(mut self, modalities: Vec<Modality>) -> Self {
        self.output_modalities = Some(modalities);
        self
    }

    pub fn voice(&self) -> &str {
        &self.audio.output.voice
    }
}

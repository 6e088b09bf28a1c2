//! Inbound event stream interpretation.
//!
//! Keeps the transcript of the assistant turn in progress and publishes it as
//! a subtitle. Frames are applied strictly in arrival order.
//!
//! Overlapping turns are not tracked: a `response.created` for a new turn
//! arriving before the previous `response.done` clears the shared buffer.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use super::activity::ActivityLog;
use super::messages::{ApiError, ServerEvent};

/// Subtitle shown while a reply is being generated.
pub const THINKING_PLACEHOLDER: &str = "…";

/// Subtitle shown when there is no text.
pub const EMPTY_SUBTITLE: &str = "—";

/// Map a subtitle value to what presentation should show.
pub fn subtitle_or_placeholder(text: &str) -> &str {
    if text.trim().is_empty() {
        EMPTY_SUBTITLE
    } else {
        text
    }
}

/// Committed and interim text of one assistant turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptBuffer {
    committed: String,
    interim: String,
}

impl TranscriptBuffer {
    pub fn clear(&mut self) {
        self.committed.clear();
        self.interim.clear();
    }

    pub fn push_delta(&mut self, delta: &str) {
        self.interim.push_str(delta);
    }

    /// Replace everything with the final text of the turn.
    pub fn commit(&mut self, text: String) {
        self.committed = text;
        self.interim.clear();
    }

    pub fn text(&self) -> String {
        format!("{}{}", self.committed, self.interim)
    }

    pub fn is_empty(&self) -> bool {
        self.committed.is_empty() && self.interim.is_empty()
    }
}

/// What a single frame did to the parser state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    /// Transcript changed and was published
    Transcript(String),
    /// A new reply started and the buffer was cleared
    TurnStarted,
    /// An error was reported to the activity log
    Error(String),
    /// Recognised but without effect (blank delta, empty final text, other types)
    Ignored,
    /// Not parseable; state untouched
    Discarded,
}

/// Applies server events to a [`TranscriptBuffer`] and publishes the result.
pub struct EventParser {
    buffer: TranscriptBuffer,
    subtitle: Arc<watch::Sender<String>>,
    log: ActivityLog,
}

impl EventParser {
    pub fn new(subtitle: Arc<watch::Sender<String>>, log: ActivityLog) -> Self {
        Self {
            buffer: TranscriptBuffer::default(),
            subtitle,
            log,
        }
    }

    pub fn buffer(&self) -> &TranscriptBuffer {
        &self.buffer
    }

    /// Apply one raw frame.
    pub fn handle_message(&mut self, raw: &str) -> ParseOutcome {
        match ServerEvent::parse(raw) {
            Some(event) => self.handle_event(event),
            None => {
                debug!(len = raw.len(), "Discarding malformed control message");
                ParseOutcome::Discarded
            }
        }
    }

    pub fn handle_event(&mut self, event: ServerEvent) -> ParseOutcome {
        match event {
            ServerEvent::TextDelta { delta } => match delta {
                Some(delta) if !delta.trim().is_empty() => {
                    self.buffer.push_delta(&delta);
                    self.publish_transcript()
                }
                _ => ParseOutcome::Ignored,
            },
            ServerEvent::ResponseCreated { .. } => {
                self.buffer.clear();
                self.subtitle.send_replace(THINKING_PLACEHOLDER.to_string());
                ParseOutcome::TurnStarted
            }
            ServerEvent::ResponseDone { response } => {
                let error = response.error().cloned();
                let text = response.full_text();
                let text = text.trim();

                let outcome = if text.is_empty() {
                    ParseOutcome::Ignored
                } else {
                    self.buffer.commit(text.to_string());
                    self.publish_transcript()
                };

                match error {
                    Some(error) => self.report(&error),
                    None => outcome,
                }
            }
            ServerEvent::Error { error } => self.report(&error),
            ServerEvent::Unknown => ParseOutcome::Ignored,
        }
    }

    /// Drop the transcript and publish an empty subtitle.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.subtitle.send_replace(String::new());
    }

    fn publish_transcript(&mut self) -> ParseOutcome {
        let text = self.buffer.text();
        self.subtitle.send_replace(text.clone());
        ParseOutcome::Transcript(text)
    }

    fn report(&self, error: &ApiError) -> ParseOutcome {
        let message = error.display_message().to_string();
        self.log.push(format!("[error] {message}"));
        ParseOutcome::Error(message)
    }
}

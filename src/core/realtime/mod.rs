//! Client side of a realtime voice session.
//!
//! This module negotiates a peer-to-peer media session with a cloud speech
//! model through the gateway's signaling endpoint, then turns the inbound
//! control-channel event stream into presentation signals.
//!
//! # Architecture
//!
//! - `RealtimeSession` owns the lifecycle state machine
//! - `EventParser` maintains the assistant transcript
//! - Level monitors turn audio taps into `[0, 1]` level signals
//! - Transport, capture and signaling are trait seams (`base`)
//!
//! # Signals
//!
//! - `user_level` / `assistant_level`: latest energy estimate per speaker
//! - assistant subtitle: committed + interim text of the current reply
//! - user subtitle: local speech-to-text captions

mod activity;
mod base;
pub mod config;
pub mod level;
pub mod messages;
pub mod parser;
mod session;
mod signaling;

pub use activity::{ActivityLog, DEFAULT_ACTIVITY_CAPACITY};
pub use base::{
    AudioTap, CaptureError, CapturedMedia, ChannelEvent, ChannelEvents, ConnectionState,
    ControlChannel, MediaCapture, MediaTrack, PeerTransport, RemoteTrack, SessionAnswer,
    SessionError, SessionOffer, SessionResult, SignalingError, SignalingExchange,
    TransportConnector, TransportError,
};
pub use config::{
    CONTROL_CHANNEL_LABEL, DEFAULT_REALTIME_CALLS_URL, DEFAULT_REALTIME_MODEL,
    DEFAULT_REALTIME_VOICE, Modality, ModelPolicy, SESSION_UPDATE_INSTRUCTIONS, SessionConfig,
    UnknownVariant,
};
pub use level::{LevelSignal, compute_level, run_level_monitor};
pub use messages::{ClientEvent, ServerEvent};
pub use parser::{
    EMPTY_SUBTITLE, EventParser, ParseOutcome, THINKING_PLACEHOLDER, TranscriptBuffer,
    subtitle_or_placeholder,
};
pub use session::{DisconnectHandle, RealtimeSession};
pub use signaling::{GATEWAY_TIMEOUT_MESSAGE, HttpSignalingClient, interpret_response};

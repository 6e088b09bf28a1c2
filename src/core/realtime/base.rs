//! Base traits and types for the client side of a realtime voice session.
//!
//! The peer-to-peer media transport, microphone capture and the signaling
//! round trip are external collaborators. They are modelled here as async
//! traits so the session negotiator can drive any implementation (a native
//! WebRTC stack in production, an in-memory double in tests).
//!
//! # Lifecycle
//!
//! ```text
//! Idle -> Negotiating -> Open -> Closing -> Closed
//!              |           |
//!              +-> Failed <+
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

// =============================================================================
// Error Types
// =============================================================================

/// Errors raised by the peer transport or its control channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The transport session could not be created
    #[error("Transport setup failed: {0}")]
    Setup(String),

    /// The control channel could not be opened or written to
    #[error("Control channel error: {0}")]
    Channel(String),

    /// Offer creation or answer application failed
    #[error("Negotiation failed: {0}")]
    Negotiation(String),

    /// The transport has already been closed
    #[error("Transport closed")]
    Closed,
}

/// Errors raised by local media capture.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// Permission to capture was refused
    #[error("Microphone permission denied")]
    PermissionDenied,

    /// No capture device is available
    #[error("No microphone available: {0}")]
    Unavailable(String),
}

/// Errors raised by the signaling round trip.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalingError {
    /// The request never produced a response
    #[error("Signaling request failed: {0}")]
    Request(String),

    /// The signaling server answered with an error; the text is user-facing
    #[error("{0}")]
    Server(String),

    /// A JSON success response carried no answer descriptor
    #[error("Unexpected JSON response")]
    UnexpectedResponse,
}

/// Errors returned by [`RealtimeSession`](super::RealtimeSession) lifecycle methods.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Signaling(#[from] SignalingError),

    /// The requested lifecycle operation is not legal in the current state
    #[error("Cannot {operation} while {state}")]
    InvalidTransition {
        state: ConnectionState,
        operation: &'static str,
    },
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

// =============================================================================
// Connection State
// =============================================================================

/// Lifecycle state of one realtime session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Never connected
    #[default]
    Idle,
    /// Offer/answer exchange in progress
    Negotiating,
    /// Control channel and media are live
    Open,
    /// Teardown in progress
    Closing,
    /// Torn down after an explicit disconnect
    Closed,
    /// Torn down after a negotiation or transport failure
    Failed,
}

impl ConnectionState {
    /// Whether `connect()` may start from this state.
    pub fn can_connect(&self) -> bool {
        matches!(self, Self::Idle | Self::Failed | Self::Closed)
    }

    /// Whether `disconnect()` has any work to do from this state.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Negotiating | Self::Open)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Idle => write!(f, "Idle"),
            ConnectionState::Negotiating => write!(f, "Negotiating"),
            ConnectionState::Open => write!(f, "Open"),
            ConnectionState::Closing => write!(f, "Closing"),
            ConnectionState::Closed => write!(f, "Closed"),
            ConnectionState::Failed => write!(f, "Failed"),
        }
    }
}

// =============================================================================
// Session Descriptors
// =============================================================================

/// Local session descriptor. Consumed by value when submitted for exchange.
#[derive(Debug, PartialEq, Eq)]
pub struct SessionOffer(String);

impl SessionOffer {
    pub fn new(sdp: impl Into<String>) -> Self {
        Self(sdp.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_sdp(self) -> String {
        self.0
    }
}

/// Remote session descriptor. Consumed by value when applied to the transport.
#[derive(Debug, PartialEq, Eq)]
pub struct SessionAnswer(String);

impl SessionAnswer {
    pub fn new(sdp: impl Into<String>) -> Self {
        Self(sdp.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_sdp(self) -> String {
        self.0
    }
}

// =============================================================================
// Media
// =============================================================================

/// Opaque handle of a media track attached to or received from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTrack {
    pub id: String,
}

impl MediaTrack {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Time-domain analysis tap on an audio stream.
///
/// Samples are unsigned 8-bit with the zero point at 128.
pub trait AudioTap: Send + Sync {
    /// Fill `window` with the most recent samples.
    ///
    /// Returns `false` once the underlying stream is no longer available.
    fn read_window(&self, window: &mut [u8]) -> bool;
}

/// Remote audio track delivered by the transport after negotiation.
#[derive(Clone)]
pub struct RemoteTrack {
    pub track: MediaTrack,
    pub tap: Arc<dyn AudioTap>,
}

impl fmt::Debug for RemoteTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteTrack")
            .field("track", &self.track)
            .finish_non_exhaustive()
    }
}

/// Everything a successful capture open hands to the session.
pub struct CapturedMedia {
    /// Track to attach to the transport
    pub track: MediaTrack,
    /// Level source for the local speaker
    pub tap: Arc<dyn AudioTap>,
    /// Local speech-to-text captions, when the platform provides them
    pub captions: Option<mpsc::Receiver<String>>,
}

/// Microphone capture with optional local captions.
#[async_trait]
pub trait MediaCapture: Send + Sync {
    /// Start capturing.
    async fn open(&self) -> Result<CapturedMedia, CaptureError>;

    /// Stop capturing and release the device. Must be safe to call repeatedly.
    async fn close(&self);
}

// =============================================================================
// Transport
// =============================================================================

/// Inbound notifications from the control channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The channel became writable
    Open,
    /// One text frame
    Message(String),
    /// The channel closed
    Closed,
    /// The underlying transport failed and will not recover
    TransportFailed(String),
}

/// Bidirectional ordered text channel multiplexed on the transport.
#[async_trait]
pub trait ControlChannel: Send + Sync {
    /// Send one text frame.
    async fn send(&self, text: String) -> Result<(), TransportError>;

    /// Whether the channel is currently writable.
    fn is_open(&self) -> bool;

    /// Close the channel. Must be safe to call repeatedly.
    async fn close(&self);
}

/// Receiver side of a control channel.
pub type ChannelEvents = mpsc::Receiver<ChannelEvent>;

/// One peer-to-peer transport session (one per connection attempt).
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Open a labelled control channel.
    async fn open_control_channel(
        &self,
        label: &str,
    ) -> Result<(Arc<dyn ControlChannel>, ChannelEvents), TransportError>;

    /// Attach a local media track.
    async fn add_local_track(&self, track: &MediaTrack) -> Result<(), TransportError>;

    /// Create the local offer and install it as the local description.
    async fn create_offer(&self) -> Result<SessionOffer, TransportError>;

    /// Install the remote answer.
    async fn apply_answer(&self, answer: SessionAnswer) -> Result<(), TransportError>;

    /// Take the stream of inbound remote tracks. Yields `None` after the first call.
    fn take_remote_tracks(&self) -> Option<mpsc::Receiver<RemoteTrack>>;

    /// Close the transport. Must be safe to call repeatedly.
    async fn close(&self);
}

/// Factory for transport sessions.
#[async_trait]
pub trait TransportConnector: Send + Sync {
    async fn create(&self) -> Result<Arc<dyn PeerTransport>, TransportError>;
}

// =============================================================================
// Signaling
// =============================================================================

/// Exchanges a local offer for a remote answer.
#[async_trait]
pub trait SignalingExchange: Send + Sync {
    async fn exchange(&self, offer: SessionOffer) -> Result<SessionAnswer, SignalingError>;
}

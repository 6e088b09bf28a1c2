//! Client-side realtime session negotiator.
//!
//! A [`RealtimeSession`] owns one connection lifecycle: it creates a transport,
//! opens the control channel, attaches the microphone, runs the offer/answer
//! exchange through a [`SignalingExchange`] and then keeps background tasks
//! running until the caller disconnects or the transport fails.
//!
//! # Example
//!
//! ```rust,ignore
//! use voice_session_gateway::core::realtime::{HttpSignalingClient, RealtimeSession};
//! use std::sync::Arc;
//!
//! let signaling = Arc::new(HttpSignalingClient::new("http://localhost:3000")?);
//! let mut session = RealtimeSession::new(connector, capture, signaling);
//!
//! session.connect().await?;
//! let levels = (session.user_level(), session.assistant_level());
//! session.disconnect().await;
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::activity::ActivityLog;
use super::base::{
    AudioTap, ChannelEvent, ChannelEvents, ConnectionState, ControlChannel, MediaCapture,
    PeerTransport, RemoteTrack, SessionError, SessionResult, SignalingExchange,
    TransportConnector,
};
use super::config::CONTROL_CHANNEL_LABEL;
use super::level::{LevelSignal, run_level_monitor};
use super::messages::ClientEvent;
use super::parser::{EventParser, subtitle_or_placeholder};

/// Requests a disconnect from outside the task that owns the session.
///
/// While `connect()` is in flight the request is honoured after the current
/// negotiation step; the session then releases everything and ends `Closed`.
/// A request made while the session is open is honoured by the next
/// [`RealtimeSession::poll_health`].
#[derive(Debug, Clone, Default)]
pub struct DisconnectHandle(Arc<AtomicBool>);

impl DisconnectHandle {
    pub fn request_disconnect(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Resources acquired for the current connection attempt.
#[derive(Default)]
struct Connection {
    transport: Option<Arc<dyn PeerTransport>>,
    channel: Option<Arc<dyn ControlChannel>>,
    events: Option<ChannelEvents>,
    remote_tracks: Option<mpsc::Receiver<RemoteTrack>>,
    capture_open: bool,
    local_tap: Option<Arc<dyn AudioTap>>,
    captions: Option<mpsc::Receiver<String>>,
    cancel: Option<CancellationToken>,
    tasks: Vec<JoinHandle<()>>,
}

enum Negotiation {
    Complete,
    Cancelled,
}

/// One realtime voice session.
pub struct RealtimeSession {
    connector: Arc<dyn TransportConnector>,
    capture: Arc<dyn MediaCapture>,
    signaling: Arc<dyn SignalingExchange>,

    state: ConnectionState,
    conn: Connection,
    disconnect: DisconnectHandle,
    fatal: Arc<Mutex<Option<String>>>,

    user_level: LevelSignal,
    assistant_level: LevelSignal,
    user_subtitle: Arc<watch::Sender<String>>,
    assistant_subtitle: Arc<watch::Sender<String>>,
    log: ActivityLog,
}

impl RealtimeSession {
    pub fn new(
        connector: Arc<dyn TransportConnector>,
        capture: Arc<dyn MediaCapture>,
        signaling: Arc<dyn SignalingExchange>,
    ) -> Self {
        let (user_subtitle, _) = watch::channel(String::new());
        let (assistant_subtitle, _) = watch::channel(String::new());

        Self {
            connector,
            capture,
            signaling,
            state: ConnectionState::Idle,
            conn: Connection::default(),
            disconnect: DisconnectHandle::default(),
            fatal: Arc::new(Mutex::new(None)),
            user_level: LevelSignal::new(),
            assistant_level: LevelSignal::new(),
            user_subtitle: Arc::new(user_subtitle),
            assistant_subtitle: Arc::new(assistant_subtitle),
            log: ActivityLog::default(),
        }
    }

    // ===== Observers =====

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn user_level(&self) -> f32 {
        self.user_level.get()
    }

    pub fn assistant_level(&self) -> f32 {
        self.assistant_level.get()
    }

    /// Shared handles to both level signals, for a renderer: `(user, assistant)`.
    pub fn level_signals(&self) -> (LevelSignal, LevelSignal) {
        (self.user_level.clone(), self.assistant_level.clone())
    }

    pub fn assistant_subtitle(&self) -> watch::Receiver<String> {
        self.assistant_subtitle.subscribe()
    }

    pub fn user_subtitle(&self) -> watch::Receiver<String> {
        self.user_subtitle.subscribe()
    }

    /// Current assistant subtitle as presented (`—` when empty).
    pub fn assistant_subtitle_text(&self) -> String {
        subtitle_or_placeholder(&self.assistant_subtitle.borrow()).to_string()
    }

    /// Current user subtitle as presented (`—` when empty).
    pub fn user_subtitle_text(&self) -> String {
        subtitle_or_placeholder(&self.user_subtitle.borrow()).to_string()
    }

    pub fn activity_log(&self) -> &ActivityLog {
        &self.log
    }

    pub fn disconnect_handle(&self) -> DisconnectHandle {
        self.disconnect.clone()
    }

    // ===== Lifecycle =====

    /// Negotiate a new connection.
    ///
    /// Legal from `Idle`, `Failed` and `Closed`. On failure every acquired
    /// resource is released, the state becomes `Failed` and the originating
    /// error is returned.
    pub async fn connect(&mut self) -> SessionResult<ConnectionState> {
        if !self.state.can_connect() {
            return Err(SessionError::InvalidTransition {
                state: self.state,
                operation: "connect",
            });
        }

        self.disconnect.clear();
        self.fatal.lock().take();
        self.transition(ConnectionState::Negotiating);

        match self.negotiate().await {
            Ok(Negotiation::Complete) => {
                self.start_tasks();
                self.transition(ConnectionState::Open);
                self.log.push("[webrtc] connected");
                Ok(ConnectionState::Open)
            }
            Ok(Negotiation::Cancelled) => Ok(self.close_after_request().await),
            Err(e) if self.disconnect.is_requested() => {
                debug!(error = %e, "Negotiation step failed after disconnect was requested");
                Ok(self.close_after_request().await)
            }
            Err(e) => {
                self.release().await;
                self.transition(ConnectionState::Failed);
                self.log.push(format!("connect failed: {e}"));
                Err(e)
            }
        }
    }

    /// Tear down the connection.
    ///
    /// From `Idle`, `Closed` or `Failed` this does nothing and returns the
    /// current state.
    pub async fn disconnect(&mut self) -> ConnectionState {
        if !self.state.is_active() {
            return self.state;
        }

        self.transition(ConnectionState::Closing);
        self.release().await;
        self.transition(ConnectionState::Closed);
        self.log.push("disconnected");
        ConnectionState::Closed
    }

    /// Observe failures recorded by background tasks.
    ///
    /// A fatal transport error moves an open session to `Failed` after
    /// releasing its resources. A pending [`DisconnectHandle`] request closes it.
    pub async fn poll_health(&mut self) -> ConnectionState {
        if self.state != ConnectionState::Open {
            return self.state;
        }

        let fatal = self.fatal.lock().take();
        if let Some(reason) = fatal {
            warn!(reason = %reason, "Transport failed, releasing session");
            self.release().await;
            self.transition(ConnectionState::Failed);
            return ConnectionState::Failed;
        }

        if self.disconnect.is_requested() {
            return self.disconnect().await;
        }

        self.state
    }

    // ===== Internals =====

    fn transition(&mut self, next: ConnectionState) {
        info!(from = %self.state, to = %next, "Realtime session state change");
        self.state = next;
    }

    async fn negotiate(&mut self) -> SessionResult<Negotiation> {
        let transport = self.connector.create().await?;
        self.conn.transport = Some(transport.clone());
        self.conn.remote_tracks = transport.take_remote_tracks();
        if self.disconnect.is_requested() {
            return Ok(Negotiation::Cancelled);
        }

        let (channel, events) = transport.open_control_channel(CONTROL_CHANNEL_LABEL).await?;
        self.conn.channel = Some(channel);
        self.conn.events = Some(events);
        if self.disconnect.is_requested() {
            return Ok(Negotiation::Cancelled);
        }

        let media = self.capture.open().await?;
        self.conn.capture_open = true;
        self.conn.local_tap = Some(media.tap);
        self.conn.captions = media.captions;
        transport.add_local_track(&media.track).await?;
        if self.disconnect.is_requested() {
            return Ok(Negotiation::Cancelled);
        }

        let offer = transport.create_offer().await?;
        if self.disconnect.is_requested() {
            return Ok(Negotiation::Cancelled);
        }

        let answer = self.signaling.exchange(offer).await?;
        if self.disconnect.is_requested() {
            return Ok(Negotiation::Cancelled);
        }

        transport.apply_answer(answer).await?;
        if self.disconnect.is_requested() {
            return Ok(Negotiation::Cancelled);
        }

        Ok(Negotiation::Complete)
    }

    async fn close_after_request(&mut self) -> ConnectionState {
        info!("Disconnect requested during negotiation");
        self.transition(ConnectionState::Closing);
        self.release().await;
        self.disconnect.clear();
        self.transition(ConnectionState::Closed);
        self.log.push("disconnected");
        ConnectionState::Closed
    }

    fn start_tasks(&mut self) {
        let cancel = CancellationToken::new();

        if let (Some(events), Some(channel)) = (self.conn.events.take(), self.conn.channel.clone())
        {
            let parser = EventParser::new(self.assistant_subtitle.clone(), self.log.clone());
            self.conn.tasks.push(tokio::spawn(run_event_pump(
                events,
                channel,
                parser,
                self.log.clone(),
                self.fatal.clone(),
                cancel.clone(),
            )));
        }

        if let Some(tap) = self.conn.local_tap.take() {
            self.conn.tasks.push(tokio::spawn(run_level_monitor(
                tap,
                self.user_level.clone(),
                cancel.clone(),
            )));
        }

        if let Some(tracks) = self.conn.remote_tracks.take() {
            self.conn.tasks.push(tokio::spawn(watch_remote_tracks(
                tracks,
                self.assistant_level.clone(),
                cancel.clone(),
            )));
        }

        if let Some(captions) = self.conn.captions.take() {
            self.conn.tasks.push(tokio::spawn(forward_captions(
                captions,
                self.user_subtitle.clone(),
                cancel.clone(),
            )));
        }

        self.conn.cancel = Some(cancel);
    }

    /// Release everything held by the current attempt. Best effort; never fails.
    async fn release(&mut self) {
        let conn = std::mem::take(&mut self.conn);

        if let Some(cancel) = &conn.cancel {
            cancel.cancel();
        }
        for task in conn.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Session task ended abnormally");
            }
        }

        if let Some(channel) = conn.channel {
            let was_open = channel.is_open();
            channel.close().await;
            if was_open {
                self.log.push("[dc] closed");
            }
        }
        if let Some(transport) = conn.transport {
            transport.close().await;
        }
        if conn.capture_open {
            self.capture.close().await;
        }

        self.user_level.reset();
        self.assistant_level.reset();
        self.user_subtitle.send_replace(String::new());
        self.assistant_subtitle.send_replace(String::new());
    }
}

impl Drop for RealtimeSession {
    fn drop(&mut self) {
        let conn = std::mem::take(&mut self.conn);
        if let Some(cancel) = &conn.cancel {
            cancel.cancel();
        }

        let holds_resources =
            conn.channel.is_some() || conn.transport.is_some() || conn.capture_open;
        if !holds_resources {
            return;
        }

        // Closing is async; without a runtime the collaborators' own drops are all we get.
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("Realtime session dropped outside a runtime; resources not closed");
            return;
        };
        let capture = conn.capture_open.then(|| self.capture.clone());
        debug!(state = %self.state, "Realtime session dropped, closing resources");

        handle.spawn(async move {
            if let Some(channel) = conn.channel {
                channel.close().await;
            }
            if let Some(transport) = conn.transport {
                transport.close().await;
            }
            if let Some(capture) = capture {
                capture.close().await;
            }
        });
    }
}

// =============================================================================
// Background Tasks
// =============================================================================

/// Consume control-channel events until cancelled or the transport fails.
async fn run_event_pump(
    mut events: ChannelEvents,
    channel: Arc<dyn ControlChannel>,
    mut parser: EventParser,
    log: ActivityLog,
    fatal: Arc<Mutex<Option<String>>>,
    cancel: CancellationToken,
) {
    let mut update_sent = false;

    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = events.recv() => event,
        };

        match event {
            Some(ChannelEvent::Open) => {
                log.push("[dc] open");
                if !update_sent {
                    update_sent = true;
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = send_session_update(channel.as_ref(), &log) => {}
                    }
                }
            }
            Some(ChannelEvent::Message(raw)) => {
                log.push(format!("[event] {raw}"));
                parser.handle_message(&raw);
            }
            Some(ChannelEvent::Closed) => log.push("[dc] closed"),
            Some(ChannelEvent::TransportFailed(reason)) => {
                log.push(format!("[error] {reason}"));
                *fatal.lock() = Some(reason);
                break;
            }
            None => {
                debug!("Control channel event stream ended");
                break;
            }
        }
    }

    parser.reset();
}

async fn send_session_update(channel: &dyn ControlChannel, log: &ActivityLog) {
    if !channel.is_open() {
        return;
    }
    let payload = match serde_json::to_string(&ClientEvent::initial_session_update()) {
        Ok(payload) => payload,
        Err(e) => {
            log.push(format!("[error] {e}"));
            return;
        }
    };
    if let Err(e) = channel.send(payload).await {
        log.push(format!("[error] {e}"));
    }
}

/// Wait for the remote audio track, then monitor its level.
async fn watch_remote_tracks(
    mut tracks: mpsc::Receiver<RemoteTrack>,
    level: LevelSignal,
    cancel: CancellationToken,
) {
    let remote = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        track = tracks.recv() => track,
    };

    if let Some(remote) = remote {
        info!(track = %remote.track.id, "Remote audio track received");
        run_level_monitor(remote.tap, level, cancel).await;
    }
}

/// Publish local captions as the user subtitle.
async fn forward_captions(
    mut captions: mpsc::Receiver<String>,
    subtitle: Arc<watch::Sender<String>>,
    cancel: CancellationToken,
) {
    loop {
        let text = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            text = captions.recv() => text,
        };
        match text {
            Some(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    subtitle.send_replace(text.to_string());
                }
            }
            None => break,
        }
    }

    subtitle.send_replace(String::new());
}

//! In-memory doubles for the realtime session seams.
//!
//! Counters track how many transports, control channels and capture devices
//! are currently open so tests can assert that every teardown path releases
//! what it acquired.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use voice_session_gateway::core::realtime::{
    AudioTap, CaptureError, CapturedMedia, ChannelEvent, ChannelEvents, ControlChannel,
    DisconnectHandle, MediaCapture, MediaTrack, PeerTransport, RemoteTrack, SessionAnswer,
    SessionOffer, SignalingError, SignalingExchange, TransportConnector, TransportError,
};

pub const MOCK_OFFER: &str = "v=0\r\no=- 1 1 IN IP4 127.0.0.1\r\ns=mock-offer\r\n";
pub const MOCK_ANSWER: &str = "v=0\r\no=- 2 2 IN IP4 127.0.0.1\r\ns=mock-answer\r\n";

/// Negotiation step at which the mock transport fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Create,
    OpenChannel,
    AddTrack,
    CreateOffer,
    ApplyAnswer,
}

/// Shared observation point for everything the mocks do.
#[derive(Default)]
pub struct MockHub {
    pub transports_created: AtomicUsize,
    pub open_transports: AtomicUsize,
    pub open_channels: AtomicUsize,
    pub open_captures: AtomicUsize,
    pub offers_seen: Mutex<Vec<String>>,
    pub answers_applied: Mutex<Vec<String>>,
    pub sent: Mutex<Vec<String>>,
    pub channel_labels: Mutex<Vec<String>>,
    /// When set, control-channel sends never complete.
    pub stall_sends: AtomicBool,
    events_tx: Mutex<Option<mpsc::Sender<ChannelEvent>>>,
    remote_tx: Mutex<Option<mpsc::Sender<RemoteTrack>>>,
    captions_tx: Mutex<Option<mpsc::Sender<String>>>,
}

impl MockHub {
    pub fn open_transports(&self) -> usize {
        self.open_transports.load(Ordering::SeqCst)
    }

    pub fn open_channels(&self) -> usize {
        self.open_channels.load(Ordering::SeqCst)
    }

    pub fn open_captures(&self) -> usize {
        self.open_captures.load(Ordering::SeqCst)
    }

    /// Push an inbound control-channel event.
    pub async fn emit(&self, event: ChannelEvent) {
        let tx = self.events_tx.lock().clone();
        if let Some(tx) = tx {
            let _ = tx.send(event).await;
        }
    }

    pub async fn emit_message(&self, raw: &str) {
        self.emit(ChannelEvent::Message(raw.to_string())).await;
    }

    /// Deliver a remote audio track.
    pub async fn deliver_remote_track(&self, tap: Arc<dyn AudioTap>) {
        let tx = self.remote_tx.lock().clone();
        if let Some(tx) = tx {
            let _ = tx
                .send(RemoteTrack {
                    track: MediaTrack::new("remote-audio"),
                    tap,
                })
                .await;
        }
    }

    /// Push a local caption.
    pub async fn caption(&self, text: &str) {
        let tx = self.captions_tx.lock().clone();
        if let Some(tx) = tx {
            let _ = tx.send(text.to_string()).await;
        }
    }

    pub fn sent_messages(&self) -> Vec<String> {
        self.sent.lock().clone()
    }
}

// =============================================================================
// Audio
// =============================================================================

/// Tap that always returns the same sample value.
pub struct ConstantTap {
    sample: u8,
    available: AtomicBool,
}

impl ConstantTap {
    pub fn new(sample: u8) -> Arc<Self> {
        Arc::new(Self {
            sample,
            available: AtomicBool::new(true),
        })
    }

    pub fn end(&self) {
        self.available.store(false, Ordering::SeqCst);
    }
}

impl AudioTap for ConstantTap {
    fn read_window(&self, window: &mut [u8]) -> bool {
        if !self.available.load(Ordering::SeqCst) {
            return false;
        }
        window.fill(self.sample);
        true
    }
}

// =============================================================================
// Transport
// =============================================================================

pub struct MockChannel {
    hub: Arc<MockHub>,
    open: AtomicBool,
    closed: AtomicBool,
}

#[async_trait]
impl ControlChannel for MockChannel {
    async fn send(&self, text: String) -> Result<(), TransportError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(TransportError::Channel("channel not open".to_string()));
        }
        if self.hub.stall_sends.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.hub.sent.lock().push(text);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.hub.open_channels.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

pub struct MockTransport {
    hub: Arc<MockHub>,
    fail_at: Option<FailAt>,
    channel_opens_immediately: bool,
    closed: AtomicBool,
    remote_rx: Mutex<Option<mpsc::Receiver<RemoteTrack>>>,
    channel: Mutex<Option<Arc<MockChannel>>>,
}

impl MockTransport {
    fn fail(&self, step: FailAt) -> Result<(), TransportError> {
        if self.fail_at == Some(step) {
            return Err(TransportError::Negotiation(format!("mock failure at {step:?}")));
        }
        Ok(())
    }
}

#[async_trait]
impl PeerTransport for MockTransport {
    async fn open_control_channel(
        &self,
        label: &str,
    ) -> Result<(Arc<dyn ControlChannel>, ChannelEvents), TransportError> {
        self.fail(FailAt::OpenChannel)?;

        let (tx, rx) = mpsc::channel(64);
        let channel = Arc::new(MockChannel {
            hub: self.hub.clone(),
            open: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });
        self.hub.open_channels.fetch_add(1, Ordering::SeqCst);
        self.hub.channel_labels.lock().push(label.to_string());
        *self.hub.events_tx.lock() = Some(tx);
        *self.channel.lock() = Some(channel.clone());

        Ok((channel, rx))
    }

    async fn add_local_track(&self, _track: &MediaTrack) -> Result<(), TransportError> {
        self.fail(FailAt::AddTrack)
    }

    async fn create_offer(&self) -> Result<SessionOffer, TransportError> {
        self.fail(FailAt::CreateOffer)?;
        Ok(SessionOffer::new(MOCK_OFFER))
    }

    async fn apply_answer(&self, answer: SessionAnswer) -> Result<(), TransportError> {
        self.fail(FailAt::ApplyAnswer)?;
        self.hub.answers_applied.lock().push(answer.into_sdp());

        if self.channel_opens_immediately {
            let channel = self.channel.lock().clone();
            if let Some(channel) = channel {
                channel.open.store(true, Ordering::SeqCst);
                let tx = self.hub.events_tx.lock().clone();
                if let Some(tx) = tx {
                    let _ = tx.send(ChannelEvent::Open).await;
                }
            }
        }
        Ok(())
    }

    fn take_remote_tracks(&self) -> Option<mpsc::Receiver<RemoteTrack>> {
        self.remote_rx.lock().take()
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.hub.open_transports.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

pub struct MockConnector {
    pub hub: Arc<MockHub>,
    pub fail_at: Option<FailAt>,
    pub channel_opens_immediately: bool,
}

impl MockConnector {
    pub fn new(hub: Arc<MockHub>) -> Self {
        Self {
            hub,
            fail_at: None,
            channel_opens_immediately: true,
        }
    }

    pub fn failing_at(hub: Arc<MockHub>, step: FailAt) -> Self {
        Self {
            fail_at: Some(step),
            ..Self::new(hub)
        }
    }
}

#[async_trait]
impl TransportConnector for MockConnector {
    async fn create(&self) -> Result<Arc<dyn PeerTransport>, TransportError> {
        if self.fail_at == Some(FailAt::Create) {
            return Err(TransportError::Setup("mock failure at Create".to_string()));
        }

        let (remote_tx, remote_rx) = mpsc::channel(4);
        *self.hub.remote_tx.lock() = Some(remote_tx);
        self.hub.transports_created.fetch_add(1, Ordering::SeqCst);
        self.hub.open_transports.fetch_add(1, Ordering::SeqCst);

        Ok(Arc::new(MockTransport {
            hub: self.hub.clone(),
            fail_at: self.fail_at,
            channel_opens_immediately: self.channel_opens_immediately,
            closed: AtomicBool::new(false),
            remote_rx: Mutex::new(Some(remote_rx)),
            channel: Mutex::new(None),
        }))
    }
}

// =============================================================================
// Capture
// =============================================================================

pub struct MockCapture {
    hub: Arc<MockHub>,
    tap: Arc<ConstantTap>,
    deny: bool,
    is_open: AtomicBool,
}

impl MockCapture {
    pub fn new(hub: Arc<MockHub>, tap: Arc<ConstantTap>) -> Self {
        Self {
            hub,
            tap,
            deny: false,
            is_open: AtomicBool::new(false),
        }
    }

    pub fn denied(hub: Arc<MockHub>) -> Self {
        Self {
            deny: true,
            ..Self::new(hub, ConstantTap::new(128))
        }
    }
}

#[async_trait]
impl MediaCapture for MockCapture {
    async fn open(&self) -> Result<CapturedMedia, CaptureError> {
        if self.deny {
            return Err(CaptureError::PermissionDenied);
        }

        let (tx, rx) = mpsc::channel(16);
        *self.hub.captions_tx.lock() = Some(tx);
        self.is_open.store(true, Ordering::SeqCst);
        self.hub.open_captures.fetch_add(1, Ordering::SeqCst);

        Ok(CapturedMedia {
            track: MediaTrack::new("mic"),
            tap: self.tap.clone(),
            captions: Some(rx),
        })
    }

    async fn close(&self) {
        if self.is_open.swap(false, Ordering::SeqCst) {
            self.hub.open_captures.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

// =============================================================================
// Signaling
// =============================================================================

/// Signaling double: returns a fixed answer or error, optionally requesting a
/// disconnect while the exchange is in flight.
pub struct MockSignaling {
    hub: Arc<MockHub>,
    response: Result<String, SignalingError>,
    delay: Duration,
    disconnect_during_exchange: Mutex<Option<DisconnectHandle>>,
}

impl MockSignaling {
    pub fn answering(hub: Arc<MockHub>) -> Self {
        Self {
            hub,
            response: Ok(MOCK_ANSWER.to_string()),
            delay: Duration::ZERO,
            disconnect_during_exchange: Mutex::new(None),
        }
    }

    pub fn failing(hub: Arc<MockHub>, error: SignalingError) -> Self {
        Self {
            response: Err(error),
            ..Self::answering(hub)
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Request a disconnect through `handle` from inside the exchange.
    pub fn disconnect_via(&self, handle: DisconnectHandle) {
        *self.disconnect_during_exchange.lock() = Some(handle);
    }
}

#[async_trait]
impl SignalingExchange for MockSignaling {
    async fn exchange(&self, offer: SessionOffer) -> Result<SessionAnswer, SignalingError> {
        self.hub.offers_seen.lock().push(offer.into_sdp());

        let handle = self.disconnect_during_exchange.lock().clone();
        if let Some(handle) = handle {
            handle.request_disconnect();
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.response.clone().map(SessionAnswer::new)
    }
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

//! In-process fakes for driving the relay orchestrator without a network or devices

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use echorelay_client::network::SessionBroker;
use echorelay_client::{BrokerConfig, BrokerError, ErrorKind, PresentationSink, RelayOrchestrator};
use echorelay_media::{
    CaptureConfig, CaptureSource, InboundTrack, InboundTrackHandler, LocalMedia, LocalStream,
    MediaError, MediaPeer, PeerFactory, RemoteStream, TrackCapture, TrackKind,
};
use echorelay_protocol::{SdpType, SessionDescription, SessionRole, TrackDescriptor};

/// Ordered record of side effects across every fake
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|e| e.as_str() == event).count()
    }

    pub fn position(&self, event: &str) -> Option<usize> {
        self.events().iter().position(|e| e == event)
    }
}

pub struct FakeCapture {
    inner: TrackCapture,
    log: EventLog,
    fail: bool,
    fail_release: AtomicBool,
    pub acquired: AtomicUsize,
    pub released: AtomicUsize,
}

impl FakeCapture {
    pub fn new(log: EventLog) -> Self {
        Self {
            inner: TrackCapture::new(CaptureConfig {
                stream_id: Some("local".to_string()),
                keepalive: false,
                ..Default::default()
            }),
            log,
            fail: false,
            fail_release: AtomicBool::new(false),
            acquired: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
        }
    }

    pub fn denied(log: EventLog) -> Self {
        Self {
            fail: true,
            ..Self::new(log)
        }
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Make every later release stop the media but report an error
    pub fn fail_release(&self) {
        self.fail_release.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl CaptureSource for FakeCapture {
    async fn acquire(&self) -> echorelay_media::Result<LocalMedia> {
        self.log.push("acquire");
        if self.fail {
            return Err(MediaError::Device("permission denied".to_string()));
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        self.inner.acquire().await
    }

    fn release(&self, media: &LocalMedia) -> echorelay_media::Result<()> {
        self.log.push("release");
        self.released.fetch_add(1, Ordering::SeqCst);
        self.inner.release(media)?;
        if self.fail_release.load(Ordering::SeqCst) {
            return Err(MediaError::Device("device busy".to_string()));
        }
        Ok(())
    }
}

/// Peer that speaks a toy SDP: one `track:<name>` line per media section
pub struct FakePeer {
    role: SessionRole,
    log: EventLog,
    outbound: Mutex<Vec<String>>,
    local: Mutex<Option<SessionDescription>>,
    remote: Mutex<Option<SessionDescription>>,
    handler: Mutex<Option<InboundTrackHandler>>,
    closed: AtomicUsize,
    fail_close: bool,
}

impl FakePeer {
    fn new(role: SessionRole, log: EventLog, fail_close: bool) -> Self {
        Self {
            role,
            log,
            outbound: Mutex::new(Vec::new()),
            local: Mutex::new(None),
            remote: Mutex::new(None),
            handler: Mutex::new(None),
            closed: AtomicUsize::new(0),
            fail_close,
        }
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> echorelay_media::Result<()> {
        if self.closed() > 0 {
            return Err(MediaError::Closed);
        }
        Ok(())
    }

    /// Deliver one inbound track per track line of the applied remote offer
    fn deliver_inbound(&self) {
        let Some(handler) = self.handler.lock().unwrap().clone() else {
            return;
        };
        let names = self
            .remote
            .lock()
            .unwrap()
            .as_ref()
            .map(|offer| track_lines(&offer.sdp))
            .unwrap_or_default();

        tokio::spawn(async move {
            for name in names {
                let kind = if name.ends_with("-audio") {
                    TrackKind::Audio
                } else {
                    TrackKind::Video
                };
                handler(InboundTrack {
                    id: name,
                    stream_id: "echo".to_string(),
                    kind,
                    remote: None,
                });
            }
        });
    }
}

pub fn track_lines(sdp: &str) -> Vec<String> {
    sdp.lines()
        .filter_map(|line| line.strip_prefix("track:"))
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl MediaPeer for FakePeer {
    fn role(&self) -> SessionRole {
        self.role
    }

    async fn add_outbound_track(
        &self,
        track: Arc<TrackLocalStaticSample>,
    ) -> echorelay_media::Result<usize> {
        self.ensure_open()?;
        let mut outbound = self.outbound.lock().unwrap();
        outbound.push(track.id().to_string());
        Ok(outbound.len() - 1)
    }

    async fn outbound_bindings(&self) -> echorelay_media::Result<Vec<TrackDescriptor>> {
        if self.local.lock().unwrap().is_none() {
            return Err(MediaError::Negotiation("no local offer".to_string()));
        }
        Ok(self
            .outbound
            .lock()
            .unwrap()
            .iter()
            .enumerate()
            .map(|(i, name)| TrackDescriptor {
                mid: i.to_string(),
                track_name: name.clone(),
            })
            .collect())
    }

    async fn create_offer(&self) -> echorelay_media::Result<SessionDescription> {
        self.ensure_open()?;
        let mut sdp = String::from("v=0\n");
        for name in self.outbound.lock().unwrap().iter() {
            sdp.push_str(&format!("track:{}\n", name));
        }
        Ok(SessionDescription::offer(sdp))
    }

    async fn create_answer(&self) -> echorelay_media::Result<SessionDescription> {
        self.ensure_open()?;
        if self.remote.lock().unwrap().is_none() {
            return Err(MediaError::Negotiation("no remote offer".to_string()));
        }
        Ok(SessionDescription::answer("v=0\nanswer\n"))
    }

    async fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> echorelay_media::Result<()> {
        self.ensure_open()?;
        let is_answer = description.sdp_type == SdpType::Answer;
        *self.local.lock().unwrap() = Some(description);
        if is_answer {
            self.deliver_inbound();
        }
        Ok(())
    }

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> echorelay_media::Result<()> {
        self.ensure_open()?;
        *self.remote.lock().unwrap() = Some(description);
        Ok(())
    }

    fn on_inbound_track(&self, handler: InboundTrackHandler) {
        *self.handler.lock().unwrap() = Some(handler);
    }

    async fn close(&self) -> echorelay_media::Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        self.log.push(format!("close {}", self.role));
        if self.fail_close {
            return Err(MediaError::Negotiation("transport already gone".to_string()));
        }
        Ok(())
    }
}

pub struct FakeFactory {
    log: EventLog,
    peers: Mutex<Vec<Arc<FakePeer>>>,
    fail_close: Mutex<Option<SessionRole>>,
}

impl FakeFactory {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            peers: Mutex::new(Vec::new()),
            fail_close: Mutex::new(None),
        }
    }

    /// Peers created later in `role` fail to close
    pub fn fail_close(&self, role: SessionRole) {
        *self.fail_close.lock().unwrap() = Some(role);
    }

    pub fn peer(&self, role: SessionRole) -> Option<Arc<FakePeer>> {
        self.peers
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.role == role)
            .cloned()
    }
}

#[async_trait]
impl PeerFactory for FakeFactory {
    async fn create(&self, role: SessionRole) -> echorelay_media::Result<Arc<dyn MediaPeer>> {
        self.log.push(format!("create {}", role));
        let fail_close = *self.fail_close.lock().unwrap() == Some(role);
        let peer = Arc::new(FakePeer::new(role, self.log.clone(), fail_close));
        self.peers.lock().unwrap().push(peer.clone());
        Ok(peer)
    }
}

/// In-memory broker with switchable faults
#[derive(Default)]
pub struct FakeBroker {
    log: EventLog,
    sessions: AtomicUsize,
    published: Mutex<HashMap<String, Vec<String>>>,
    /// 1-based index of the `create_session` call that fails
    pub fail_create_at: Option<usize>,
    pub fail_push: bool,
    /// Operation that never completes
    pub hang_on: Option<&'static str>,
    /// When set, `push_tracks` signals `push_entered` and waits for `push_release`
    pub push_gate: Option<(Arc<Notify>, Arc<Notify>)>,
    /// When set, `renegotiate` waits this long and then refuses the answer
    pub refuse_renegotiate_after: Option<Duration>,
}

impl FakeBroker {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            ..Default::default()
        }
    }

    async fn maybe_hang(&self, operation: &str) {
        if self.hang_on == Some(operation) {
            std::future::pending::<()>().await;
        }
    }
}

#[async_trait]
impl SessionBroker for FakeBroker {
    async fn create_session(&self) -> Result<String, BrokerError> {
        let n = self.sessions.fetch_add(1, Ordering::SeqCst) + 1;
        self.log.push("create_session");
        self.maybe_hang("create_session").await;
        if self.fail_create_at == Some(n) {
            return Err(BrokerError::Status {
                status: 503,
                body: "session capacity exhausted".to_string(),
            });
        }
        Ok(format!("s{}", n))
    }

    async fn push_tracks(
        &self,
        session_id: &str,
        offer: SessionDescription,
        tracks: &[TrackDescriptor],
    ) -> Result<SessionDescription, BrokerError> {
        self.log.push("push_tracks");
        if let Some((entered, release)) = &self.push_gate {
            entered.notify_one();
            release.notified().await;
        }
        self.maybe_hang("push_tracks").await;
        if self.fail_push {
            return Err(BrokerError::Rejected("push refused".to_string()));
        }
        if offer.sdp_type != SdpType::Offer {
            return Err(BrokerError::Malformed("push needs an offer".to_string()));
        }

        self.published.lock().unwrap().insert(
            session_id.to_string(),
            tracks.iter().map(|t| t.track_name.clone()).collect(),
        );
        Ok(SessionDescription::answer("v=0\nbroker-answer\n"))
    }

    async fn pull_tracks(
        &self,
        _session_id: &str,
        source_session_id: &str,
        track_names: &[String],
    ) -> Result<SessionDescription, BrokerError> {
        self.log.push("pull_tracks");
        self.maybe_hang("pull_tracks").await;

        let published = self.published.lock().unwrap();
        let Some(available) = published.get(source_session_id) else {
            return Err(BrokerError::Rejected(format!(
                "unknown session {}",
                source_session_id
            )));
        };

        let mut sdp = String::from("v=0\n");
        for name in track_names {
            if !available.contains(name) {
                return Err(BrokerError::Rejected(format!("track {} not found", name)));
            }
            sdp.push_str(&format!("track:{}\n", name));
        }
        Ok(SessionDescription::offer(sdp))
    }

    async fn renegotiate(
        &self,
        _session_id: &str,
        answer: SessionDescription,
    ) -> Result<(), BrokerError> {
        self.log.push("renegotiate");
        self.maybe_hang("renegotiate").await;
        if let Some(delay) = self.refuse_renegotiate_after {
            tokio::time::sleep(delay).await;
            return Err(BrokerError::Rejected("renegotiate refused".to_string()));
        }
        if answer.sdp_type != SdpType::Answer {
            return Err(BrokerError::Malformed("renegotiate needs an answer".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Local(usize),
    Remote(usize),
    Error(ErrorKind, String),
    Clear,
}

#[derive(Default)]
pub struct FakeSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl FakeSink {
    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn remote_streams(&self) -> Vec<usize> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::Remote(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<ErrorKind> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::Error(kind, _) => Some(kind),
                _ => None,
            })
            .collect()
    }

    /// Wait until an event matches or two seconds pass
    pub async fn wait_for(&self, matches: impl Fn(&SinkEvent) -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while tokio::time::Instant::now() < deadline {
            if self.events().iter().any(&matches) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

impl PresentationSink for FakeSink {
    fn on_local_stream(&self, stream: LocalStream) {
        self.events
            .lock()
            .unwrap()
            .push(SinkEvent::Local(stream.tracks.len()));
    }

    fn on_remote_stream(&self, stream: RemoteStream) {
        self.events
            .lock()
            .unwrap()
            .push(SinkEvent::Remote(stream.len()));
    }

    fn on_error(&self, kind: ErrorKind, message: &str) {
        self.events
            .lock()
            .unwrap()
            .push(SinkEvent::Error(kind, message.to_string()));
    }

    fn clear(&self) {
        self.events.lock().unwrap().push(SinkEvent::Clear);
    }
}

/// One orchestrator wired to fakes, with handles to inspect them
pub struct Harness {
    pub log: EventLog,
    pub capture: Arc<FakeCapture>,
    pub peers: Arc<FakeFactory>,
    pub sink: Arc<FakeSink>,
    pub relay: Arc<RelayOrchestrator>,
}

pub fn broker_config(request_timeout_ms: u64) -> BrokerConfig {
    BrokerConfig {
        app_id: "test-app".to_string(),
        app_token: "test-token".to_string(),
        request_timeout_ms,
        ..Default::default()
    }
}

impl Harness {
    pub fn new(configure: impl FnOnce(&mut FakeBroker)) -> Self {
        let log = EventLog::default();
        Self::with_capture(FakeCapture::new(log.clone()), log, configure)
    }

    pub fn with_capture(
        capture: FakeCapture,
        log: EventLog,
        configure: impl FnOnce(&mut FakeBroker),
    ) -> Self {
        let mut broker = FakeBroker::new(log.clone());
        configure(&mut broker);
        Self::with_broker(capture, log, Arc::new(broker), broker_config(2_000))
    }

    pub fn with_broker(
        capture: FakeCapture,
        log: EventLog,
        broker: Arc<dyn SessionBroker>,
        config: BrokerConfig,
    ) -> Self {
        let capture = Arc::new(capture);
        let peers = Arc::new(FakeFactory::new(log.clone()));
        let sink = Arc::new(FakeSink::default());
        let relay = Arc::new(RelayOrchestrator::new(
            &config,
            capture.clone(),
            broker,
            peers.clone(),
            sink.clone(),
        ));
        Self {
            log,
            capture,
            peers,
            sink,
            relay,
        }
    }
}

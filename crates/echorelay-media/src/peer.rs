//! Peer connection management
//!
//! One `MediaPeer` wraps one WebRTC connection to the broker. A call uses two:
//! the push peer sends local tracks, the pull peer receives them back.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{API, APIBuilder};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::{RTCRtpTransceiver, RTCRtpTransceiverInit};
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use echorelay_protocol::{SdpType, SessionDescription, SessionRole, TrackDescriptor};

use crate::error::{MediaError, Result};
use crate::stream::InboundTrack;

/// Callback fired for every remote track. Runs on the transport's task.
pub type InboundTrackHandler = Arc<dyn Fn(InboundTrack) + Send + Sync>;

/// ICE server entry as it appears in configuration
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub credential: Option<String>,
}

impl IceServer {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }
}

impl From<&IceServer> for RTCIceServer {
    fn from(server: &IceServer) -> Self {
        RTCIceServer {
            urls: server.urls.clone(),
            username: server.username.clone().unwrap_or_default(),
            credential: server.credential.clone().unwrap_or_default(),
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait MediaPeer: Send + Sync {
    fn role(&self) -> SessionRole;

    /// Attach a local track send-only. Returns its outbound index.
    async fn add_outbound_track(&self, track: Arc<TrackLocalStaticSample>) -> Result<usize>;

    /// `(mid, trackName)` of every outbound track in media-section order.
    /// Only available once the local offer has been applied.
    async fn outbound_bindings(&self) -> Result<Vec<TrackDescriptor>>;

    async fn create_offer(&self) -> Result<SessionDescription>;

    async fn create_answer(&self) -> Result<SessionDescription>;

    async fn set_local_description(&self, description: SessionDescription) -> Result<()>;

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()>;

    fn on_inbound_track(&self, handler: InboundTrackHandler);

    /// Close the connection. Safe to call more than once.
    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait PeerFactory: Send + Sync {
    async fn create(&self, role: SessionRole) -> Result<Arc<dyn MediaPeer>>;
}

/// webrtc-rs backed peer
pub struct RtcPeer {
    role: SessionRole,
    connection: Arc<RTCPeerConnection>,
    outbound: Mutex<Vec<(Arc<RTCRtpTransceiver>, String)>>,
    closed: AtomicBool,
}

impl RtcPeer {
    pub fn new(role: SessionRole, connection: Arc<RTCPeerConnection>) -> Self {
        connection.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            tracing::info!("{} peer connection state: {}", role, state);
            Box::pin(async {})
        }));

        Self {
            role,
            connection,
            outbound: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MediaError::Closed);
        }
        Ok(())
    }
}

fn to_rtc(description: SessionDescription) -> Result<RTCSessionDescription> {
    match description.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(description.sdp),
        SdpType::Answer => RTCSessionDescription::answer(description.sdp),
    }
    .map_err(MediaError::negotiation)
}

#[async_trait]
impl MediaPeer for RtcPeer {
    fn role(&self) -> SessionRole {
        self.role
    }

    async fn add_outbound_track(&self, track: Arc<TrackLocalStaticSample>) -> Result<usize> {
        self.ensure_open()?;

        let name = track.id().to_string();
        let transceiver = self
            .connection
            .add_transceiver_from_track(
                track as Arc<dyn TrackLocal + Send + Sync>,
                Some(RTCRtpTransceiverInit {
                    direction: RTCRtpTransceiverDirection::Sendonly,
                    send_encodings: vec![],
                }),
            )
            .await?;

        let mut outbound = self.outbound.lock().await;
        outbound.push((transceiver, name));
        tracing::debug!("{} peer: added outbound track #{}", self.role, outbound.len() - 1);
        Ok(outbound.len() - 1)
    }

    async fn outbound_bindings(&self) -> Result<Vec<TrackDescriptor>> {
        if self.connection.local_description().await.is_none() {
            return Err(MediaError::Negotiation(
                "track mids are unknown until the local offer is applied".to_string(),
            ));
        }

        let outbound = self.outbound.lock().await;
        outbound
            .iter()
            .map(|(transceiver, name)| {
                let mid = transceiver.mid().ok_or_else(|| {
                    MediaError::Negotiation(format!("track {name} has no negotiated mid"))
                })?;
                Ok(TrackDescriptor {
                    mid: mid.to_string(),
                    track_name: name.clone(),
                })
            })
            .collect()
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        self.ensure_open()?;
        let offer = self
            .connection
            .create_offer(None)
            .await
            .map_err(MediaError::negotiation)?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        self.ensure_open()?;
        if self.connection.remote_description().await.is_none() {
            return Err(MediaError::Negotiation(
                "cannot create an answer before a remote offer is set".to_string(),
            ));
        }
        let answer = self
            .connection
            .create_answer(None)
            .await
            .map_err(MediaError::negotiation)?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        self.ensure_open()?;
        let sdp_type = description.sdp_type;
        self.connection
            .set_local_description(to_rtc(description)?)
            .await
            .map_err(MediaError::negotiation)?;
        tracing::debug!("{} peer: local {} applied", self.role, sdp_type);
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        self.ensure_open()?;
        let sdp_type = description.sdp_type;
        self.connection
            .set_remote_description(to_rtc(description)?)
            .await
            .map_err(MediaError::negotiation)?;
        tracing::debug!("{} peer: remote {} applied", self.role, sdp_type);
        Ok(())
    }

    fn on_inbound_track(&self, handler: InboundTrackHandler) {
        let role = self.role;
        self.connection
            .on_track(Box::new(move |track, _receiver, _transceiver| {
                let handler = handler.clone();
                Box::pin(async move {
                    let inbound = InboundTrack::from_remote(track);
                    tracing::info!(
                        "{} peer: inbound {:?} track {} (stream {})",
                        role,
                        inbound.kind,
                        inbound.id,
                        inbound.stream_id
                    );
                    handler(inbound);
                })
            }));
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.outbound.lock().await.clear();
        self.connection.close().await?;
        tracing::info!("{} peer connection closed", self.role);
        Ok(())
    }
}

/// Builds webrtc-rs peers sharing one API instance
pub struct RtcPeerFactory {
    api: API,
    ice_servers: Vec<RTCIceServer>,
}

impl RtcPeerFactory {
    pub fn new(ice_servers: &[IceServer]) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        Ok(Self {
            api,
            ice_servers: ice_servers.iter().map(RTCIceServer::from).collect(),
        })
    }
}

#[async_trait]
impl PeerFactory for RtcPeerFactory {
    async fn create(&self, role: SessionRole) -> Result<Arc<dyn MediaPeer>> {
        let config = RTCConfiguration {
            ice_servers: self.ice_servers.clone(),
            bundle_policy: RTCBundlePolicy::MaxBundle,
            ..Default::default()
        };

        let connection = Arc::new(self.api.new_peer_connection(config).await?);
        tracing::debug!("Created {} peer connection", role);
        Ok(Arc::new(RtcPeer::new(role, connection)))
    }
}

//! Stream descriptions passed from the media layer to presentation

use std::fmt;
use std::sync::Arc;

use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_remote::TrackRemote;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
    Unknown,
}

impl From<RTPCodecType> for TrackKind {
    fn from(kind: RTPCodecType) -> Self {
        match kind {
            RTPCodecType::Audio => TrackKind::Audio,
            RTPCodecType::Video => TrackKind::Video,
            _ => TrackKind::Unknown,
        }
    }
}

/// Name and kind of one captured track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    pub name: String,
    pub kind: TrackKind,
}

/// Local preview: the captured tracks as one stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalStream {
    pub stream_id: String,
    pub tracks: Vec<TrackInfo>,
}

/// A track delivered by the remote side of a peer connection
#[derive(Clone)]
pub struct InboundTrack {
    pub id: String,
    pub stream_id: String,
    pub kind: TrackKind,
    /// Transport handle for reading RTP, absent when the track did not come from webrtc-rs
    pub remote: Option<Arc<TrackRemote>>,
}

impl InboundTrack {
    pub fn from_remote(track: Arc<TrackRemote>) -> Self {
        Self {
            id: track.id().to_string(),
            stream_id: track.stream_id().to_string(),
            kind: track.kind().into(),
            remote: Some(track),
        }
    }
}

impl fmt::Debug for InboundTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundTrack")
            .field("id", &self.id)
            .field("stream_id", &self.stream_id)
            .field("kind", &self.kind)
            .field("remote", &self.remote.is_some())
            .finish()
    }
}

/// The echoed stream, published once every pulled track has arrived
#[derive(Debug, Clone, Default)]
pub struct RemoteStream {
    pub tracks: Vec<InboundTrack>,
}

impl RemoteStream {
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

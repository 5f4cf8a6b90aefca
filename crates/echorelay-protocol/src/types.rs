use serde::{Deserialize, Serialize};
use std::fmt;

/// SDP type as carried in a broker `sessionDescription`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

impl SdpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SdpType::Offer => "offer",
            SdpType::Answer => "answer",
        }
    }
}

impl fmt::Display for SdpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session description exchanged with the broker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Which side of the broker a track lives on
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TrackLocation {
    /// Track is sent by this session's peer connection
    Local,
    /// Track is pulled from another broker session
    Remote,
}

/// Role a broker session plays in an echo call
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SessionRole {
    Push,
    Pull,
}

impl fmt::Display for SessionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionRole::Push => f.write_str("push"),
            SessionRole::Pull => f.write_str("pull"),
        }
    }
}

/// A session created on the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerSession {
    pub id: String,
    pub role: SessionRole,
}

/// Ordered `(mid, trackName)` pair describing one pushed media section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackDescriptor {
    pub mid: String,
    pub track_name: String,
}

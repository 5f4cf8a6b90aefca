use serde::{Deserialize, Serialize};

use crate::types::{SessionDescription, TrackDescriptor, TrackLocation};

/// Track entry in a `tracks/new` request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TrackObject {
    pub location: TrackLocation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mid: Option<String>,
    pub track_name: String,
    /// Source session for remote tracks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl TrackObject {
    /// Describe a track this session sends from media section `mid`
    pub fn local(descriptor: &TrackDescriptor) -> Self {
        Self {
            location: TrackLocation::Local,
            mid: Some(descriptor.mid.clone()),
            track_name: descriptor.track_name.clone(),
            session_id: None,
        }
    }

    /// Describe a track pulled from `source_session_id`
    pub fn remote(track_name: impl Into<String>, source_session_id: impl Into<String>) -> Self {
        Self {
            location: TrackLocation::Remote,
            mid: None,
            track_name: track_name.into(),
            session_id: Some(source_session_id.into()),
        }
    }
}

/// Body of `POST /sessions/{id}/tracks/new`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TracksRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_description: Option<SessionDescription>,
    pub tracks: Vec<TrackObject>,
}

/// Body of `PUT /sessions/{id}/renegotiate`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenegotiateRequest {
    pub session_description: SessionDescription,
}

/// Error fields the broker may attach to any response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerFault {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl BrokerFault {
    pub fn is_error(&self) -> bool {
        self.error_code.is_some() || self.error_description.is_some()
    }

    pub fn describe(&self) -> String {
        match (&self.error_code, &self.error_description) {
            (Some(code), Some(desc)) => format!("{code}: {desc}"),
            (Some(code), None) => code.clone(),
            (None, Some(desc)) => desc.clone(),
            (None, None) => "unknown broker error".to_string(),
        }
    }
}

/// Response of `POST /sessions/new`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSessionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(flatten)]
    pub fault: BrokerFault,
}

/// Per-track result inside a `tracks/new` response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(flatten)]
    pub fault: BrokerFault,
}

/// Response of `POST /sessions/{id}/tracks/new`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TracksResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_description: Option<SessionDescription>,
    #[serde(default)]
    pub tracks: Vec<TrackResult>,
    #[serde(default)]
    pub requires_immediate_renegotiation: bool,
    #[serde(flatten)]
    pub fault: BrokerFault,
}

impl TracksResponse {
    /// First track the broker refused, if any
    pub fn rejected_track(&self) -> Option<&TrackResult> {
        self.tracks.iter().find(|t| t.fault.is_error())
    }
}

/// Response of `PUT /sessions/{id}/renegotiate`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenegotiateResponse {
    #[serde(flatten)]
    pub fault: BrokerFault,
}

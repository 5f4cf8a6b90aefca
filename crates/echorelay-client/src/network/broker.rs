//! Session broker client
//!
//! Thin typed wrapper over the broker's session endpoints. No retries here:
//! every failure goes back to the orchestrator.

use async_trait::async_trait;

use echorelay_protocol::{
    NewSessionResponse, RenegotiateRequest, RenegotiateResponse, SdpType, SessionDescription,
    TrackDescriptor, TrackObject, TracksRequest, TracksResponse,
};

use crate::config::BrokerConfig;
use crate::error::BrokerError;
use crate::network::api::ApiClient;

#[async_trait]
pub trait SessionBroker: Send + Sync {
    /// Open a new broker session and return its id
    async fn create_session(&self) -> Result<String, BrokerError>;

    /// Publish local tracks. `tracks` must follow the offer's media-section order.
    async fn push_tracks(
        &self,
        session_id: &str,
        offer: SessionDescription,
        tracks: &[TrackDescriptor],
    ) -> Result<SessionDescription, BrokerError>;

    /// Ask the broker to offer `track_names` from `source_session_id` to this session
    async fn pull_tracks(
        &self,
        session_id: &str,
        source_session_id: &str,
        track_names: &[String],
    ) -> Result<SessionDescription, BrokerError>;

    /// Complete a broker-originated offer with our answer
    async fn renegotiate(
        &self,
        session_id: &str,
        answer: SessionDescription,
    ) -> Result<(), BrokerError>;
}

pub struct HttpBroker {
    api: ApiClient,
}

impl HttpBroker {
    pub fn new(config: &BrokerConfig) -> Result<Self, BrokerError> {
        let api = ApiClient::new(
            config.app_url(),
            Some(config.app_token.clone()),
            config.connect_timeout(),
        )?;
        Ok(Self { api })
    }

    /// Check faults and extract the expected description from a `tracks/new` response
    fn expect_description(
        response: TracksResponse,
        expected: SdpType,
    ) -> Result<SessionDescription, BrokerError> {
        if response.fault.is_error() {
            return Err(BrokerError::Rejected(response.fault.describe()));
        }
        if let Some(track) = response.rejected_track() {
            return Err(BrokerError::Rejected(format!(
                "track {}: {}",
                track.track_name.as_deref().unwrap_or("<unnamed>"),
                track.fault.describe()
            )));
        }

        let description = response.session_description.ok_or_else(|| {
            BrokerError::Malformed("response has no sessionDescription".to_string())
        })?;

        if description.sdp_type != expected {
            return Err(BrokerError::Malformed(format!(
                "expected an {} but the broker sent an {}",
                expected, description.sdp_type
            )));
        }
        Ok(description)
    }
}

#[async_trait]
impl SessionBroker for HttpBroker {
    async fn create_session(&self) -> Result<String, BrokerError> {
        let response: NewSessionResponse = self.api.post_empty("/sessions/new").await?;

        if response.fault.is_error() {
            return Err(BrokerError::Rejected(response.fault.describe()));
        }

        let session_id = response
            .session_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| BrokerError::Malformed("response has no sessionId".to_string()))?;

        tracing::debug!("Broker session {} created", session_id);
        Ok(session_id)
    }

    async fn push_tracks(
        &self,
        session_id: &str,
        offer: SessionDescription,
        tracks: &[TrackDescriptor],
    ) -> Result<SessionDescription, BrokerError> {
        let request = TracksRequest {
            session_description: Some(offer),
            tracks: tracks.iter().map(TrackObject::local).collect(),
        };

        let response: TracksResponse = self
            .api
            .post(&format!("/sessions/{}/tracks/new", session_id), &request)
            .await?;

        tracing::debug!("Pushed {} track(s) to session {}", tracks.len(), session_id);
        Self::expect_description(response, SdpType::Answer)
    }

    async fn pull_tracks(
        &self,
        session_id: &str,
        source_session_id: &str,
        track_names: &[String],
    ) -> Result<SessionDescription, BrokerError> {
        let request = TracksRequest {
            session_description: None,
            tracks: track_names
                .iter()
                .map(|name| TrackObject::remote(name.as_str(), source_session_id))
                .collect(),
        };

        let response: TracksResponse = self
            .api
            .post(&format!("/sessions/{}/tracks/new", session_id), &request)
            .await?;

        tracing::debug!(
            "Pulled {} track(s) from session {} into {}",
            track_names.len(),
            source_session_id,
            session_id
        );
        Self::expect_description(response, SdpType::Offer)
    }

    async fn renegotiate(
        &self,
        session_id: &str,
        answer: SessionDescription,
    ) -> Result<(), BrokerError> {
        let request = RenegotiateRequest {
            session_description: answer,
        };

        let response: RenegotiateResponse = self
            .api
            .put(&format!("/sessions/{}/renegotiate", session_id), &request)
            .await?;

        if response.fault.is_error() {
            return Err(BrokerError::Rejected(response.fault.describe()));
        }
        Ok(())
    }
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Capture device unavailable: {0}")]
    Device(String),

    #[error("Negotiation error: {0}")]
    Negotiation(String),

    #[error("Peer connection is closed")]
    Closed,

    #[error("WebRTC error: {0}")]
    WebRtc(#[from] webrtc::Error),
}

impl MediaError {
    pub(crate) fn negotiation(err: webrtc::Error) -> Self {
        MediaError::Negotiation(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MediaError>;

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use echorelay_media::MediaError;

use crate::network::api::ApiError;
use crate::relay::RelayState;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Any broker call that did not produce a usable result
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Broker unreachable: {0}")]
    Transport(String),

    #[error("Broker returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Broker call '{operation}' timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Malformed broker response: {0}")]
    Malformed(String),

    #[error("Broker rejected the request: {0}")]
    Rejected(String),
}

impl From<ApiError> for BrokerError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Http(e) => BrokerError::Transport(e.to_string()),
            ApiError::Status { status, body } => BrokerError::Status { status, body },
            ApiError::Decode(e) => BrokerError::Malformed(e.to_string()),
        }
    }
}

/// Error kind reported to the presentation sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Device,
    Broker,
    Negotiation,
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Device => "DeviceError",
            ErrorKind::Broker => "BrokerError",
            ErrorKind::Negotiation => "NegotiationError",
            ErrorKind::Cancelled => "Cancelled",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Capture failed: {0}")]
    Device(String),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("Negotiation failed: {0}")]
    Negotiation(String),

    #[error("Cannot {action} while the relay is {state}")]
    InvalidState {
        action: &'static str,
        state: RelayState,
    },

    #[error("Relay stopped before it became active")]
    Cancelled,
}

impl RelayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RelayError::Device(_) => ErrorKind::Device,
            RelayError::Broker(_) => ErrorKind::Broker,
            RelayError::Negotiation(_) | RelayError::InvalidState { .. } => ErrorKind::Negotiation,
            RelayError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

impl From<MediaError> for RelayError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::Device(msg) => RelayError::Device(msg),
            MediaError::Negotiation(msg) => RelayError::Negotiation(msg),
            other => RelayError::Negotiation(other.to_string()),
        }
    }
}

/// Failure while releasing one resource. Logged, never returned.
#[derive(Error, Debug)]
#[error("Teardown step '{step}' failed: {message}")]
pub struct TeardownError {
    pub step: &'static str,
    pub message: String,
}

impl TeardownError {
    pub fn new(step: &'static str, err: impl fmt::Display) -> Self {
        Self {
            step,
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;

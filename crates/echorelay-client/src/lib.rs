//! Echorelay client library
//!
//! Runs an echo call: local media is pushed to a realtime session broker on
//! one peer connection and pulled back on a second. Also carries standalone
//! clients for prompt-driven generation jobs and streaming transcription.

pub mod config;
pub mod error;
pub mod network;
pub mod relay;

pub use config::{AppConfig, BrokerConfig};
pub use error::{BrokerError, ConfigError, ErrorKind, RelayError, TeardownError};
pub use relay::{LoggingSink, PresentationSink, RelayOrchestrator, RelayState};

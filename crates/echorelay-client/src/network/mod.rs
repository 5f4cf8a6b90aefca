//! Network clients
//!
//! The session broker is the relay's only network dependency. The generation
//! and transcription clients are standalone collaborators.

pub mod api;
pub mod broker;
pub mod generation;
pub mod speech;

pub use broker::{HttpBroker, SessionBroker};
pub use generation::{GenerationClient, GenerationConfig, GenerationError};
pub use speech::{SpeechConfig, TranscriptionError, TranscriptionSession};

//! Shared wire definitions for echorelay
//!
//! Request and response bodies for the session broker, plus the payloads of
//! the generation and transcription collaborators.

pub mod generation;
pub mod messages;
pub mod speech;
pub mod types;

pub use messages::*;
pub use types::*;

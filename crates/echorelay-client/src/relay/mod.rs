//! Echo relay
//!
//! Pushes local media to the broker on one peer connection and pulls it back
//! on a second one.

mod orchestrator;
mod sink;
mod state;

pub use orchestrator::RelayOrchestrator;
pub use sink::{LoggingSink, PresentationSink};
pub use state::RelayState;

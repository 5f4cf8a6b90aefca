//! Media layer for echorelay
//!
//! This crate owns everything that touches webrtc-rs directly:
//! - Local capture (`CaptureSource`, `LocalMedia`)
//! - Peer connections in push or pull role (`MediaPeer`, `PeerFactory`)
//! - Stream descriptions handed to presentation

pub mod capture;
pub mod error;
pub mod peer;
pub mod stream;

pub use capture::{CaptureConfig, CaptureSource, LocalMedia, TrackCapture};
pub use error::{MediaError, Result};
pub use peer::{IceServer, InboundTrackHandler, MediaPeer, PeerFactory, RtcPeer, RtcPeerFactory};
pub use stream::{InboundTrack, LocalStream, RemoteStream, TrackInfo, TrackKind};

//! Local capture
//!
//! `TrackCapture` builds sample tracks that an encoder (or the built-in
//! silence keepalive) writes into. The tracks are shared with the push peer
//! connection, but only the capture side ever stops them.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use crate::error::{MediaError, Result};
use crate::stream::{LocalStream, TrackInfo};

/// Opus frame duration written by the keepalive
pub const OPUS_FRAME_DURATION: Duration = Duration::from_millis(20);

/// A single 20ms Opus silence frame (TOC 0xf8, CELT fullband)
const OPUS_SILENCE: [u8; 3] = [0xf8, 0xff, 0xfe];

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub audio: bool,
    pub video: bool,
    /// Stream id shared by the captured tracks; random when unset
    pub stream_id: Option<String>,
    /// Feed Opus silence into the audio track until released
    pub keepalive: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
            stream_id: None,
            keepalive: true,
        }
    }
}

/// Captured audio/video tracks plus the handle of the device feeding them
pub struct LocalMedia {
    stream_id: String,
    tracks: Vec<Arc<TrackLocalStaticSample>>,
    device: CancellationToken,
    released: AtomicBool,
}

impl LocalMedia {
    pub fn new(
        stream_id: impl Into<String>,
        tracks: Vec<Arc<TrackLocalStaticSample>>,
        device: CancellationToken,
    ) -> Self {
        Self {
            stream_id: stream_id.into(),
            tracks,
            device,
            released: AtomicBool::new(false),
        }
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn tracks(&self) -> &[Arc<TrackLocalStaticSample>] {
        &self.tracks
    }

    pub fn describe(&self) -> LocalStream {
        LocalStream {
            stream_id: self.stream_id.clone(),
            tracks: self
                .tracks
                .iter()
                .map(|t| TrackInfo {
                    name: t.id().to_string(),
                    kind: t.kind().into(),
                })
                .collect(),
        }
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Stop the device feeding every track.
    ///
    /// Returns `false` when the media was already stopped.
    pub fn stop(&self) -> bool {
        if self.released.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.device.cancel();
        true
    }
}

impl Drop for LocalMedia {
    fn drop(&mut self) {
        if self.stop() {
            tracing::debug!("Local media {} stopped on drop", self.stream_id);
        }
    }
}

#[async_trait]
pub trait CaptureSource: Send + Sync {
    /// Acquire local audio and video
    async fn acquire(&self) -> Result<LocalMedia>;

    /// Stop every track in `media`. Safe to call more than once.
    fn release(&self, media: &LocalMedia) -> Result<()>;
}

/// Capture source producing Opus/VP8 sample tracks
pub struct TrackCapture {
    config: CaptureConfig,
}

impl TrackCapture {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }
}

fn opus_capability() -> RTCRtpCodecCapability {
    RTCRtpCodecCapability {
        mime_type: MIME_TYPE_OPUS.to_owned(),
        clock_rate: 48000,
        channels: 2,
        ..Default::default()
    }
}

fn vp8_capability() -> RTCRtpCodecCapability {
    RTCRtpCodecCapability {
        mime_type: MIME_TYPE_VP8.to_owned(),
        clock_rate: 90000,
        ..Default::default()
    }
}

#[async_trait]
impl CaptureSource for TrackCapture {
    async fn acquire(&self) -> Result<LocalMedia> {
        if !self.config.audio && !self.config.video {
            return Err(MediaError::Device(
                "no capture device enabled (audio and video are both off)".to_string(),
            ));
        }

        let stream_id = self
            .config
            .stream_id
            .clone()
            .unwrap_or_else(|| format!("echorelay-{}", Uuid::new_v4()));

        let mut tracks = Vec::new();
        let mut audio_track = None;

        if self.config.audio {
            let track = Arc::new(TrackLocalStaticSample::new(
                opus_capability(),
                format!("{stream_id}-audio"),
                stream_id.clone(),
            ));
            audio_track = Some(track.clone());
            tracks.push(track);
        }

        if self.config.video {
            tracks.push(Arc::new(TrackLocalStaticSample::new(
                vp8_capability(),
                format!("{stream_id}-video"),
                stream_id.clone(),
            )));
        }

        let device = CancellationToken::new();
        if self.config.keepalive {
            if let Some(track) = audio_track {
                tokio::spawn(write_silence(track, device.clone()));
            }
        }

        tracing::info!(
            "Acquired local media {} with {} track(s)",
            stream_id,
            tracks.len()
        );

        Ok(LocalMedia::new(stream_id, tracks, device))
    }

    fn release(&self, media: &LocalMedia) -> Result<()> {
        if media.stop() {
            tracing::info!("Released local media {}", media.stream_id());
        } else {
            tracing::debug!("Local media {} already released", media.stream_id());
        }
        Ok(())
    }
}

async fn write_silence(track: Arc<TrackLocalStaticSample>, device: CancellationToken) {
    let mut ticker = tokio::time::interval(OPUS_FRAME_DURATION);
    loop {
        tokio::select! {
            _ = device.cancelled() => break,
            _ = ticker.tick() => {
                let sample = Sample {
                    data: OPUS_SILENCE.to_vec().into(),
                    duration: OPUS_FRAME_DURATION,
                    ..Default::default()
                };
                if let Err(e) = track.write_sample(&sample).await {
                    tracing::debug!("Keepalive write failed on {}: {}", track.id(), e);
                }
            }
        }
    }
    tracing::debug!("Keepalive stopped for {}", track.id());
}

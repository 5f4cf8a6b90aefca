//! Streaming speech transcription
//!
//! The service authenticates the WebSocket upgrade through query parameters:
//! an HMAC-SHA256 signature over `host`, `date` and the request line, wrapped
//! in a Base64 authorization string.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use echorelay_protocol::speech::{
    AudioData, AudioFrame, BusinessParams, CommonParams, FrameStatus, TranscriptFragment,
};

type HmacSha256 = Hmac<Sha256>;
type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub host: String,
    pub path: String,
    pub app_id: String,
    pub api_key: String,
    pub api_secret: String,
    pub language: String,
    pub domain: String,
    pub accent: String,
    /// Trailing silence (ms) after which the service ends the utterance
    pub vad_eos: u32,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            host: "iat-api.xfyun.cn".to_string(),
            path: "/v2/iat".to_string(),
            app_id: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            language: "zh_cn".to_string(),
            domain: "iat".to_string(),
            accent: "mandarin".to_string(),
            vad_eos: 5000,
        }
    }
}

#[derive(Error, Debug)]
pub enum TranscriptionError {
    #[error("Failed to sign request: {0}")]
    Signing(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Invalid frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Transcription service error {code}: {message}")]
    Service { code: i32, message: String },

    #[error("Transcript reader stopped unexpectedly")]
    ReaderLost,
}

/// RFC 1123 date as expected in the signature and `date` parameter
pub fn http_date(now: DateTime<Utc>) -> String {
    now.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Base64 HMAC-SHA256 of the canonical `host/date/request-line` string
pub fn signature(config: &SpeechConfig, date: &str) -> Result<String, TranscriptionError> {
    let canonical = format!(
        "host: {}\ndate: {}\nGET {} HTTP/1.1",
        config.host, date, config.path
    );
    let mut mac = HmacSha256::new_from_slice(config.api_secret.as_bytes())
        .map_err(|e| TranscriptionError::Signing(e.to_string()))?;
    mac.update(canonical.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

/// Authenticated `wss://` URL for a session starting at `date`
pub fn signed_url(config: &SpeechConfig, date: &str) -> Result<String, TranscriptionError> {
    let authorization = format!(
        "api_key=\"{}\", algorithm=\"hmac-sha256\", headers=\"host date request-line\", signature=\"{}\"",
        config.api_key,
        signature(config, date)?
    );
    Ok(format!(
        "wss://{}{}?authorization={}&date={}&host={}",
        config.host,
        config.path,
        urlencoding::encode(&BASE64.encode(authorization)),
        urlencoding::encode(date),
        urlencoding::encode(&config.host)
    ))
}

/// One open transcription stream
pub struct TranscriptionSession {
    writer: SplitSink<Socket, Message>,
    transcript: Arc<RwLock<String>>,
    reader: JoinHandle<Result<(), TranscriptionError>>,
}

impl TranscriptionSession {
    /// Sign a URL for now and connect
    pub async fn connect(config: &SpeechConfig) -> Result<Self, TranscriptionError> {
        let url = signed_url(config, &http_date(Utc::now()))?;
        Self::connect_to(&url, config).await
    }

    /// Connect to an already signed URL and send the opening frame
    pub async fn connect_to(url: &str, config: &SpeechConfig) -> Result<Self, TranscriptionError> {
        let (socket, _) = connect_async(url).await?;
        let (mut writer, read) = socket.split();

        let opening = AudioFrame {
            common: Some(CommonParams {
                app_id: config.app_id.clone(),
            }),
            business: Some(BusinessParams {
                language: config.language.clone(),
                domain: config.domain.clone(),
                accent: config.accent.clone(),
                vad_eos: config.vad_eos,
            }),
            data: AudioData::new(FrameStatus::First, None),
        };
        writer
            .send(Message::Text(serde_json::to_string(&opening)?.into()))
            .await?;
        tracing::info!("Transcription session opened on {}", config.host);

        let transcript = Arc::new(RwLock::new(String::new()));
        let reader = tokio::spawn(read_fragments(read, transcript.clone()));

        Ok(Self {
            writer,
            transcript,
            reader,
        })
    }

    /// Send one chunk of 16 kHz mono little-endian PCM
    pub async fn send_audio(&mut self, pcm: &[u8]) -> Result<(), TranscriptionError> {
        self.send_frame(FrameStatus::Continue, BASE64.encode(pcm)).await
    }

    async fn send_frame(
        &mut self,
        status: FrameStatus,
        audio: String,
    ) -> Result<(), TranscriptionError> {
        let frame = AudioFrame {
            common: None,
            business: None,
            data: AudioData::new(status, Some(audio)),
        };
        self.writer
            .send(Message::Text(serde_json::to_string(&frame)?.into()))
            .await?;
        Ok(())
    }

    /// Transcript received so far
    pub async fn transcript(&self) -> String {
        self.transcript.read().await.clone()
    }

    /// Mark the end of audio, wait for the final fragment and return the transcript
    pub async fn finish(mut self) -> Result<String, TranscriptionError> {
        self.send_frame(FrameStatus::Last, String::new()).await?;

        let outcome = (&mut self.reader)
            .await
            .map_err(|_| TranscriptionError::ReaderLost)?;

        if let Err(e) = self.writer.close().await {
            tracing::debug!("Closing transcription socket: {}", e);
        }
        outcome?;

        let transcript = self.transcript.read().await.clone();
        tracing::info!("Transcription finished ({} chars)", transcript.chars().count());
        Ok(transcript)
    }
}

async fn read_fragments(
    mut read: SplitStream<Socket>,
    transcript: Arc<RwLock<String>>,
) -> Result<(), TranscriptionError> {
    while let Some(message) = read.next().await {
        match message? {
            Message::Text(text) => {
                let fragment: TranscriptFragment = serde_json::from_str(text.as_str())?;
                if fragment.code != 0 {
                    return Err(TranscriptionError::Service {
                        code: fragment.code,
                        message: fragment.message,
                    });
                }

                let piece = fragment.text();
                if !piece.is_empty() {
                    transcript.write().await.push_str(&piece);
                }
                if fragment.is_last() {
                    break;
                }
            }
            Message::Close(_) => {
                tracing::debug!("Transcription service closed the socket");
                break;
            }
            _ => {}
        }
    }
    Ok(())
}

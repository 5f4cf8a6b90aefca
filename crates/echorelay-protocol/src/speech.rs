//! Streaming transcription frames
//!
//! The first frame carries the app id and business parameters, later frames
//! carry base64 PCM only. `status` marks first (0), continuation (1) and last (2).

use serde::{Deserialize, Serialize};

pub const AUDIO_FORMAT: &str = "audio/L16;rate=16000";
pub const AUDIO_ENCODING: &str = "raw";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    First,
    Continue,
    Last,
}

impl FrameStatus {
    pub fn code(&self) -> u8 {
        match self {
            FrameStatus::First => 0,
            FrameStatus::Continue => 1,
            FrameStatus::Last => 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommonParams {
    pub app_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessParams {
    pub language: String,
    pub domain: String,
    pub accent: String,
    pub vad_eos: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioData {
    pub status: u8,
    pub format: String,
    pub encoding: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
}

impl AudioData {
    pub fn new(status: FrameStatus, audio: Option<String>) -> Self {
        Self {
            status: status.code(),
            format: AUDIO_FORMAT.to_string(),
            encoding: AUDIO_ENCODING.to_string(),
            audio,
        }
    }
}

/// Frame sent from client to the transcription service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common: Option<CommonParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business: Option<BusinessParams>,
    pub data: AudioData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub w: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Word {
    #[serde(default)]
    pub cw: Vec<Candidate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionResult {
    #[serde(default)]
    pub ws: Vec<Word>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultData {
    #[serde(default)]
    pub status: u8,
    #[serde(default)]
    pub result: Option<RecognitionResult>,
}

/// Frame received from the transcription service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptFragment {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub sid: Option<String>,
    #[serde(default)]
    pub data: Option<ResultData>,
}

impl TranscriptFragment {
    /// Text of this fragment: the best candidate of every word, concatenated
    pub fn text(&self) -> String {
        self.data
            .as_ref()
            .and_then(|d| d.result.as_ref())
            .map(|r| {
                r.ws.iter()
                    .filter_map(|w| w.cw.first())
                    .map(|c| c.w.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether the service marked this as the final fragment
    pub fn is_last(&self) -> bool {
        self.data
            .as_ref()
            .is_some_and(|d| d.status == FrameStatus::Last.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fragment_text_joins_best_candidates() {
        let fragment: TranscriptFragment = serde_json::from_value(json!({
            "code": 0,
            "message": "success",
            "sid": "iat000",
            "data": {
                "status": 1,
                "result": { "ws": [
                    { "cw": [{ "w": "hello" }, { "w": "hallo" }] },
                    { "cw": [] },
                    { "cw": [{ "w": " world" }] }
                ]}
            }
        }))
        .unwrap();

        assert_eq!(fragment.text(), "hello world");
        assert!(!fragment.is_last());
    }

    #[test]
    fn continuation_frame_has_no_params() {
        let frame = AudioFrame {
            common: None,
            business: None,
            data: AudioData::new(FrameStatus::Continue, Some("AAAA".to_string())),
        };
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(
            value,
            json!({ "data": {
                "status": 1,
                "format": "audio/L16;rate=16000",
                "encoding": "raw",
                "audio": "AAAA"
            }})
        );
    }
}

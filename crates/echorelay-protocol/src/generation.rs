//! Generation job API payloads
//!
//! Submit a prompt, then poll `async-result/{id}` until the task settles.

use serde::{Deserialize, Serialize};

/// Body of `POST /videos/generations` and `POST /images/generations`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub model: String,
}

/// Accepted video job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoJob {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageData {
    pub url: String,
}

/// Image generation is synchronous and returns the URLs directly
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageResponse {
    #[serde(default)]
    pub data: Vec<ImageData>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Processing,
    Success,
    Fail,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VideoResult {
    pub url: String,
    #[serde(default)]
    pub cover_image_url: Option<String>,
}

/// Response of `GET /async-result/{id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsyncResult {
    pub task_status: TaskStatus,
    #[serde(default)]
    pub video_result: Vec<VideoResult>,
}

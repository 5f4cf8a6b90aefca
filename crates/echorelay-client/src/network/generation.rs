//! Generation job client
//!
//! Submits a prompt and polls the async result endpoint until the job settles.
//! Independent of the relay.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::time::Instant;

use echorelay_protocol::generation::{
    AsyncResult, GenerationRequest, ImageResponse, TaskStatus, VideoJob, VideoResult,
};

use crate::network::api::{ApiClient, ApiError};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub api_url: String,
    pub api_key: String,
    pub video_model: String,
    pub image_model: String,
    pub poll_interval_ms: u64,
    pub poll_timeout_ms: u64,
    pub connect_timeout_ms: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_url: "https://open.bigmodel.cn/api/paas/v4".to_string(),
            api_key: String::new(),
            video_model: "cogvideox".to_string(),
            image_model: "cogview-3".to_string(),
            poll_interval_ms: 5_000,
            poll_timeout_ms: 600_000,
            connect_timeout_ms: 5_000,
        }
    }
}

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Prompt is empty")]
    EmptyPrompt,

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Generation finished with status {0:?}")]
    Failed(TaskStatus),

    #[error("Generation succeeded but returned no result")]
    NoResult,

    #[error("Generation did not finish within {0:?}")]
    Timeout(Duration),
}

pub struct GenerationClient {
    api: ApiClient,
    config: GenerationConfig,
}

impl GenerationClient {
    pub fn new(config: GenerationConfig) -> Result<Self, GenerationError> {
        let api = ApiClient::new(
            config.api_url.clone(),
            Some(config.api_key.clone()),
            Duration::from_millis(config.connect_timeout_ms),
        )?;
        Ok(Self { api, config })
    }

    fn request(prompt: &str, model: &str) -> Result<GenerationRequest, GenerationError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(GenerationError::EmptyPrompt);
        }
        Ok(GenerationRequest {
            prompt: prompt.to_string(),
            model: model.to_string(),
        })
    }

    /// Submit a video job and return its id
    pub async fn submit_video(&self, prompt: &str) -> Result<String, GenerationError> {
        let request = Self::request(prompt, &self.config.video_model)?;
        let job: VideoJob = self.api.post("/videos/generations", &request).await?;
        tracing::info!("Video job {} submitted", job.id);
        Ok(job.id)
    }

    pub async fn check_status(&self, id: &str) -> Result<AsyncResult, GenerationError> {
        Ok(self.api.get(&format!("/async-result/{}", id)).await?)
    }

    /// Submit a video job and wait for its first result
    pub async fn generate_video(&self, prompt: &str) -> Result<VideoResult, GenerationError> {
        let id = self.submit_video(prompt).await?;
        let interval = Duration::from_millis(self.config.poll_interval_ms);
        let timeout = Duration::from_millis(self.config.poll_timeout_ms);
        // A timeout too large to represent means no deadline
        let deadline = Instant::now().checked_add(timeout);

        loop {
            let result = match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, self.check_status(&id))
                    .await
                    .map_err(|_| GenerationError::Timeout(timeout))??,
                None => self.check_status(&id).await?,
            };

            match result.task_status {
                TaskStatus::Success => {
                    tracing::info!("Video job {} finished", id);
                    return result
                        .video_result
                        .into_iter()
                        .next()
                        .ok_or(GenerationError::NoResult);
                }
                TaskStatus::Processing => {
                    let next_poll = Instant::now().checked_add(interval);
                    if let (Some(deadline), Some(next_poll)) = (deadline, next_poll) {
                        if next_poll > deadline {
                            return Err(GenerationError::Timeout(timeout));
                        }
                    }
                    tracing::debug!("Video job {} still processing", id);
                    tokio::time::sleep(interval).await;
                }
                other => {
                    tracing::warn!("Video job {} ended with {:?}", id, other);
                    return Err(GenerationError::Failed(other));
                }
            }
        }
    }

    /// Generate an image and return its URL
    pub async fn generate_image(&self, prompt: &str) -> Result<String, GenerationError> {
        let request = Self::request(prompt, &self.config.image_model)?;
        let response: ImageResponse = self.api.post("/images/generations", &request).await?;
        response
            .data
            .into_iter()
            .next()
            .map(|image| image.url)
            .ok_or(GenerationError::NoResult)
    }
}

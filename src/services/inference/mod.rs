use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, GrayImage};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::models::catalog::Task;

pub mod local;
pub mod remote;

pub use local::LocalInferenceClient;
pub use remote::RemoteInferenceClient;

/// Prompt parameters shared by every task.
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub aspect_ratio: String,
    pub seed: Option<i64>,
    pub steps: u32,
    pub model: Option<String>,
}

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("HuggingFace API token not configured")]
    NotConfigured,
    #[error("Unknown model: {0}")]
    UnknownModel(String),
    #[error("{model} does not support {task}")]
    UnsupportedTask { model: String, task: &'static str },
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("inference backend returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("invalid response from inference backend: {0}")]
    Decode(String),
    #[error("generation failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<InferenceError>,
    },
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DeviceInfo {
    /// `local` or `remote`.
    pub backend: String,
    pub endpoint: String,
    pub default_model: String,
    pub loaded_pipeline: Option<String>,
    /// A generation currently holds the pipeline cache.
    pub busy: bool,
}

#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn text_to_image(&self, params: &GenerationParams) -> Result<DynamicImage, InferenceError>;

    async fn image_to_image(
        &self,
        image: &DynamicImage,
        params: &GenerationParams,
        strength: f64,
    ) -> Result<DynamicImage, InferenceError>;

    /// White mask pixels are regenerated.
    async fn inpaint(
        &self,
        image: &DynamicImage,
        mask: &GrayImage,
        params: &GenerationParams,
    ) -> Result<DynamicImage, InferenceError>;

    /// Output size the backend produces for `task` on `model` at `aspect_ratio`.
    fn dimensions(&self, task: Task, model: Option<&str>, aspect_ratio: &str) -> (u32, u32);

    async fn device_info(&self) -> DeviceInfo;
}

/// Fixed attempt count with a delay that grows linearly per attempt.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay after the zero-based `attempt` failed.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * (attempt + 1)
    }

    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, InferenceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, InferenceError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            tracing::info!(operation, attempt = attempt + 1, max_attempts = attempts, "calling inference backend");
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    tracing::error!(operation, attempt = attempt + 1, error = %err, "inference attempt failed");
                    if attempt + 1 >= attempts {
                        return Err(InferenceError::RetriesExhausted {
                            attempts,
                            last: Box::new(err),
                        });
                    }
                    tokio::time::sleep(self.delay_for(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }
}

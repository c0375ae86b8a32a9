use std::collections::hash_map::Entry;
use std::collections::HashMap;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use image::{DynamicImage, GrayImage};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;

use super::{DeviceInfo, GenerationParams, InferenceClient, InferenceError};
use crate::models::catalog::{self, ModelFamily, ModelInfo, Task};
use crate::utils::image_processor;

/// Inputs for one pipeline invocation, already sized for the model.
pub struct PipelineRequest<'a> {
    pub params: &'a GenerationParams,
    pub width: u32,
    pub height: u32,
    pub init_image: Option<&'a DynamicImage>,
    pub mask: Option<&'a GrayImage>,
    pub strength: Option<f64>,
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn run(&self, request: PipelineRequest<'_>) -> Result<DynamicImage, InferenceError>;
}

#[async_trait]
pub trait PipelineLoader: Send + Sync {
    async fn load(&self, model: &'static ModelInfo, task: Task) -> Result<Box<dyn Pipeline>, InferenceError>;

    fn endpoint(&self) -> String;
}

/// Runs generations against locally hosted pipelines.
///
/// Only one pipeline is resident at a time: loading a new `model:task`
/// evicts everything else. The cache lock is held through load and
/// invocation so a concurrent job cannot evict a pipeline in use.
pub struct LocalInferenceClient {
    loader: Box<dyn PipelineLoader>,
    default_model: String,
    pipelines: Mutex<HashMap<String, Box<dyn Pipeline>>>,
}

impl LocalInferenceClient {
    pub fn new(loader: Box<dyn PipelineLoader>, default_model: impl Into<String>) -> Self {
        Self {
            loader,
            default_model: default_model.into(),
            pipelines: Mutex::new(HashMap::new()),
        }
    }

    /// Picks the model that will actually serve `task`.
    fn resolve_model(&self, requested: Option<&str>, task: Task) -> Result<&'static ModelInfo, InferenceError> {
        let default = catalog::find(&self.default_model)
            .ok_or_else(|| InferenceError::UnknownModel(self.default_model.clone()))?;

        if task == Task::Inpaint {
            return Ok(default);
        }

        let Some(model_id) = requested else {
            return Ok(default);
        };
        let model = catalog::find(model_id).ok_or_else(|| InferenceError::UnknownModel(model_id.to_string()))?;

        if model.supports(task) {
            Ok(model)
        } else {
            tracing::warn!(
                model = model.id,
                task = task.as_str(),
                fallback = default.id,
                "model does not support task, using default model"
            );
            Ok(default)
        }
    }

    async fn generate(
        &self,
        model: &'static ModelInfo,
        task: Task,
        request: PipelineRequest<'_>,
    ) -> Result<DynamicImage, InferenceError> {
        let key = format!("{}:{}", model.id, task.as_str());
        let mut pipelines = self.pipelines.lock().await;

        if !pipelines.contains_key(&key) && !pipelines.is_empty() {
            let evicted: Vec<String> = pipelines.keys().cloned().collect();
            tracing::info!(?evicted, "evicting cached pipelines");
            pipelines.clear();
        }

        let pipeline = match pipelines.entry(key) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                tracing::info!(pipeline = %entry.key(), "loading pipeline");
                let loaded = self.loader.load(model, task).await?;
                entry.insert(loaded)
            }
        };

        tracing::info!(
            model = model.id,
            task = task.as_str(),
            width = request.width,
            height = request.height,
            "running local pipeline"
        );
        pipeline.run(request).await
    }
}

#[async_trait]
impl InferenceClient for LocalInferenceClient {
    async fn text_to_image(&self, params: &GenerationParams) -> Result<DynamicImage, InferenceError> {
        let model = self.resolve_model(params.model.as_deref(), Task::Text2Img)?;
        let (width, height) = catalog::dimensions_for(model.id, &params.aspect_ratio);
        let request = PipelineRequest {
            params,
            width,
            height,
            init_image: None,
            mask: None,
            strength: None,
        };
        self.generate(model, Task::Text2Img, request).await
    }

    async fn image_to_image(
        &self,
        image: &DynamicImage,
        params: &GenerationParams,
        strength: f64,
    ) -> Result<DynamicImage, InferenceError> {
        let model = self.resolve_model(params.model.as_deref(), Task::Img2Img)?;
        let request = PipelineRequest {
            params,
            width: image.width(),
            height: image.height(),
            init_image: Some(image),
            mask: None,
            strength: Some(strength),
        };
        self.generate(model, Task::Img2Img, request).await
    }

    async fn inpaint(
        &self,
        image: &DynamicImage,
        mask: &GrayImage,
        params: &GenerationParams,
    ) -> Result<DynamicImage, InferenceError> {
        let model = self.resolve_model(params.model.as_deref(), Task::Inpaint)?;
        let request = PipelineRequest {
            params,
            width: image.width(),
            height: image.height(),
            init_image: Some(image),
            mask: Some(mask),
            strength: None,
        };
        self.generate(model, Task::Inpaint, request).await
    }

    fn dimensions(&self, task: Task, model: Option<&str>, aspect_ratio: &str) -> (u32, u32) {
        let model_id = match self.resolve_model(model, task) {
            Ok(info) => info.id,
            Err(_) => model.unwrap_or(&self.default_model),
        };
        catalog::dimensions_for(model_id, aspect_ratio)
    }

    async fn device_info(&self) -> DeviceInfo {
        let (busy, loaded_pipeline) = match self.pipelines.try_lock() {
            Ok(pipelines) => (false, pipelines.keys().next().cloned()),
            Err(_) => (true, None),
        };
        DeviceInfo {
            backend: "local".to_string(),
            endpoint: self.loader.endpoint(),
            default_model: self.default_model.clone(),
            loaded_pipeline,
            busy,
        }
    }
}

/// Loads pipelines on an AUTOMATIC1111-compatible server by switching its
/// active checkpoint.
#[derive(Debug, Clone)]
pub struct WebUiLoader {
    client: Client,
    base_url: String,
}

impl WebUiLoader {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PipelineLoader for WebUiLoader {
    async fn load(&self, model: &'static ModelInfo, task: Task) -> Result<Box<dyn Pipeline>, InferenceError> {
        if model.family == ModelFamily::Flux && task != Task::Text2Img {
            return Err(InferenceError::UnsupportedTask {
                model: model.id.to_string(),
                task: task.as_str(),
            });
        }

        let checkpoint = match task {
            Task::Inpaint => model.inpaint_checkpoint.ok_or_else(|| InferenceError::UnsupportedTask {
                model: model.id.to_string(),
                task: task.as_str(),
            })?,
            _ => model.id,
        };

        let response = self
            .client
            .post(format!("{}/sdapi/v1/options", self.base_url))
            .json(&json!({ "sd_model_checkpoint": checkpoint }))
            .send()
            .await?;
        ensure_success(response).await?;

        tracing::info!(checkpoint, task = task.as_str(), "checkpoint loaded");
        Ok(Box::new(WebUiPipeline {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            task,
        }))
    }

    fn endpoint(&self) -> String {
        self.base_url.clone()
    }
}

struct WebUiPipeline {
    client: Client,
    base_url: String,
    task: Task,
}

#[derive(Deserialize)]
struct WebUiResponse {
    images: Vec<String>,
}

#[async_trait]
impl Pipeline for WebUiPipeline {
    async fn run(&self, request: PipelineRequest<'_>) -> Result<DynamicImage, InferenceError> {
        let params = request.params;
        let mut body = json!({
            "prompt": params.prompt,
            "negative_prompt": params.negative_prompt.clone().unwrap_or_default(),
            "width": request.width,
            "height": request.height,
            "steps": params.steps,
            "seed": params.seed.unwrap_or(-1),
        });

        let endpoint = match self.task {
            Task::Text2Img => "txt2img",
            Task::Img2Img | Task::Inpaint => {
                let image = request.init_image.ok_or_else(|| {
                    InferenceError::Decode(format!("{} needs a source image", self.task.as_str()))
                })?;
                body["init_images"] = json!([encode_base64(image)?]);
                body["denoising_strength"] = json!(request.strength.unwrap_or(0.75));
                if let Some(mask) = request.mask {
                    body["mask"] = json!(encode_base64(&DynamicImage::ImageLuma8(mask.clone()))?);
                    body["inpainting_fill"] = json!(1);
                    body["inpaint_full_res"] = json!(false);
                }
                "img2img"
            }
        };

        let response = self
            .client
            .post(format!("{}/sdapi/v1/{}", self.base_url, endpoint))
            .json(&body)
            .send()
            .await?;
        let response: WebUiResponse = ensure_success(response).await?.json().await?;

        let encoded = response
            .images
            .first()
            .ok_or_else(|| InferenceError::Decode("backend returned no images".to_string()))?;
        let bytes = general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| InferenceError::Decode(e.to_string()))?;
        image::load_from_memory(&bytes).map_err(|e| InferenceError::Decode(e.to_string()))
    }
}

fn encode_base64(image: &DynamicImage) -> Result<String, InferenceError> {
    let png = image_processor::encode_png(image).map_err(|e| InferenceError::Decode(e.to_string()))?;
    Ok(general_purpose::STANDARD.encode(png))
}

pub(crate) async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, InferenceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(InferenceError::Status {
        status: status.as_u16(),
        message,
    })
}

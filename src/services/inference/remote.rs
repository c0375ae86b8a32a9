use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use image::{DynamicImage, GrayImage};
use reqwest::Client;
use serde_json::{json, Value};

use super::local::ensure_success;
use super::{DeviceInfo, GenerationParams, InferenceClient, InferenceError, RetryPolicy};
use crate::models::catalog::{self, Task};
use crate::utils::image_processor;

/// Denoising strength for hosted inpainting, which has no mask input.
const INPAINT_STRENGTH: f64 = 0.75;

/// HuggingFace Inference API client.
#[derive(Debug, Clone)]
pub struct RemoteInferenceClient {
    client: Client,
    api_token: Option<String>,
    base_url: String,
    retry: RetryPolicy,
}

impl RemoteInferenceClient {
    pub fn new(api_token: Option<String>, base_url: impl Into<String>) -> Self {
        if api_token.is_none() {
            tracing::warn!("HuggingFace API token not configured");
        }
        Self {
            client: Client::new(),
            api_token,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry: RetryPolicy::default(),
        }
    }

    #[cfg(test)]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn model_for(task: Task, requested: Option<&str>) -> &str {
        match (requested, task) {
            (Some(model), _) => model,
            (None, Task::Text2Img) => catalog::REMOTE_TEXT2IMG_MODEL,
            (None, _) => catalog::REMOTE_IMG2IMG_MODEL,
        }
    }

    async fn post_image(&self, operation: &str, model: &str, body: Value) -> Result<DynamicImage, InferenceError> {
        let token = self.api_token.as_deref().ok_or(InferenceError::NotConfigured)?;
        let url = format!("{}/{}", self.base_url, model);
        tracing::debug!(url = %url, "sending HuggingFace request");

        self.retry
            .run(operation, || self.request(&url, token, &body))
            .await
    }

    async fn request(&self, url: &str, token: &str, body: &Value) -> Result<DynamicImage, InferenceError> {
        let response = self.client.post(url).bearer_auth(token).json(body).send().await?;
        let bytes = ensure_success(response).await?.bytes().await?;
        image::load_from_memory(&bytes).map_err(|e| InferenceError::Decode(e.to_string()))
    }

    async fn transform(
        &self,
        operation: &str,
        image: &DynamicImage,
        params: &GenerationParams,
        strength: f64,
    ) -> Result<DynamicImage, InferenceError> {
        let model = Self::model_for(Task::Img2Img, params.model.as_deref());
        let png = image_processor::encode_png(image).map_err(|e| InferenceError::Decode(e.to_string()))?;
        let body = json!({
            "inputs": general_purpose::STANDARD.encode(png),
            "parameters": {
                "prompt": params.prompt,
                "negative_prompt": params.negative_prompt,
                "strength": strength,
                "num_inference_steps": params.steps,
                "seed": params.seed,
            },
        });
        tracing::info!(model, strength, "transforming image");
        self.post_image(operation, model, body).await
    }
}

#[async_trait]
impl InferenceClient for RemoteInferenceClient {
    async fn text_to_image(&self, params: &GenerationParams) -> Result<DynamicImage, InferenceError> {
        let model = Self::model_for(Task::Text2Img, params.model.as_deref());
        let (width, height) = catalog::dimensions_for(model, &params.aspect_ratio);
        let body = json!({
            "inputs": params.prompt,
            "parameters": {
                "negative_prompt": params.negative_prompt,
                "width": width,
                "height": height,
                "num_inference_steps": params.steps,
                "seed": params.seed,
            },
        });
        tracing::info!(model, width, height, "generating image");
        self.post_image("text_to_image", model, body).await
    }

    async fn image_to_image(
        &self,
        image: &DynamicImage,
        params: &GenerationParams,
        strength: f64,
    ) -> Result<DynamicImage, InferenceError> {
        self.transform("image_to_image", image, params, strength).await
    }

    /// The hosted API has no mask input: the whole source is transformed and
    /// the caller composites the masked area back over the original.
    async fn inpaint(
        &self,
        image: &DynamicImage,
        _mask: &GrayImage,
        params: &GenerationParams,
    ) -> Result<DynamicImage, InferenceError> {
        self.transform("inpaint", image, params, INPAINT_STRENGTH).await
    }

    fn dimensions(&self, task: Task, model: Option<&str>, aspect_ratio: &str) -> (u32, u32) {
        catalog::dimensions_for(Self::model_for(task, model), aspect_ratio)
    }

    async fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            backend: "remote".to_string(),
            endpoint: self.base_url.clone(),
            default_model: catalog::REMOTE_TEXT2IMG_MODEL.to_string(),
            loaded_pipeline: None,
            busy: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::State,
        http::{HeaderMap, StatusCode},
        routing::post,
        Json, Router,
    };
    use image::{Rgb, RgbImage};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Clone)]
    struct Backend {
        failures_left: Arc<AtomicU32>,
        hits: Arc<AtomicU32>,
        last_body: Arc<Mutex<Option<(String, Value)>>>,
        png: Arc<Vec<u8>>,
    }

    async fn handle(
        State(backend): State<Backend>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (StatusCode, Vec<u8>) {
        backend.hits.fetch_add(1, Ordering::SeqCst);
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        *backend.last_body.lock().unwrap() = Some((auth, body));

        let remaining = backend.failures_left.load(Ordering::SeqCst);
        if remaining > 0 {
            backend.failures_left.store(remaining - 1, Ordering::SeqCst);
            return (StatusCode::SERVICE_UNAVAILABLE, b"model is loading".to_vec());
        }
        (StatusCode::OK, backend.png.as_ref().clone())
    }

    async fn spawn_backend(failures: u32) -> (String, Backend) {
        let png = image_processor::encode_png(&DynamicImage::ImageRgb8(RgbImage::from_pixel(
            16,
            16,
            Rgb([1, 2, 3]),
        )))
        .unwrap();
        let backend = Backend {
            failures_left: Arc::new(AtomicU32::new(failures)),
            hits: Arc::new(AtomicU32::new(0)),
            last_body: Arc::new(Mutex::new(None)),
            png: Arc::new(png),
        };
        let app = Router::new()
            .route("/{*model}", post(handle))
            .with_state(backend.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });
        (format!("http://{addr}"), backend)
    }

    fn fast_client(base_url: String) -> RemoteInferenceClient {
        RemoteInferenceClient::new(Some("hf_test".to_string()), base_url).with_retry_policy(RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(5),
        })
    }

    fn params() -> GenerationParams {
        GenerationParams {
            prompt: "a red fox".to_string(),
            negative_prompt: Some("blurry".to_string()),
            aspect_ratio: "16:9".to_string(),
            seed: Some(42),
            steps: 25,
            model: None,
        }
    }

    #[tokio::test]
    async fn retries_until_backend_recovers() {
        let (url, backend) = spawn_backend(2).await;
        let image = fast_client(url).text_to_image(&params()).await.unwrap();

        assert_eq!((image.width(), image.height()), (16, 16));
        assert_eq!(backend.hits.load(Ordering::SeqCst), 3);

        let (auth, body) = backend.last_body.lock().unwrap().clone().unwrap();
        assert_eq!(auth, "Bearer hf_test");
        assert_eq!(body["inputs"], "a red fox");
        assert_eq!(body["parameters"]["width"], 1344);
        assert_eq!(body["parameters"]["height"], 768);
        assert_eq!(body["parameters"]["seed"], 42);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_as_one_error() {
        let (url, backend) = spawn_backend(5).await;
        let err = fast_client(url).text_to_image(&params()).await.unwrap_err();

        assert_eq!(backend.hits.load(Ordering::SeqCst), 3);
        match err {
            InferenceError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, InferenceError::Status { status: 503, .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn image_to_image_sends_encoded_source() {
        let (url, backend) = spawn_backend(0).await;
        let source = DynamicImage::ImageRgb8(RgbImage::new(4, 4));
        fast_client(url).image_to_image(&source, &params(), 0.6).await.unwrap();

        let (_, body) = backend.last_body.lock().unwrap().clone().unwrap();
        let decoded = general_purpose::STANDARD
            .decode(body["inputs"].as_str().unwrap())
            .unwrap();
        assert_eq!(image::load_from_memory(&decoded).unwrap().width(), 4);
        assert_eq!(body["parameters"]["prompt"], "a red fox");
        assert_eq!(body["parameters"]["strength"], 0.6);
    }

    #[tokio::test]
    async fn missing_token_fails_without_calling_backend() {
        let (url, backend) = spawn_backend(0).await;
        let client = RemoteInferenceClient::new(None, url);
        let err = client.text_to_image(&params()).await.unwrap_err();

        assert!(matches!(err, InferenceError::NotConfigured));
        assert_eq!(backend.hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn defaults_to_hosted_models() {
        let client = RemoteInferenceClient::new(Some("t".into()), "http://localhost");
        assert_eq!(client.dimensions(Task::Text2Img, None, "1:1"), (1024, 1024));
        assert_eq!(
            client.dimensions(Task::Img2Img, Some("runwayml/stable-diffusion-v1-5"), "1:1"),
            (512, 512)
        );
    }
}

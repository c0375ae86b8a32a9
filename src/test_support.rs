use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request};
use axum::Router;
use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, Set};
use uuid::Uuid;

use crate::config::Config;
use crate::entities::user;
use crate::models::catalog::{self, Task};
use crate::services::inference::{DeviceInfo, GenerationParams, InferenceClient, InferenceError};
use crate::state::AppState;

pub async fn setup_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    db
}

pub async fn create_user(db: &DatabaseConnection, username: &str, is_admin: bool) -> user::Model {
    let now = chrono::Utc::now().naive_utc();
    user::ActiveModel {
        id: Set(Uuid::new_v4()),
        email: Set(format!("{username}@example.com")),
        username: Set(username.to_string()),
        password: Set(crate::services::auth::hash_password("password123").unwrap()),
        is_active: Set(true),
        is_admin: Set(is_admin),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .unwrap()
}

/// Paints every output solid blue at the catalog size.
#[derive(Default)]
pub struct FakeInference {
    pub fail: bool,
    pub strengths: Mutex<Vec<f64>>,
}

impl FakeInference {
    fn output(&self, width: u32, height: u32) -> Result<DynamicImage, InferenceError> {
        if self.fail {
            return Err(InferenceError::RetriesExhausted {
                attempts: 3,
                last: Box::new(InferenceError::Status {
                    status: 503,
                    message: "unavailable".to_string(),
                }),
            });
        }
        Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([0, 0, 255]))))
    }
}

#[async_trait]
impl InferenceClient for FakeInference {
    async fn text_to_image(&self, params: &GenerationParams) -> Result<DynamicImage, InferenceError> {
        let (w, h) = self.dimensions(Task::Text2Img, params.model.as_deref(), &params.aspect_ratio);
        self.output(w, h)
    }

    async fn image_to_image(
        &self,
        image: &DynamicImage,
        _params: &GenerationParams,
        strength: f64,
    ) -> Result<DynamicImage, InferenceError> {
        self.strengths.lock().unwrap().push(strength);
        self.output(image.width(), image.height())
    }

    async fn inpaint(
        &self,
        image: &DynamicImage,
        _mask: &GrayImage,
        _params: &GenerationParams,
    ) -> Result<DynamicImage, InferenceError> {
        self.output(image.width(), image.height())
    }

    fn dimensions(&self, _task: Task, model: Option<&str>, aspect_ratio: &str) -> (u32, u32) {
        catalog::dimensions_for(model.unwrap_or(catalog::DEFAULT_MODEL), aspect_ratio)
    }

    async fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            backend: "fake".to_string(),
            endpoint: String::new(),
            default_model: catalog::DEFAULT_MODEL.to_string(),
            loaded_pipeline: None,
            busy: false,
        }
    }
}

/// Router plus state over an in-memory database and a throwaway file root.
pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    root: PathBuf,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

impl TestApp {
    pub async fn new() -> Self {
        let root = std::env::temp_dir().join(format!("image-playground-app-{}", Uuid::new_v4()));
        let config = Config {
            upload_dir: root.join("uploads"),
            generated_dir: root.join("generated"),
            max_image_size_mb: 1,
            daily_generation_limit: 3,
            ..Config::default()
        };
        let state = AppState::new(setup_db().await, config, Arc::new(FakeInference::default()));
        let router = crate::routes::create_routes(state.clone());
        Self { state, router, root }
    }

    pub fn token_for(&self, user: &user::Model) -> String {
        crate::services::auth::issue_access_token(user, &self.state.config).unwrap()
    }

    pub fn get(&self, uri: &str, token: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    }

    pub fn json(&self, method: &str, uri: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }
}

pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;

use thiserror::Error;

use crate::models::catalog;

pub const APP_NAME: &str = "ImagePlayground";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_JWT_SECRET: &str = "dev-secret-key-change-in-production";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} has an invalid value '{value}'")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub jwt_secret: String,
    pub access_token_expire_minutes: i64,
    pub refresh_token_expire_days: i64,
    pub huggingface_api_token: Option<String>,
    pub huggingface_api_url: String,
    pub use_local_inference: bool,
    pub local_inference_url: String,
    pub default_model: String,
    pub upload_dir: PathBuf,
    pub generated_dir: PathBuf,
    pub max_image_size_mb: usize,
    pub daily_generation_limit: i32,
    pub image_cleanup_enabled: bool,
    pub cors_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            database_url: "sqlite://./data/app.db?mode=rwc".to_string(),
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            access_token_expire_minutes: 30,
            refresh_token_expire_days: 7,
            huggingface_api_token: None,
            huggingface_api_url: "https://api-inference.huggingface.co/models".to_string(),
            use_local_inference: true,
            local_inference_url: "http://127.0.0.1:7860".to_string(),
            default_model: catalog::DEFAULT_MODEL.to_string(),
            upload_dir: PathBuf::from("./uploads"),
            generated_dir: PathBuf::from("./generated"),
            max_image_size_mb: 10,
            daily_generation_limit: 10,
            image_cleanup_enabled: false,
            cors_origins: vec![
                "http://localhost:5173".to_string(),
                "http://127.0.0.1:5173".to_string(),
            ],
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let jwt_secret = match env::var("JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ => {
                tracing::warn!("JWT_SECRET not set, using the development default");
                defaults.jwt_secret
            }
        };

        Ok(Self {
            host: env::var("HOST").unwrap_or(defaults.host),
            port: parse_var("PORT", defaults.port)?,
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            jwt_secret,
            access_token_expire_minutes: parse_var(
                "ACCESS_TOKEN_EXPIRE_MINUTES",
                defaults.access_token_expire_minutes,
            )?,
            refresh_token_expire_days: parse_var(
                "REFRESH_TOKEN_EXPIRE_DAYS",
                defaults.refresh_token_expire_days,
            )?,
            huggingface_api_token: env::var("HUGGINGFACE_API_TOKEN")
                .ok()
                .filter(|token| !token.is_empty()),
            huggingface_api_url: env::var("HUGGINGFACE_API_URL")
                .unwrap_or(defaults.huggingface_api_url),
            use_local_inference: parse_bool("USE_LOCAL_INFERENCE", defaults.use_local_inference)?,
            local_inference_url: env::var("LOCAL_INFERENCE_URL")
                .unwrap_or(defaults.local_inference_url),
            default_model: env::var("DEFAULT_MODEL").unwrap_or(defaults.default_model),
            upload_dir: env::var("UPLOAD_DIR").map(PathBuf::from).unwrap_or(defaults.upload_dir),
            generated_dir: env::var("GENERATED_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.generated_dir),
            max_image_size_mb: parse_var("MAX_IMAGE_SIZE_MB", defaults.max_image_size_mb)?,
            daily_generation_limit: parse_var(
                "DAILY_GENERATION_LIMIT",
                defaults.daily_generation_limit,
            )?,
            image_cleanup_enabled: parse_bool(
                "IMAGE_CLEANUP_ENABLED",
                defaults.image_cleanup_enabled,
            )?,
            cors_origins: env::var("CORS_ORIGINS")
                .map(|raw| parse_origins(&raw))
                .unwrap_or(defaults.cors_origins),
        })
    }

    pub fn max_image_size_bytes(&self) -> usize {
        self.max_image_size_mb * 1024 * 1024
    }
}

fn parse_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(default),
    }
}

fn parse_bool(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(key) {
        Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid { key, value }),
        },
        Err(_) => Ok(default),
    }
}

/// Accepts either a JSON array or a comma separated list.
fn parse_origins(raw: &str) -> Vec<String> {
    if let Ok(list) = serde_json::from_str::<Vec<String>>(raw) {
        return list;
    }
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

pub fn init_config() -> Result<&'static Config, ConfigError> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }
    let config = Config::from_env()?;
    Ok(CONFIG.get_or_init(|| config))
}

use axum::response::Json;
use serde::Serialize;

use crate::config::{APP_NAME, APP_VERSION};

#[derive(Serialize, utoipa::ToSchema)]
pub struct RootResponse {
    pub name: String,
    pub version: String,
    pub docs: String,
    pub endpoints: Vec<String>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service name, version and entry points", body = RootResponse)
    ),
    tag = "General"
)]
pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        name: APP_NAME.to_string(),
        version: APP_VERSION.to_string(),
        docs: "/swagger-ui/".to_string(),
        endpoints: [
            "/api/auth",
            "/api/jobs",
            "/api/images",
            "/api/presets",
            "/api/models",
            "/health",
        ]
        .iter()
        .map(|e| e.to_string())
        .collect(),
    })
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    ),
    tag = "General"
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: APP_VERSION.to_string(),
    })
}

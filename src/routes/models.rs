use axum::{extract::State, response::Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::models::catalog::{self, ModelFamily, ModelInfo, Task};
use crate::services::inference::DeviceInfo;
use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct ModelResponse {
    pub id: String,
    pub name: String,
    pub description: String,
    pub family: ModelFamily,
    pub vram_requirement: String,
    pub base_resolution: u32,
    pub tasks: Vec<Task>,
    pub supports_inpaint: bool,
}

impl From<&ModelInfo> for ModelResponse {
    fn from(info: &ModelInfo) -> Self {
        Self {
            id: info.id.to_string(),
            name: info.name.to_string(),
            description: info.description.to_string(),
            family: info.family,
            vram_requirement: info.vram_requirement.to_string(),
            base_resolution: info.base_resolution,
            tasks: info.tasks.to_vec(),
            supports_inpaint: info.supports(Task::Inpaint),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ModelListResponse {
    pub models: Vec<ModelResponse>,
    pub default_model: String,
    pub aspect_ratios: Vec<String>,
}

#[utoipa::path(
    get,
    path = "/api/models",
    responses(
        (status = 200, description = "Model catalog and the model used when a job names none", body = ModelListResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Models"
)]
pub async fn list_models(State(state): State<AppState>) -> Json<ModelListResponse> {
    let device = state.worker.inference().device_info().await;
    Json(ModelListResponse {
        models: catalog::MODELS.iter().map(ModelResponse::from).collect(),
        default_model: device.default_model,
        aspect_ratios: catalog::ASPECT_RATIOS.iter().map(|r| r.to_string()).collect(),
    })
}

#[utoipa::path(
    get,
    path = "/api/models/device",
    responses(
        (status = 200, description = "Inference backend, endpoint and resident pipeline", body = DeviceInfo)
    ),
    security(("bearer_auth" = [])),
    tag = "Models"
)]
pub async fn device_info(State(state): State<AppState>) -> Json<DeviceInfo> {
    Json(state.worker.inference().device_info().await)
}

#[cfg(test)]
mod tests {
    use crate::test_support::{body_json, create_user, TestApp};
    use axum::http::StatusCode;
    use tower::ServiceExt;

    #[tokio::test]
    async fn catalog_lists_every_model_with_default() {
        let app = TestApp::new().await;
        let user = create_user(&app.state.db, "ada", false).await;

        let response = app
            .router
            .clone()
            .oneshot(app.get("/api/models", &app.token_for(&user)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["models"].as_array().unwrap().len(), crate::models::catalog::MODELS.len());
        assert_eq!(body["default_model"], crate::models::catalog::DEFAULT_MODEL);

        let flux = body["models"]
            .as_array()
            .unwrap()
            .iter()
            .find(|m| m["family"] == "flux")
            .unwrap();
        assert_eq!(flux["supports_inpaint"], false);
    }

    #[tokio::test]
    async fn device_reports_backend() {
        let app = TestApp::new().await;
        let user = create_user(&app.state.db, "ada", false).await;

        let response = app
            .router
            .clone()
            .oneshot(app.get("/api/models/device", &app.token_for(&user)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["backend"], "fake");
    }
}

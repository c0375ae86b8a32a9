use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, ModelTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::entities::preset::{self, PresetCategory};
use crate::error::AppError;
use crate::routes::auth::MessageResponse;
use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct PresetResponse {
    pub id: Uuid,
    pub name: String,
    pub name_ko: Option<String>,
    pub description: Option<String>,
    pub description_ko: Option<String>,
    pub category: PresetCategory,
    pub default_prompt: Option<String>,
    pub default_negative_prompt: Option<String>,
    pub recommended_steps: i32,
    pub recommended_strength: Option<f64>,
    pub icon: Option<String>,
    pub thumbnail_url: Option<String>,
    pub is_system: bool,
    pub is_active: bool,
    pub sort_order: i32,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

impl From<preset::Model> for PresetResponse {
    fn from(model: preset::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            name_ko: model.name_ko,
            description: model.description,
            description_ko: model.description_ko,
            category: model.category,
            default_prompt: model.default_prompt,
            default_negative_prompt: model.default_negative_prompt,
            recommended_steps: model.recommended_steps,
            recommended_strength: model.recommended_strength,
            icon: model.icon,
            thumbnail_url: model.thumbnail_url,
            is_system: model.is_system,
            is_active: model.is_active,
            sort_order: model.sort_order,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PresetListResponse {
    pub items: Vec<PresetResponse>,
    pub total: usize,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PresetFilter {
    pub category: Option<PresetCategory>,
}

fn default_category() -> PresetCategory {
    PresetCategory::Custom
}

fn default_recommended_steps() -> i32 {
    30
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePresetRequest {
    pub name: String,
    pub name_ko: Option<String>,
    pub description: Option<String>,
    pub description_ko: Option<String>,
    #[serde(default = "default_category")]
    pub category: PresetCategory,
    pub default_prompt: Option<String>,
    pub default_negative_prompt: Option<String>,
    #[serde(default = "default_recommended_steps")]
    pub recommended_steps: i32,
    pub recommended_strength: Option<f64>,
    pub icon: Option<String>,
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub sort_order: i32,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdatePresetRequest {
    pub name: Option<String>,
    pub name_ko: Option<String>,
    pub description: Option<String>,
    pub description_ko: Option<String>,
    pub category: Option<PresetCategory>,
    pub default_prompt: Option<String>,
    pub default_negative_prompt: Option<String>,
    pub recommended_steps: Option<i32>,
    pub recommended_strength: Option<f64>,
    pub icon: Option<String>,
    pub thumbnail_url: Option<String>,
    pub is_active: Option<bool>,
    pub sort_order: Option<i32>,
}

fn check_len(field: &str, value: Option<&str>, min: usize, max: usize) -> Result<(), AppError> {
    match value.map(|v| v.chars().count()) {
        Some(len) if len < min || len > max => Err(AppError::BadRequest(format!(
            "{field} must be between {min} and {max} characters"
        ))),
        _ => Ok(()),
    }
}

fn check_tuning(steps: Option<i32>, strength: Option<f64>) -> Result<(), AppError> {
    if steps.is_some_and(|s| !(10..=50).contains(&s)) {
        return Err(AppError::BadRequest("recommended_steps must be between 10 and 50".to_string()));
    }
    if strength.is_some_and(|s| !(0.0..=1.0).contains(&s)) {
        return Err(AppError::BadRequest(
            "recommended_strength must be between 0.0 and 1.0".to_string(),
        ));
    }
    Ok(())
}

impl UpdatePresetRequest {
    fn validate(&self) -> Result<(), AppError> {
        check_len("name", self.name.as_deref(), 1, 100)?;
        check_len("name_ko", self.name_ko.as_deref(), 0, 100)?;
        check_len("icon", self.icon.as_deref(), 0, 50)?;
        check_len("thumbnail_url", self.thumbnail_url.as_deref(), 0, 500)?;
        check_tuning(self.recommended_steps, self.recommended_strength)
    }
}

impl CreatePresetRequest {
    fn validate(&self) -> Result<(), AppError> {
        check_len("name", Some(&self.name), 1, 100)?;
        check_len("name_ko", self.name_ko.as_deref(), 0, 100)?;
        check_len("icon", self.icon.as_deref(), 0, 50)?;
        check_len("thumbnail_url", self.thumbnail_url.as_deref(), 0, 500)?;
        check_tuning(Some(self.recommended_steps), self.recommended_strength)
    }
}

async fn find_preset(state: &AppState, id: Uuid) -> Result<preset::Model, AppError> {
    preset::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Preset not found".to_string()))
}

#[utoipa::path(
    get,
    path = "/api/presets",
    params(PresetFilter),
    responses(
        (status = 200, description = "Active presets ordered by sort_order, then name", body = PresetListResponse)
    ),
    tag = "Presets"
)]
pub async fn list_presets(
    State(state): State<AppState>,
    Query(filter): Query<PresetFilter>,
) -> Result<Json<PresetListResponse>, AppError> {
    let mut query = preset::Entity::find().filter(preset::Column::IsActive.eq(true));
    if let Some(category) = filter.category {
        query = query.filter(preset::Column::Category.eq(category));
    }

    let items: Vec<PresetResponse> = query
        .order_by_asc(preset::Column::SortOrder)
        .order_by_asc(preset::Column::Name)
        .all(&state.db)
        .await?
        .into_iter()
        .map(PresetResponse::from)
        .collect();

    Ok(Json(PresetListResponse {
        total: items.len(),
        items,
    }))
}

#[utoipa::path(
    get,
    path = "/api/presets/{id}",
    params(("id" = Uuid, Path, description = "Preset id")),
    responses(
        (status = 200, description = "Preset details", body = PresetResponse),
        (status = 404, description = "Preset not found or inactive", body = crate::error::ErrorResponse)
    ),
    tag = "Presets"
)]
pub async fn get_preset(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PresetResponse>, AppError> {
    let preset = find_preset(&state, id).await?;
    if !preset.is_active {
        return Err(AppError::NotFound("Preset not found".to_string()));
    }
    Ok(Json(PresetResponse::from(preset)))
}

#[utoipa::path(
    post,
    path = "/api/presets",
    request_body = CreatePresetRequest,
    responses(
        (status = 201, description = "Preset created", body = PresetResponse),
        (status = 400, description = "Invalid preset", body = crate::error::ErrorResponse),
        (status = 403, description = "Admin privileges required", body = crate::error::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Presets"
)]
pub async fn create_preset(
    State(state): State<AppState>,
    Json(payload): Json<CreatePresetRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let now = chrono::Utc::now().naive_utc();
    let preset = preset::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(payload.name),
        name_ko: Set(payload.name_ko),
        description: Set(payload.description),
        description_ko: Set(payload.description_ko),
        category: Set(payload.category),
        default_prompt: Set(payload.default_prompt),
        default_negative_prompt: Set(payload.default_negative_prompt),
        recommended_steps: Set(payload.recommended_steps),
        recommended_strength: Set(payload.recommended_strength),
        icon: Set(payload.icon),
        thumbnail_url: Set(payload.thumbnail_url),
        is_system: Set(false),
        is_active: Set(true),
        sort_order: Set(payload.sort_order),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&state.db)
    .await?;

    tracing::info!(preset_id = %preset.id, name = %preset.name, "created preset");
    Ok((StatusCode::CREATED, Json(PresetResponse::from(preset))))
}

#[utoipa::path(
    patch,
    path = "/api/presets/{id}",
    params(("id" = Uuid, Path, description = "Preset id")),
    request_body = UpdatePresetRequest,
    responses(
        (status = 200, description = "Preset updated", body = PresetResponse),
        (status = 400, description = "Invalid preset", body = crate::error::ErrorResponse),
        (status = 403, description = "Admin privileges required", body = crate::error::ErrorResponse),
        (status = 404, description = "Preset not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Presets"
)]
pub async fn update_preset(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePresetRequest>,
) -> Result<Json<PresetResponse>, AppError> {
    payload.validate()?;
    let mut active: preset::ActiveModel = find_preset(&state, id).await?.into();

    if let Some(name) = payload.name {
        active.name = Set(name);
    }
    if let Some(name_ko) = payload.name_ko {
        active.name_ko = Set(Some(name_ko));
    }
    if let Some(description) = payload.description {
        active.description = Set(Some(description));
    }
    if let Some(description_ko) = payload.description_ko {
        active.description_ko = Set(Some(description_ko));
    }
    if let Some(category) = payload.category {
        active.category = Set(category);
    }
    if let Some(prompt) = payload.default_prompt {
        active.default_prompt = Set(Some(prompt));
    }
    if let Some(negative) = payload.default_negative_prompt {
        active.default_negative_prompt = Set(Some(negative));
    }
    if let Some(steps) = payload.recommended_steps {
        active.recommended_steps = Set(steps);
    }
    if let Some(strength) = payload.recommended_strength {
        active.recommended_strength = Set(Some(strength));
    }
    if let Some(icon) = payload.icon {
        active.icon = Set(Some(icon));
    }
    if let Some(url) = payload.thumbnail_url {
        active.thumbnail_url = Set(Some(url));
    }
    if let Some(is_active) = payload.is_active {
        active.is_active = Set(is_active);
    }
    if let Some(sort_order) = payload.sort_order {
        active.sort_order = Set(sort_order);
    }
    active.updated_at = Set(chrono::Utc::now().naive_utc());

    let preset = active.update(&state.db).await?;
    tracing::info!(preset_id = %preset.id, "updated preset");
    Ok(Json(PresetResponse::from(preset)))
}

#[utoipa::path(
    delete,
    path = "/api/presets/{id}",
    params(("id" = Uuid, Path, description = "Preset id")),
    responses(
        (status = 200, description = "Preset deleted", body = MessageResponse),
        (status = 403, description = "Admin privileges required", body = crate::error::ErrorResponse),
        (status = 404, description = "Preset not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Presets"
)]
pub async fn delete_preset(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, AppError> {
    let preset = find_preset(&state, id).await?;
    preset.delete(&state.db).await?;

    tracing::info!(preset_id = %id, "deleted preset");
    Ok(Json(MessageResponse {
        message: "Preset deleted".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use crate::services::presets::seed_presets;
    use crate::test_support::{body_json, create_user, TestApp};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    fn public_get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn list_filters_by_category_in_sort_order() {
        let app = TestApp::new().await;
        seed_presets(&app.state.db).await.unwrap();

        let response = app.router.clone().oneshot(public_get("/api/presets")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["total"], 8);
        assert_eq!(body["items"][0]["name"], "Remove Object");
        assert_eq!(body["items"][7]["name"], "Custom Edit");

        let response = app
            .router
            .clone()
            .oneshot(public_get("/api/presets?category=background_replace"))
            .await
            .unwrap();
        let body = body_json(response).await;
        let names: Vec<&str> = body["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Replace Background", "Sky Replacement"]);
    }

    #[tokio::test]
    async fn only_admins_manage_presets() {
        let app = TestApp::new().await;
        let user = create_user(&app.state.db, "ada", false).await;
        let admin = create_user(&app.state.db, "root", true).await;
        let body = json!({"name": "Watercolor", "category": "style_transfer", "recommended_steps": 25});

        let response = app
            .router
            .clone()
            .oneshot(app.json("POST", "/api/presets", Some(&app.token_for(&user)), body.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let admin_token = app.token_for(&admin);
        let response = app
            .router
            .clone()
            .oneshot(app.json("POST", "/api/presets", Some(&admin_token), body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = body_json(response).await;
        assert_eq!(created["is_system"], false);
        let id = created["id"].as_str().unwrap().to_string();

        let response = app
            .router
            .clone()
            .oneshot(app.json(
                "PATCH",
                &format!("/api/presets/{id}"),
                Some(&admin_token),
                json!({"is_active": false}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .router
            .clone()
            .oneshot(public_get(&format!("/api/presets/{id}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .router
            .clone()
            .oneshot(app.json("DELETE", &format!("/api/presets/{id}"), Some(&admin_token), json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn invalid_tuning_is_rejected() {
        let app = TestApp::new().await;
        let admin = create_user(&app.state.db, "root", true).await;

        let response = app
            .router
            .clone()
            .oneshot(app.json(
                "POST",
                "/api/presets",
                Some(&app.token_for(&admin)),
                json!({"name": "Too many steps", "recommended_steps": 80}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

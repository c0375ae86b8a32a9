use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Json, Response},
    Extension,
};
use sea_orm::{ColumnTrait, EntityTrait, ModelTrait, PaginatorTrait, QueryFilter, QueryOrder};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::generated_image;
use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::pagination::{PaginatedResponse, Pagination};
use crate::routes::auth::MessageResponse;
use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct ImageResponse {
    pub id: Uuid,
    pub job_id: Uuid,
    pub width: i32,
    pub height: i32,
    pub file_size: i64,
    pub mime_type: String,
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub parameters: serde_json::Value,
    pub created_at: chrono::NaiveDateTime,
    pub expires_at: chrono::NaiveDateTime,
    pub is_expired: bool,
}

impl From<generated_image::Model> for ImageResponse {
    fn from(model: generated_image::Model) -> Self {
        let is_expired = model.is_expired(chrono::Utc::now().naive_utc());
        Self {
            id: model.id,
            job_id: model.job_id,
            width: model.width,
            height: model.height,
            file_size: model.file_size,
            mime_type: model.mime_type,
            prompt: model.prompt,
            negative_prompt: model.negative_prompt,
            parameters: model.parameters,
            created_at: model.created_at,
            expires_at: model.expires_at,
            is_expired,
        }
    }
}

async fn find_owned(state: &AppState, id: Uuid, user_id: Uuid) -> Result<generated_image::Model, AppError> {
    generated_image::Entity::find_by_id(id)
        .filter(generated_image::Column::UserId.eq(user_id))
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Image not found".to_string()))
}

async fn read_file(state: &AppState, path: &str) -> Result<Vec<u8>, AppError> {
    state
        .store
        .read(path)
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .ok_or_else(|| AppError::NotFound("Image file not found".to_string()))
}

#[utoipa::path(
    get,
    path = "/api/images",
    params(Pagination),
    responses(
        (status = 200, description = "The caller's generated images, newest first", body = PaginatedResponse<ImageResponse>),
        (status = 400, description = "Invalid paging parameters", body = crate::error::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Images"
)]
pub async fn gallery(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<PaginatedResponse<ImageResponse>>, AppError> {
    let (page, page_size) = pagination.resolve()?;

    let paginator = generated_image::Entity::find()
        .filter(generated_image::Column::UserId.eq(auth_user.id))
        .order_by_desc(generated_image::Column::CreatedAt)
        .paginate(&state.db, page_size);
    let total = paginator.num_items().await?;
    let images = paginator.fetch_page(page - 1).await?;

    let items = images.into_iter().map(ImageResponse::from).collect();
    Ok(Json(PaginatedResponse::new(items, total, page, page_size)))
}

#[utoipa::path(
    get,
    path = "/api/images/{id}",
    params(("id" = Uuid, Path, description = "Image id")),
    responses(
        (status = 200, description = "Image metadata", body = ImageResponse),
        (status = 404, description = "Image not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Images"
)]
pub async fn get_image(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<ImageResponse>, AppError> {
    let image = find_owned(&state, id, auth_user.id).await?;
    Ok(Json(ImageResponse::from(image)))
}

#[utoipa::path(
    get,
    path = "/api/images/{id}/download",
    params(("id" = Uuid, Path, description = "Image id")),
    responses(
        (status = 200, description = "PNG attachment", content_type = "image/png"),
        (status = 404, description = "Image not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Images"
)]
pub async fn download_image(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let image = find_owned(&state, id, auth_user.id).await?;
    let data = read_file(&state, &image.file_path).await?;

    let disposition = format!("attachment; filename=\"imageplayground_{}.png\"", image.id);
    Ok((
        [
            (header::CONTENT_TYPE, image.mime_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        data,
    )
        .into_response())
}

#[utoipa::path(
    get,
    path = "/api/images/{id}/thumbnail",
    params(("id" = Uuid, Path, description = "Image id")),
    responses(
        (status = 200, description = "Thumbnail, or the full image when no thumbnail exists", content_type = "image/png"),
        (status = 404, description = "Image not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Images"
)]
pub async fn get_thumbnail(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let image = find_owned(&state, id, auth_user.id).await?;

    let thumbnail = match &image.thumbnail_path {
        Some(path) => state
            .store
            .read(path)
            .await
            .map_err(|e| AppError::InternalServerError(e.to_string()))?,
        None => None,
    };
    let data = match thumbnail {
        Some(data) => data,
        None => read_file(&state, &image.file_path).await?,
    };

    Ok(([(header::CONTENT_TYPE, image.mime_type)], data).into_response())
}

#[utoipa::path(
    delete,
    path = "/api/images/{id}",
    params(("id" = Uuid, Path, description = "Image id")),
    responses(
        (status = 200, description = "Image and its files deleted", body = MessageResponse),
        (status = 404, description = "Image not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Images"
)]
pub async fn delete_image(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, AppError> {
    let image = find_owned(&state, id, auth_user.id).await?;
    let file_path = image.file_path.clone();
    let thumbnail_path = image.thumbnail_path.clone();

    image.delete(&state.db).await?;
    state.store.delete(&file_path).await;
    if let Some(path) = thumbnail_path {
        state.store.delete(&path).await;
    }

    tracing::info!(image_id = %id, user_id = %auth_user.id, "deleted image");
    Ok(Json(MessageResponse {
        message: "Image deleted".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::job::{JobStatus, JobType};
    use crate::services::jobs::NewJob;
    use crate::test_support::{body_json, create_user, TestApp};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn completed_image(app: &TestApp, user_id: Uuid) -> generated_image::Model {
        let job = app
            .state
            .jobs
            .create_job(
                user_id,
                NewJob {
                    job_type: JobType::Text2Img,
                    prompt: "a paper boat".to_string(),
                    negative_prompt: None,
                    aspect_ratio: "1:1".to_string(),
                    seed: None,
                    steps: 20,
                    strength: None,
                    model: None,
                    source_image_id: None,
                    mask_data: None,
                    mask_region: None,
                },
            )
            .await
            .unwrap();
        app.state.worker.process(job.clone()).await;

        let job = app
            .state
            .jobs
            .get_job(job.id, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        app.state.jobs.result_image(job.id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn gallery_lists_only_own_images() {
        let app = TestApp::new().await;
        let ada = create_user(&app.state.db, "ada", false).await;
        let grace = create_user(&app.state.db, "grace", false).await;
        completed_image(&app, ada.id).await;
        completed_image(&app, ada.id).await;
        completed_image(&app, grace.id).await;

        let response = app
            .router
            .clone()
            .oneshot(app.get("/api/images?page_size=1", &app.token_for(&ada)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["total"], 2);
        assert_eq!(body["total_pages"], 2);
        assert_eq!(body["items"][0]["is_expired"], false);
    }

    #[tokio::test]
    async fn download_sets_attachment_filename() {
        let app = TestApp::new().await;
        let ada = create_user(&app.state.db, "ada", false).await;
        let image = completed_image(&app, ada.id).await;

        let response = app
            .router
            .clone()
            .oneshot(app.get(&format!("/api/images/{}/download", image.id), &app.token_for(&ada)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            format!("attachment; filename=\"imageplayground_{}.png\"", image.id).as_str()
        );
    }

    #[tokio::test]
    async fn thumbnail_falls_back_to_full_image() {
        let app = TestApp::new().await;
        let ada = create_user(&app.state.db, "ada", false).await;
        let image = completed_image(&app, ada.id).await;
        let token = app.token_for(&ada);

        app.state.store.delete(image.thumbnail_path.as_deref().unwrap()).await;
        let response = app
            .router
            .clone()
            .oneshot(app.get(&format!("/api/images/{}/thumbnail", image.id), &token))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.width(), image.width as u32);
    }

    #[tokio::test]
    async fn delete_removes_row_and_files() {
        let app = TestApp::new().await;
        let ada = create_user(&app.state.db, "ada", false).await;
        let grace = create_user(&app.state.db, "grace", false).await;
        let image = completed_image(&app, ada.id).await;
        let uri = format!("/api/images/{}", image.id);

        let delete = |token: String| {
            Request::builder()
                .method("DELETE")
                .uri(&uri)
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap()
        };

        let response = app.router.clone().oneshot(delete(app.token_for(&grace))).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app.router.clone().oneshot(delete(app.token_for(&ada))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!std::path::Path::new(&image.file_path).exists());
        assert!(generated_image::Entity::find_by_id(image.id)
            .one(&app.state.db)
            .await
            .unwrap()
            .is_none());
    }
}

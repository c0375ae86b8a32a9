use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::services::storage::StorageError;
use crate::state::AppState;

#[derive(Serialize, utoipa::ToSchema)]
pub struct UploadResponse {
    pub id: Uuid,
    pub filename: String,
    pub width: u32,
    pub height: u32,
    pub file_size: u64,
    pub mime_type: String,
}

#[utoipa::path(
    post,
    path = "/api/images/upload",
    tag = "Images",
    request_body(content = Vec<u8>, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Image stored; use the id as source_image_id", body = UploadResponse),
        (status = 400, description = "Missing file, not an image or too large", body = crate::error::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn upload_image(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let max_bytes = state.config.max_image_size_bytes();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| AppError::BadRequest("Invalid multipart data".to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or("upload").to_string();
        let content_type = field.content_type().unwrap_or_default().to_string();
        if !content_type.starts_with("image/") {
            return Err(AppError::BadRequest("File must be an image".to_string()));
        }

        let data = field.bytes().await.map_err(|_| {
            AppError::BadRequest(format!(
                "File too large or unreadable. Maximum size is {}MB",
                state.config.max_image_size_mb
            ))
        })?;
        if data.len() > max_bytes {
            return Err(AppError::BadRequest(format!(
                "File too large. Maximum size is {}MB",
                state.config.max_image_size_mb
            )));
        }

        let saved = state
            .store
            .save_upload(auth_user.id, data.to_vec())
            .await
            .map_err(|e| match e {
                StorageError::Image(_) => AppError::BadRequest("Invalid image file".to_string()),
                other => AppError::InternalServerError(other.to_string()),
            })?;

        tracing::info!(user_id = %auth_user.id, image_id = %saved.id, filename = %filename, "uploaded image");
        return Ok((
            StatusCode::CREATED,
            Json(UploadResponse {
                id: saved.id,
                filename,
                width: saved.width,
                height: saved.height,
                file_size: saved.file_size,
                mime_type: "image/png".to_string(),
            }),
        ));
    }

    Err(AppError::BadRequest("No file field found".to_string()))
}

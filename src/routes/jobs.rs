use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::entities::generated_image;
use crate::entities::job::{self, JobStatus, JobType};
use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::models::catalog;
use crate::pagination::{PaginatedResponse, Pagination};
use crate::services::jobs::NewJob;
use crate::state::AppState;
use crate::utils::image_processor::MaskRegion;

const MAX_PROMPT_CHARS: usize = 2000;
const MAX_MODEL_CHARS: usize = 100;
const MAX_SEED: i64 = 2_147_483_647;

fn default_job_type() -> JobType {
    JobType::Text2Img
}

fn default_aspect_ratio() -> String {
    "1:1".to_string()
}

fn default_steps() -> i32 {
    30
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateJobRequest {
    #[serde(rename = "type", default = "default_job_type")]
    pub job_type: JobType,
    pub prompt: String,
    pub negative_prompt: Option<String>,
    #[serde(default = "default_aspect_ratio")]
    #[schema(default = "1:1")]
    pub aspect_ratio: String,
    pub seed: Option<i64>,
    #[serde(default = "default_steps")]
    #[schema(default = 30, minimum = 10, maximum = 50)]
    pub steps: i32,
    pub strength: Option<f64>,
    pub model: Option<String>,
    pub source_image_id: Option<Uuid>,
    /// Base64 PNG or data URL; white marks the area to regenerate.
    pub mask_data: Option<String>,
    pub mask_region: Option<MaskRegion>,
}

fn is_aspect_ratio(value: &str) -> bool {
    let all_digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    value
        .split_once(':')
        .is_some_and(|(w, h)| all_digits(w) && all_digits(h))
}

fn bad_request(msg: impl Into<String>) -> AppError {
    AppError::BadRequest(msg.into())
}

impl CreateJobRequest {
    /// Checks field ranges and the inputs each job type needs.
    pub fn validate(self, check_catalog: bool) -> Result<NewJob, AppError> {
        let prompt_len = self.prompt.chars().count();
        if prompt_len == 0 || prompt_len > MAX_PROMPT_CHARS {
            return Err(bad_request(format!(
                "prompt must be between 1 and {MAX_PROMPT_CHARS} characters"
            )));
        }
        if self
            .negative_prompt
            .as_ref()
            .is_some_and(|n| n.chars().count() > MAX_PROMPT_CHARS)
        {
            return Err(bad_request(format!(
                "negative_prompt must be at most {MAX_PROMPT_CHARS} characters"
            )));
        }
        if !is_aspect_ratio(&self.aspect_ratio) {
            return Err(bad_request("aspect_ratio must look like W:H, e.g. 16:9"));
        }
        if self.seed.is_some_and(|seed| !(0..=MAX_SEED).contains(&seed)) {
            return Err(bad_request(format!("seed must be between 0 and {MAX_SEED}")));
        }
        if !(10..=50).contains(&self.steps) {
            return Err(bad_request("steps must be between 10 and 50"));
        }
        if self.strength.is_some_and(|s| !(0.0..=1.0).contains(&s)) {
            return Err(bad_request("strength must be between 0.0 and 1.0"));
        }
        if let Some(model) = &self.model {
            if model.chars().count() > MAX_MODEL_CHARS {
                return Err(bad_request(format!(
                    "model must be at most {MAX_MODEL_CHARS} characters"
                )));
            }
            if check_catalog && !catalog::is_known(model) {
                return Err(bad_request(format!("Unknown model: {model}")));
            }
        }

        if self.job_type.needs_source_image() && self.source_image_id.is_none() {
            return Err(bad_request(format!(
                "source_image_id is required for {}",
                self.job_type
            )));
        }
        if self.job_type == JobType::Inpaint {
            match (&self.mask_data, &self.mask_region) {
                (None, None) => {
                    return Err(bad_request("mask_data or mask_region is required for inpaint"));
                }
                (_, Some(MaskRegion::Polygon { points })) if points.len() < 3 => {
                    return Err(bad_request("mask_region polygon needs at least 3 points"));
                }
                (_, Some(MaskRegion::Rect { width, height, .. })) if *width == 0 || *height == 0 => {
                    return Err(bad_request("mask_region rectangle must not be empty"));
                }
                _ => {}
            }
        }

        let mask_region = self
            .mask_region
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;

        Ok(NewJob {
            job_type: self.job_type,
            prompt: self.prompt,
            negative_prompt: self.negative_prompt,
            aspect_ratio: self.aspect_ratio,
            seed: self.seed,
            steps: self.steps,
            strength: self.strength,
            model: self.model,
            source_image_id: self.source_image_id,
            mask_data: self.mask_data,
            mask_region,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct JobResponse {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub status: JobStatus,
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub aspect_ratio: String,
    pub seed: Option<i64>,
    pub steps: i32,
    pub strength: Option<f64>,
    pub model: Option<String>,
    pub source_image_id: Option<Uuid>,
    pub error_message: Option<String>,
    pub result_image_id: Option<Uuid>,
    pub created_at: chrono::NaiveDateTime,
    pub started_at: Option<chrono::NaiveDateTime>,
    pub completed_at: Option<chrono::NaiveDateTime>,
}

impl JobResponse {
    fn new(model: job::Model, result_image_id: Option<Uuid>) -> Self {
        Self {
            id: model.id,
            job_type: model.job_type,
            status: model.status,
            prompt: model.prompt,
            negative_prompt: model.negative_prompt,
            aspect_ratio: model.aspect_ratio,
            seed: model.seed,
            steps: model.steps,
            strength: model.strength,
            model: model.model,
            source_image_id: model.source_image_id,
            error_message: model.error_message,
            result_image_id,
            created_at: model.created_at,
            started_at: model.started_at,
            completed_at: model.completed_at,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct JobFilter {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    pub status: Option<JobStatus>,
}

#[utoipa::path(
    post,
    path = "/api/jobs",
    request_body = CreateJobRequest,
    responses(
        (status = 201, description = "Job queued", body = JobResponse),
        (status = 400, description = "Invalid job parameters", body = crate::error::ErrorResponse),
        (status = 429, description = "Daily generation limit reached", body = crate::error::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Jobs"
)]
pub async fn create_job(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(payload): Json<CreateJobRequest>,
) -> Result<impl IntoResponse, AppError> {
    let new_job = payload.validate(state.config.use_local_inference)?;
    let job = state.jobs.create_job(auth_user.id, new_job).await?;

    let response = JobResponse::new(job.clone(), None);
    state.worker.spawn(job);
    Ok((StatusCode::CREATED, Json(response)))
}

#[utoipa::path(
    get,
    path = "/api/jobs",
    params(JobFilter),
    responses(
        (status = 200, description = "The caller's jobs, newest first", body = PaginatedResponse<JobResponse>),
        (status = 400, description = "Invalid paging parameters", body = crate::error::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Jobs"
)]
pub async fn list_jobs(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(filter): Query<JobFilter>,
) -> Result<Json<PaginatedResponse<JobResponse>>, AppError> {
    let (page, page_size) = Pagination {
        page: filter.page,
        page_size: filter.page_size,
    }
    .resolve()?;

    let (jobs, total) = state
        .jobs
        .list_jobs(auth_user.id, page, page_size, filter.status)
        .await?;

    let job_ids: Vec<Uuid> = jobs.iter().map(|j| j.id).collect();
    let results: HashMap<Uuid, Uuid> = generated_image::Entity::find()
        .filter(generated_image::Column::JobId.is_in(job_ids))
        .all(&state.db)
        .await?
        .into_iter()
        .map(|image| (image.job_id, image.id))
        .collect();

    let items = jobs
        .into_iter()
        .map(|job| {
            let result = results.get(&job.id).copied();
            JobResponse::new(job, result)
        })
        .collect();

    tracing::debug!(user_id = %auth_user.id, total, page, "listed jobs");
    Ok(Json(PaginatedResponse::new(items, total, page, page_size)))
}

#[utoipa::path(
    get,
    path = "/api/jobs/{id}",
    params(("id" = Uuid, Path, description = "Job id")),
    responses(
        (status = 200, description = "Job status and result image id", body = JobResponse),
        (status = 404, description = "Job not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Jobs"
)]
pub async fn get_job(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobResponse>, AppError> {
    let job = state
        .jobs
        .get_job(id, Some(auth_user.id))
        .await?
        .ok_or_else(|| AppError::NotFound("Job not found".to_string()))?;
    let result = state.jobs.result_image(job.id).await?.map(|image| image.id);

    Ok(Json(JobResponse::new(job, result)))
}

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use image::{DynamicImage, GrayImage};
use sea_orm::{ActiveModelTrait, DatabaseConnection, DbErr, Set, TransactionTrait};
use serde_json::json;
use thiserror::Error;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::entities::generated_image::{self, DEFAULT_EXPIRATION_HOURS};
use crate::entities::job::{self, JobStatus, JobType};
use crate::error::AppError;
use crate::models::catalog::Task;
use crate::services::inference::{GenerationParams, InferenceClient, InferenceError};
use crate::services::jobs::JobService;
use crate::services::storage::{ImageStore, SavedImage, StorageError};
use crate::utils::image_processor::{
    self, ImageProcessingError, MaskRegion, ResizeMode, MASK_BLUR_RADIUS,
};

pub const DEFAULT_STRENGTH: f64 = 0.8;
pub const RESTART_FAILURE_MESSAGE: &str = "Job interrupted by server restart";

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Image(#[from] ImageProcessingError),
    #[error(transparent)]
    Job(#[from] AppError),
    #[error("database error: {0}")]
    Database(#[from] DbErr),
    #[error("image task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("{0}")]
    InvalidJob(String),
}

/// Runs each generation job in its own task.
#[derive(Clone)]
pub struct Worker {
    db: DatabaseConnection,
    inference: Arc<dyn InferenceClient>,
    store: ImageStore,
}

impl Worker {
    pub fn new(db: DatabaseConnection, inference: Arc<dyn InferenceClient>, store: ImageStore) -> Self {
        Self { db, inference, store }
    }

    pub fn inference(&self) -> &Arc<dyn InferenceClient> {
        &self.inference
    }

    pub fn spawn(&self, job: job::Model) -> JoinHandle<()> {
        let worker = self.clone();
        tokio::spawn(async move {
            worker.process(job).await;
        })
    }

    /// Settles jobs left behind by a previous process: PROCESSING jobs are
    /// failed, PENDING jobs are started again.
    pub async fn recover(&self) -> Result<Vec<JoinHandle<()>>, AppError> {
        let service = JobService::new(self.db.clone(), 0);
        let mut handles = Vec::new();
        let mut failed = 0;

        for job in service.unfinished_jobs().await? {
            match job.status {
                JobStatus::Processing => {
                    JobService::transition(
                        &self.db,
                        job,
                        JobStatus::Failed,
                        Some(RESTART_FAILURE_MESSAGE.to_string()),
                    )
                    .await?;
                    failed += 1;
                }
                JobStatus::Pending => handles.push(self.spawn(job)),
                JobStatus::Completed | JobStatus::Failed => {}
            }
        }

        if failed > 0 || !handles.is_empty() {
            tracing::info!(failed, resumed = handles.len(), "recovered unfinished jobs");
        }
        Ok(handles)
    }

    /// Drives `job` to a terminal state. Errors end up on the job row.
    pub async fn process(&self, job: job::Model) {
        let job_id = job.id;
        tracing::info!(job_id = %job_id, job_type = %job.job_type, "worker picked up job");
        let started = Instant::now();

        let job = match JobService::transition(&self.db, job, JobStatus::Processing, None).await {
            Ok(job) => job,
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "could not start job");
                return;
            }
        };

        match self.run(&job).await {
            Ok(()) => {
                tracing::info!(job_id = %job_id, elapsed = ?started.elapsed(), "job completed");
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "job failed");
                if let Err(e) =
                    JobService::transition(&self.db, job, JobStatus::Failed, Some(e.to_string())).await
                {
                    tracing::error!(job_id = %job_id, error = %e, "could not mark job failed");
                }
            }
        }
    }

    /// Any file written by a failed attempt is removed again.
    async fn run(&self, job: &job::Model) -> Result<(), WorkerError> {
        let mut written = Vec::new();
        let result = self.attempt(job, &mut written).await;
        if result.is_err() {
            for path in &written {
                self.store.delete(path).await;
            }
        }
        result
    }

    async fn attempt(&self, job: &job::Model, written: &mut Vec<PathBuf>) -> Result<(), WorkerError> {
        let (image, width, height) = self.generate(job, written).await?;
        let saved = self.store.save_generated(job.user_id, image).await?;
        written.push(saved.file_path.clone());
        written.push(saved.thumbnail_path.clone());

        self.complete(job, &saved, width, height).await
    }

    fn params(job: &job::Model) -> GenerationParams {
        GenerationParams {
            prompt: job.prompt.clone(),
            negative_prompt: job.negative_prompt.clone(),
            aspect_ratio: job.aspect_ratio.clone(),
            seed: job.seed,
            steps: job.steps.max(1) as u32,
            model: job.model.clone(),
        }
    }

    /// Returns the image plus the canvas size the model worked at.
    async fn generate(
        &self,
        job: &job::Model,
        written: &mut Vec<PathBuf>,
    ) -> Result<(DynamicImage, u32, u32), WorkerError> {
        let params = Self::params(job);
        let task = Task::from(job.job_type);
        let (width, height) = self
            .inference
            .dimensions(task, job.model.as_deref(), &job.aspect_ratio);

        let image = match job.job_type {
            JobType::Text2Img => self.inference.text_to_image(&params).await?,
            JobType::Img2Img => {
                let (_, source) = self.load_source(job, width, height).await?;
                let strength = job.strength.unwrap_or(DEFAULT_STRENGTH);
                self.inference.image_to_image(&source, &params, strength).await?
            }
            JobType::Inpaint => {
                let (original_size, source) = self.load_source(job, width, height).await?;
                let mask = Self::build_mask(job, original_size, (width, height))?;
                written.push(self.store.save_mask(job.user_id, job.id, mask.clone()).await?);

                let generated = self.inference.inpaint(&source, &mask, &params).await?;
                tokio::task::spawn_blocking(move || {
                    DynamicImage::ImageRgb8(image_processor::composite(&source, &generated, &mask))
                })
                .await?
            }
        };

        Ok((image, width, height))
    }

    /// Loads the uploaded source and fits it to the model canvas. Also
    /// returns the size it was uploaded at.
    async fn load_source(
        &self,
        job: &job::Model,
        width: u32,
        height: u32,
    ) -> Result<((u32, u32), DynamicImage), WorkerError> {
        let source_id = job
            .source_image_id
            .ok_or_else(|| WorkerError::InvalidJob(format!("{} job has no source image", job.job_type)))?;
        let source = self.store.load_upload(job.user_id, source_id).await?;
        let original_size = (source.width(), source.height());

        let fitted = tokio::task::spawn_blocking(move || {
            image_processor::resize_image(&source, width, height, ResizeMode::Crop)
        })
        .await??;
        Ok((original_size, fitted))
    }

    /// Builds the mask in source coordinates, then crops it exactly like the
    /// source so both stay aligned.
    fn build_mask(
        job: &job::Model,
        source_size: (u32, u32),
        target: (u32, u32),
    ) -> Result<GrayImage, WorkerError> {
        let raw = if let Some(data) = &job.mask_data {
            image_processor::decode_mask(data)?
        } else if let Some(region) = &job.mask_region {
            let region: MaskRegion = serde_json::from_value(region.clone())
                .map_err(|e| WorkerError::InvalidJob(format!("Invalid mask region: {e}")))?;
            image_processor::mask_from_region(source_size.0, source_size.1, &region)
        } else {
            return Err(WorkerError::InvalidJob("Inpaint job has no mask".to_string()));
        };

        let aligned = image_processor::prepare_mask(&raw, source_size, 0.0, false);
        let cropped = image_processor::crop_to_aspect_and_resize(
            &DynamicImage::ImageLuma8(aligned),
            target.0,
            target.1,
        )
        .to_luma8();
        Ok(image_processor::prepare_mask(&cropped, target, MASK_BLUR_RADIUS, false))
    }

    /// Records the image, completes the job and counts the usage together.
    async fn complete(
        &self,
        job: &job::Model,
        saved: &SavedImage,
        width: u32,
        height: u32,
    ) -> Result<(), WorkerError> {
        let now = chrono::Utc::now().naive_utc();
        let parameters = json!({
            "type": job.job_type,
            "aspect_ratio": job.aspect_ratio,
            "seed": job.seed,
            "steps": job.steps,
            "strength": job.strength,
            "source_image_id": job.source_image_id,
            "model": job.model,
            "width": width,
            "height": height,
        });

        let txn = self.db.begin().await?;
        generated_image::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(job.user_id),
            job_id: Set(job.id),
            file_path: Set(saved.file_path.to_string_lossy().into_owned()),
            thumbnail_path: Set(Some(saved.thumbnail_path.to_string_lossy().into_owned())),
            width: Set(saved.width as i32),
            height: Set(saved.height as i32),
            file_size: Set(saved.file_size as i64),
            mime_type: Set("image/png".to_string()),
            prompt: Set(job.prompt.clone()),
            negative_prompt: Set(job.negative_prompt.clone()),
            parameters: Set(parameters),
            created_at: Set(now),
            expires_at: Set(now + chrono::Duration::hours(DEFAULT_EXPIRATION_HOURS)),
        }
        .insert(&txn)
        .await?;

        JobService::transition(&txn, job.clone(), JobStatus::Completed, None).await?;
        let used = JobService::increment_daily_usage(&txn, job.user_id).await?;
        txn.commit().await?;

        tracing::info!(job_id = %job.id, user_id = %job.user_id, daily_usage = used, "stored generated image");
        Ok(())
    }
}

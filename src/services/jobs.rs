use chrono::{NaiveDate, NaiveTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::entities::job::{self, JobStatus, JobType};
use crate::entities::{daily_usage, generated_image, user};
use crate::error::AppError;

/// Validated parameters for a new job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub job_type: JobType,
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub aspect_ratio: String,
    pub seed: Option<i64>,
    pub steps: i32,
    pub strength: Option<f64>,
    pub model: Option<String>,
    pub source_image_id: Option<Uuid>,
    pub mask_data: Option<String>,
    pub mask_region: Option<serde_json::Value>,
}

/// Usage is counted per UTC calendar day.
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

#[derive(Debug, Clone)]
pub struct JobService {
    db: DatabaseConnection,
    daily_limit: i32,
}

impl JobService {
    pub fn new(db: DatabaseConnection, daily_limit: i32) -> Self {
        Self { db, daily_limit }
    }

    pub fn daily_limit(&self) -> i32 {
        self.daily_limit
    }

    pub async fn daily_usage<C: ConnectionTrait>(db: &C, user_id: Uuid) -> Result<i32, DbErr> {
        let usage = daily_usage::Entity::find()
            .filter(daily_usage::Column::UserId.eq(user_id))
            .filter(daily_usage::Column::UsageDate.eq(today()))
            .one(db)
            .await?;
        Ok(usage.map(|u| u.generation_count).unwrap_or(0))
    }

    /// Jobs submitted today that have not finished yet.
    async fn in_flight_today<C: ConnectionTrait>(db: &C, user_id: Uuid) -> Result<u64, DbErr> {
        let start_of_day = today().and_time(NaiveTime::MIN);
        job::Entity::find()
            .filter(job::Column::UserId.eq(user_id))
            .filter(job::Column::Status.is_in([JobStatus::Pending, JobStatus::Processing]))
            .filter(job::Column::CreatedAt.gte(start_of_day))
            .count(db)
            .await
    }

    /// Inserts a PENDING job unless the user's quota is already reserved.
    ///
    /// The user row is locked for the duration so concurrent submissions
    /// see each other's in-flight jobs.
    pub async fn create_job(&self, user_id: Uuid, new: NewJob) -> Result<job::Model, AppError> {
        let txn = self.db.begin().await?;

        let mut user_query = user::Entity::find_by_id(user_id);
        if txn.get_database_backend() == DbBackend::Postgres {
            user_query = user_query.lock_exclusive();
        }
        user_query
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        let used = Self::daily_usage(&txn, user_id).await?;
        let in_flight = Self::in_flight_today(&txn, user_id).await?;
        let reserved = i64::from(used) + in_flight as i64;
        if reserved >= i64::from(self.daily_limit) {
            tracing::info!(user_id = %user_id, used, in_flight, limit = self.daily_limit, "daily limit reached");
            return Err(AppError::TooManyRequests(format!(
                "Daily generation limit ({}) exceeded. Try again tomorrow.",
                self.daily_limit
            )));
        }

        let job = job::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            job_type: Set(new.job_type),
            status: Set(JobStatus::Pending),
            prompt: Set(new.prompt),
            negative_prompt: Set(new.negative_prompt),
            aspect_ratio: Set(new.aspect_ratio),
            seed: Set(new.seed),
            steps: Set(new.steps),
            strength: Set(new.strength),
            model: Set(new.model),
            source_image_id: Set(new.source_image_id),
            mask_data: Set(new.mask_data),
            mask_region: Set(new.mask_region),
            error_message: Set(None),
            created_at: Set(Utc::now().naive_utc()),
            started_at: Set(None),
            completed_at: Set(None),
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;
        tracing::info!(job_id = %job.id, user_id = %user_id, job_type = %job.job_type, "created job");
        Ok(job)
    }

    pub async fn get_job(&self, job_id: Uuid, user_id: Option<Uuid>) -> Result<Option<job::Model>, DbErr> {
        let mut query = job::Entity::find_by_id(job_id);
        if let Some(user_id) = user_id {
            query = query.filter(job::Column::UserId.eq(user_id));
        }
        query.one(&self.db).await
    }

    /// Newest first, with the total count for the filter.
    pub async fn list_jobs(
        &self,
        user_id: Uuid,
        page: u64,
        page_size: u64,
        status: Option<JobStatus>,
    ) -> Result<(Vec<job::Model>, u64), DbErr> {
        let mut query = job::Entity::find()
            .filter(job::Column::UserId.eq(user_id))
            .order_by_desc(job::Column::CreatedAt);
        if let Some(status) = status {
            query = query.filter(job::Column::Status.eq(status));
        }

        let paginator = query.paginate(&self.db, page_size);
        let total = paginator.num_items().await?;
        let jobs = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((jobs, total))
    }

    pub async fn result_image(&self, job_id: Uuid) -> Result<Option<generated_image::Model>, DbErr> {
        generated_image::Entity::find()
            .filter(generated_image::Column::JobId.eq(job_id))
            .one(&self.db)
            .await
    }

    pub async fn unfinished_jobs(&self) -> Result<Vec<job::Model>, DbErr> {
        job::Entity::find()
            .filter(job::Column::Status.is_in([JobStatus::Pending, JobStatus::Processing]))
            .order_by_asc(job::Column::CreatedAt)
            .all(&self.db)
            .await
    }

    /// Moves `job` to `next`, stamping timestamps and the error message.
    ///
    /// The update is conditional on the stored status still matching
    /// `job.status`, so a job cannot be moved twice from the same state.
    pub async fn transition<C: ConnectionTrait>(
        db: &C,
        job: job::Model,
        next: JobStatus,
        error_message: Option<String>,
    ) -> Result<job::Model, AppError> {
        if !job.status.can_transition_to(next) {
            return Err(AppError::Conflict(format!(
                "Job {} cannot move from {:?} to {:?}",
                job.id, job.status, next
            )));
        }

        let now = Utc::now().naive_utc();
        let mut changes = job::ActiveModel {
            status: Set(next),
            ..Default::default()
        };
        let mut updated = job.clone();
        updated.status = next;
        match next {
            JobStatus::Processing => {
                changes.started_at = Set(Some(now));
                updated.started_at = Some(now);
            }
            JobStatus::Completed | JobStatus::Failed => {
                changes.completed_at = Set(Some(now));
                updated.completed_at = Some(now);
            }
            JobStatus::Pending => {}
        }
        if let Some(message) = error_message {
            changes.error_message = Set(Some(message.clone()));
            updated.error_message = Some(message);
        }

        let result = job::Entity::update_many()
            .set(changes)
            .filter(job::Column::Id.eq(job.id))
            .filter(job::Column::Status.eq(job.status))
            .exec(db)
            .await?;
        if result.rows_affected == 0 {
            return Err(AppError::Conflict(format!(
                "Job {} is no longer {:?}",
                job.id, job.status
            )));
        }

        tracing::debug!(job_id = %job.id, from = ?job.status, to = ?next, "job transitioned");
        Ok(updated)
    }

    /// Adds one generation to today's counter and returns the new count.
    pub async fn increment_daily_usage<C: ConnectionTrait>(db: &C, user_id: Uuid) -> Result<i32, DbErr> {
        let now = Utc::now().naive_utc();
        let existing = daily_usage::Entity::find()
            .filter(daily_usage::Column::UserId.eq(user_id))
            .filter(daily_usage::Column::UsageDate.eq(today()))
            .one(db)
            .await?;

        match existing {
            Some(usage) => {
                daily_usage::Entity::update_many()
                    .col_expr(
                        daily_usage::Column::GenerationCount,
                        Expr::col(daily_usage::Column::GenerationCount).add(1),
                    )
                    .col_expr(daily_usage::Column::UpdatedAt, Expr::value(now))
                    .filter(daily_usage::Column::Id.eq(usage.id))
                    .exec(db)
                    .await?;
                Ok(usage.generation_count + 1)
            }
            None => {
                daily_usage::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    user_id: Set(user_id),
                    usage_date: Set(today()),
                    generation_count: Set(1),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(db)
                .await?;
                Ok(1)
            }
        }
    }
}

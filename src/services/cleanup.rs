use std::time::Duration;

use chrono::Utc;
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter};

use crate::entities::generated_image;
use crate::services::storage::ImageStore;

const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Deletes generated images once they pass `expires_at`.
pub struct CleanupService {
    db: DatabaseConnection,
    store: ImageStore,
}

impl CleanupService {
    pub fn new(db: DatabaseConnection, store: ImageStore) -> Self {
        Self { db, store }
    }

    pub async fn run_scheduler(self) {
        tracing::info!(interval = ?CLEANUP_INTERVAL, "image cleanup scheduler started");
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

        loop {
            interval.tick().await;
            match self.delete_expired_images().await {
                Ok(0) => {}
                Ok(deleted) => tracing::info!(deleted, "deleted expired images"),
                Err(e) => tracing::error!(error = %e, "image cleanup failed"),
            }
        }
    }

    /// Files go first, then the row.
    pub async fn delete_expired_images(&self) -> Result<usize, DbErr> {
        let now = Utc::now().naive_utc();
        let expired = generated_image::Entity::find()
            .filter(generated_image::Column::ExpiresAt.lt(now))
            .all(&self.db)
            .await?;

        let mut deleted = 0;
        for image in expired {
            tracing::debug!(image_id = %image.id, expires_at = %image.expires_at, "deleting expired image");
            self.store.delete(&image.file_path).await;
            if let Some(thumbnail) = &image.thumbnail_path {
                self.store.delete(thumbnail).await;
            }
            generated_image::Entity::delete_by_id(image.id).exec(&self.db).await?;
            deleted += 1;
        }

        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::job::JobType;
    use crate::services::jobs::{JobService, NewJob};
    use crate::services::storage::tests::temp_store;
    use crate::test_support::{create_user, setup_db};
    use image::{DynamicImage, RgbImage};
    use sea_orm::{ActiveModelTrait, Set};
    use uuid::Uuid;

    async fn stored_image(
        db: &DatabaseConnection,
        store: &ImageStore,
        user_id: Uuid,
        expires_in: chrono::Duration,
    ) -> generated_image::Model {
        let job = JobService::new(db.clone(), 100)
            .create_job(
                user_id,
                NewJob {
                    job_type: JobType::Text2Img,
                    prompt: "old sunset".to_string(),
                    negative_prompt: None,
                    aspect_ratio: "1:1".to_string(),
                    seed: None,
                    steps: 30,
                    strength: None,
                    model: None,
                    source_image_id: None,
                    mask_data: None,
                    mask_region: None,
                },
            )
            .await
            .unwrap();
        let saved = store
            .save_generated(user_id, DynamicImage::ImageRgb8(RgbImage::new(4, 4)))
            .await
            .unwrap();
        let now = Utc::now().naive_utc();

        generated_image::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            job_id: Set(job.id),
            file_path: Set(saved.file_path.to_string_lossy().into_owned()),
            thumbnail_path: Set(Some(saved.thumbnail_path.to_string_lossy().into_owned())),
            width: Set(4),
            height: Set(4),
            file_size: Set(saved.file_size as i64),
            mime_type: Set("image/png".to_string()),
            prompt: Set(job.prompt),
            negative_prompt: Set(None),
            parameters: Set(serde_json::json!({})),
            created_at: Set(now),
            expires_at: Set(now + expires_in),
        }
        .insert(db)
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn only_expired_images_are_removed() {
        let db = setup_db().await;
        let user = create_user(&db, "ada", false).await;
        let (store, root) = temp_store();

        let expired = stored_image(&db, &store, user.id, chrono::Duration::hours(-1)).await;
        let fresh = stored_image(&db, &store, user.id, chrono::Duration::hours(47)).await;

        let cleanup = CleanupService::new(db.clone(), store);
        assert_eq!(cleanup.delete_expired_images().await.unwrap(), 1);
        assert_eq!(cleanup.delete_expired_images().await.unwrap(), 0);

        assert!(generated_image::Entity::find_by_id(expired.id).one(&db).await.unwrap().is_none());
        assert!(!std::path::Path::new(&expired.file_path).exists());
        assert!(generated_image::Entity::find_by_id(fresh.id).one(&db).await.unwrap().is_some());
        assert!(std::path::Path::new(&fresh.file_path).exists());

        let _ = std::fs::remove_dir_all(root);
    }
}

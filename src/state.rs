use std::sync::Arc;

use axum::extract::FromRef;
use sea_orm::DatabaseConnection;

use crate::config::Config;
use crate::services::inference::InferenceClient;
use crate::services::jobs::JobService;
use crate::services::storage::ImageStore;
use crate::services::worker::Worker;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<Config>,
    pub jobs: JobService,
    pub worker: Worker,
    pub store: ImageStore,
}

impl AppState {
    pub fn new(db: DatabaseConnection, config: Config, inference: Arc<dyn InferenceClient>) -> Self {
        let store = ImageStore::new(config.upload_dir.clone(), config.generated_dir.clone());
        Self {
            jobs: JobService::new(db.clone(), config.daily_generation_limit),
            worker: Worker::new(db.clone(), inference, store.clone()),
            store,
            config: Arc::new(config),
            db,
        }
    }
}

impl FromRef<AppState> for DatabaseConnection {
    fn from_ref(state: &AppState) -> Self {
        state.db.clone()
    }
}

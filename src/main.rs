mod config;
mod entities;
mod error;
mod middleware;
mod models;
mod pagination;
mod routes;
mod services;
mod state;
mod utils;

#[cfg(test)]
mod test_support;

use std::path::Path;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ActiveModelTrait, ColumnTrait, Database, DatabaseConnection, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use crate::config::{init_config, Config, APP_NAME, APP_VERSION};
use crate::entities::user;
use crate::services::cleanup::CleanupService;
use crate::services::inference::{
    InferenceClient, LocalInferenceClient, RemoteInferenceClient,
};
use crate::services::inference::local::WebUiLoader;
use crate::state::AppState;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// ImagePlayground backend.
#[derive(Parser)]
#[command(name = "image-playground")]
#[command(about = "Image generation API server", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (default)
    Serve,
    /// Apply pending database migrations and exit
    Migrate,
    /// Insert or refresh the built-in presets
    SeedPresets,
    /// Create an admin account, or promote an existing one
    CreateAdmin {
        #[arg(long)]
        email: String,
        #[arg(long)]
        username: String,
        /// Prompted for when omitted
        #[arg(long)]
        password: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    tracing_subscriber::EnvFilter::new("image_playground=info,tower_http=info")
                }),
        )
        .init();

    let cli = Cli::parse();
    let config = init_config()?;
    let db = connect(config).await?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(db, config).await,
        Commands::Migrate => {
            tracing::info!("migrations applied");
            Ok(())
        }
        Commands::SeedPresets => {
            services::presets::seed_presets(&db).await?;
            Ok(())
        }
        Commands::CreateAdmin { email, username, password } => {
            create_admin(&db, email, username, password).await
        }
    }
}

/// Connects and brings the schema up to date.
async fn connect(config: &Config) -> Result<DatabaseConnection, BoxError> {
    if let Some(path) = config.database_url.strip_prefix("sqlite://") {
        let file = path.split('?').next().unwrap_or(path);
        if let Some(dir) = Path::new(file).parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
    }

    let db = Database::connect(&config.database_url).await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

fn inference_client(config: &Config) -> Arc<dyn InferenceClient> {
    if config.use_local_inference {
        tracing::info!(endpoint = %config.local_inference_url, model = %config.default_model, "using local inference");
        Arc::new(LocalInferenceClient::new(
            Box::new(WebUiLoader::new(config.local_inference_url.clone())),
            config.default_model.clone(),
        ))
    } else {
        if config.huggingface_api_token.is_none() {
            tracing::warn!("HUGGINGFACE_API_TOKEN is not set; generation jobs will fail");
        }
        tracing::info!(endpoint = %config.huggingface_api_url, "using remote inference");
        Arc::new(RemoteInferenceClient::new(
            config.huggingface_api_token.clone(),
            config.huggingface_api_url.clone(),
        ))
    }
}

async fn serve(db: DatabaseConnection, config: &'static Config) -> Result<(), BoxError> {
    let state = AppState::new(db.clone(), config.clone(), inference_client(config));
    state.store.ensure_dirs().await?;

    let resumed = state.worker.recover().await?;
    if !resumed.is_empty() {
        tracing::info!(count = resumed.len(), "resumed pending jobs");
    }

    if config.image_cleanup_enabled {
        tokio::spawn(CleanupService::new(db, state.store.clone()).run_scheduler());
    }

    let app = routes::create_routes(state);
    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    tracing::info!(name = APP_NAME, version = APP_VERSION, addr = %listener.local_addr()?, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn create_admin(
    db: &DatabaseConnection,
    email: String,
    username: String,
    password: Option<String>,
) -> Result<(), BoxError> {
    let email = email.trim().to_lowercase();
    let existing = user::Entity::find()
        .filter(user::Column::Email.eq(&email))
        .one(db)
        .await?;

    if let Some(existing) = existing {
        let mut active: user::ActiveModel = existing.into();
        active.is_admin = Set(true);
        active.updated_at = Set(chrono::Utc::now().naive_utc());
        let updated = active.update(db).await?;
        tracing::info!(user_id = %updated.id, "promoted existing user to admin");
        return Ok(());
    }

    let password = match password {
        Some(password) => password,
        None => rpassword::prompt_password("Admin password: ")?,
    };
    if password.chars().count() < 8 {
        return Err("password must be at least 8 characters".into());
    }

    let now = chrono::Utc::now().naive_utc();
    let admin = user::ActiveModel {
        id: Set(Uuid::new_v4()),
        email: Set(email),
        username: Set(username),
        password: Set(services::auth::hash_password(&password)?),
        is_active: Set(true),
        is_admin: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await?;

    tracing::info!(user_id = %admin.id, username = %admin.username, "created admin");
    Ok(())
}

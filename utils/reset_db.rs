use std::env;

use migration::{Migrator, MigratorTrait};
use sea_orm::Database;

/// Drops every table and re-runs all migrations.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let database_url = env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite://./data/app.db?mode=rwc".to_string());

    let db = Database::connect(&database_url).await?;
    Migrator::fresh(&db).await?;

    tracing::info!("database reset successfully");
    Ok(())
}

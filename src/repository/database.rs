use anyhow::Result;
use sqlx::{migrate::MigrateDatabase, sqlite::SqlitePoolOptions, Sqlite, SqlitePool};
use std::path::Path;
use tokio::fs;
use tracing::info;

pub async fn init_database(db_path: &str) -> Result<SqlitePool> {
    if let Some(parent) = Path::new(db_path).parent() {
        fs::create_dir_all(parent).await?;
    }

    let db_url = format!("sqlite://{}", db_path);

    if !Sqlite::database_exists(&db_url).await? {
        info!(path = %db_path, "Creating new database");
        Sqlite::create_database(&db_url).await?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    info!("Running database migrations");
    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

pub async fn init_test_database() -> Result<SqlitePool> {
    // One connection: every in-memory connection is its own database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

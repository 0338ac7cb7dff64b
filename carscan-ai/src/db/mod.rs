//! Database access for carscan-ai

pub mod analyses;

use carscan_common::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool
///
/// Creates the database file (and its parent directory) if missing.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Create carscan tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analyses (
            id TEXT PRIMARY KEY,
            image_path TEXT NOT NULL,
            original_name TEXT NOT NULL,
            has_rust INTEGER NOT NULL DEFAULT 0,
            has_cracks INTEGER NOT NULL DEFAULT 0,
            has_dirt INTEGER NOT NULL DEFAULT 0,
            has_scratches INTEGER NOT NULL DEFAULT 0,
            has_dents INTEGER NOT NULL DEFAULT 0,
            cleanliness_score REAL NOT NULL,
            overall_status TEXT NOT NULL,
            details TEXT NOT NULL DEFAULT '',
            detection_counts TEXT NOT NULL DEFAULT '{}',
            confidence_scores TEXT NOT NULL DEFAULT '{}',
            damage_details TEXT NOT NULL DEFAULT '[]',
            comparison TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_analyses_created_at ON analyses(created_at)")
        .execute(pool)
        .await?;

    tracing::info!("Database tables initialized (analyses)");

    Ok(())
}

//! Analysis record persistence
//!
//! Nested values (detection counts, confidence scores, regions, comparison)
//! are stored as JSON TEXT columns and only (de)serialized here.

use carscan_common::time::{parse_db_timestamp, to_db_timestamp};
use carscan_common::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::{Analysis, AnalysisStatistics};

const SELECT_COLUMNS: &str = r#"
    SELECT id, image_path, original_name,
           has_rust, has_cracks, has_dirt, has_scratches, has_dents,
           cleanliness_score, overall_status, details,
           detection_counts, confidence_scores, damage_details, comparison,
           created_at, updated_at
    FROM analyses
"#;

fn to_json<T: Serialize>(value: &T, what: &str) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| Error::Internal(format!("Failed to serialize {}: {}", what, e)))
}

fn from_json<T: DeserializeOwned>(value: &str, what: &str) -> Result<T> {
    serde_json::from_str(value)
        .map_err(|e| Error::corrupt(what, e))
}

/// Insert a new analysis
pub async fn save_analysis(pool: &SqlitePool, analysis: &Analysis) -> Result<()> {
    // Prepare all data before touching the database
    let detection_counts = to_json(&analysis.detection_counts, "detection_counts")?;
    let confidence_scores = to_json(&analysis.confidence_scores, "confidence_scores")?;
    let damage_details = to_json(&analysis.damage_details, "damage_details")?;
    let comparison = to_json(&analysis.comparison, "comparison")?;

    sqlx::query(
        r#"
        INSERT INTO analyses (
            id, image_path, original_name,
            has_rust, has_cracks, has_dirt, has_scratches, has_dents,
            cleanliness_score, overall_status, details,
            detection_counts, confidence_scores, damage_details, comparison,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(analysis.id.to_string())
    .bind(&analysis.image_path)
    .bind(&analysis.original_name)
    .bind(analysis.has_rust)
    .bind(analysis.has_cracks)
    .bind(analysis.has_dirt)
    .bind(analysis.has_scratches)
    .bind(analysis.has_dents)
    .bind(analysis.cleanliness_score)
    .bind(&analysis.overall_status)
    .bind(&analysis.details)
    .bind(detection_counts)
    .bind(confidence_scores)
    .bind(damage_details)
    .bind(comparison)
    .bind(to_db_timestamp(&analysis.created_at))
    .bind(to_db_timestamp(&analysis.updated_at))
    .execute(pool)
    .await?;

    Ok(())
}

/// Page of analyses, newest first, plus the total record count
pub async fn list_analyses(
    pool: &SqlitePool,
    limit: i64,
    offset: i64,
) -> Result<(Vec<Analysis>, i64)> {
    let query = format!(
        "{} ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
        SELECT_COLUMNS
    );
    let rows = sqlx::query(&query)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    let analyses = rows
        .iter()
        .map(row_to_analysis)
        .collect::<Result<Vec<_>>>()?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM analyses")
        .fetch_one(pool)
        .await?;

    Ok((analyses, total))
}

/// Load one analysis by id
pub async fn load_analysis(pool: &SqlitePool, id: Uuid) -> Result<Option<Analysis>> {
    let query = format!("{} WHERE id = ?", SELECT_COLUMNS);
    let row = sqlx::query(&query)
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_analysis).transpose()
}

/// Delete one analysis; returns the number of rows removed (0 or 1)
pub async fn delete_analysis(pool: &SqlitePool, id: Uuid) -> Result<u64> {
    let result = sqlx::query("DELETE FROM analyses WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

/// Aggregate counts and average cleanliness over all analyses
pub async fn analysis_statistics(pool: &SqlitePool) -> Result<AnalysisStatistics> {
    let row = sqlx::query(
        r#"
        SELECT COUNT(*) AS total_analyses,
               COALESCE(SUM(has_rust), 0) AS with_rust,
               COALESCE(SUM(has_cracks), 0) AS with_cracks,
               COALESCE(SUM(has_dirt), 0) AS with_dirt,
               COALESCE(SUM(has_scratches), 0) AS with_scratches,
               COALESCE(SUM(has_dents), 0) AS with_dents,
               COALESCE(AVG(cleanliness_score), 0.0) AS avg_cleanliness
        FROM analyses
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(AnalysisStatistics {
        total_analyses: row.try_get("total_analyses")?,
        with_rust: row.try_get("with_rust")?,
        with_cracks: row.try_get("with_cracks")?,
        with_dirt: row.try_get("with_dirt")?,
        with_scratches: row.try_get("with_scratches")?,
        with_dents: row.try_get("with_dents")?,
        avg_cleanliness: row.try_get("avg_cleanliness")?,
    })
}

fn row_to_analysis(row: &SqliteRow) -> Result<Analysis> {
    let id: String = row.try_get("id")?;
    let id = Uuid::parse_str(&id)
        .map_err(|e| Error::corrupt("id", format!("'{}': {}", id, e)))?;

    let detection_counts: String = row.try_get("detection_counts")?;
    let confidence_scores: String = row.try_get("confidence_scores")?;
    let damage_details: String = row.try_get("damage_details")?;
    let comparison: String = row.try_get("comparison")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Analysis {
        id,
        image_path: row.try_get("image_path")?,
        original_name: row.try_get("original_name")?,
        has_rust: row.try_get::<i64, _>("has_rust")? != 0,
        has_cracks: row.try_get::<i64, _>("has_cracks")? != 0,
        has_dirt: row.try_get::<i64, _>("has_dirt")? != 0,
        has_scratches: row.try_get::<i64, _>("has_scratches")? != 0,
        has_dents: row.try_get::<i64, _>("has_dents")? != 0,
        cleanliness_score: row.try_get("cleanliness_score")?,
        overall_status: row.try_get("overall_status")?,
        details: row.try_get("details")?,
        detection_counts: from_json(&detection_counts, "detection_counts")?,
        confidence_scores: from_json(&confidence_scores, "confidence_scores")?,
        damage_details: from_json(&damage_details, "damage_details")?,
        comparison: from_json(&comparison, "comparison")?,
        created_at: parse_db_timestamp(&created_at)?,
        updated_at: parse_db_timestamp(&updated_at)?,
    })
}

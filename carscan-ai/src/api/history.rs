//! Analysis history endpoints

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::db::analyses;
use crate::error::{ApiError, ApiResult};
use crate::models::{Analysis, AnalysisPage};
use crate::AppState;

pub const DEFAULT_PAGE_LIMIT: i64 = 50;

/// Raw paging parameters; unparseable values fall back to defaults
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<String>,
    pub offset: Option<String>,
}

impl HistoryQuery {
    /// `limit` defaults to 50 when missing, invalid or not positive
    pub fn limit(&self) -> i64 {
        self.limit
            .as_deref()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_PAGE_LIMIT)
    }

    /// `offset` defaults to 0 when missing, invalid or negative
    pub fn offset(&self) -> i64 {
        self.offset
            .as_deref()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|v| *v >= 0)
            .unwrap_or(0)
    }
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub message: String,
}

fn not_found() -> ApiError {
    ApiError::NotFound("Analysis not found".to_string())
}

/// Unparseable ids cannot exist in the store, so they are simply not found
fn parse_id(id: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(id).map_err(|_| not_found())
}

/// GET /api/history
pub async fn list_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<AnalysisPage>> {
    let limit = query.limit();
    let offset = query.offset();

    let (data, total) = analyses::list_analyses(&state.db, limit, offset).await?;

    Ok(Json(AnalysisPage {
        data,
        total,
        limit,
        offset,
    }))
}

/// GET /api/history/:id
pub async fn get_analysis(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Analysis>> {
    let id = parse_id(&id)?;

    analyses::load_analysis(&state.db, id)
        .await?
        .map(Json)
        .ok_or_else(not_found)
}

/// DELETE /api/history/:id
pub async fn delete_analysis(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteResponse>> {
    let id = parse_id(&id)?;

    if analyses::delete_analysis(&state.db, id).await? == 0 {
        return Err(not_found());
    }

    info!(analysis_id = %id, "Analysis deleted");

    Ok(Json(DeleteResponse {
        message: "Analysis deleted successfully".to_string(),
    }))
}

pub fn history_routes() -> Router<AppState> {
    Router::new()
        .route("/api/history", get(list_history))
        .route("/api/history/:id", get(get_analysis).delete(delete_analysis))
}

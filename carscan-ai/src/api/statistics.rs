//! Aggregate statistics endpoint

use axum::{extract::State, routing::get, Json, Router};

use crate::db::analyses;
use crate::error::ApiResult;
use crate::models::AnalysisStatistics;
use crate::AppState;

/// GET /api/statistics
pub async fn get_statistics(State(state): State<AppState>) -> ApiResult<Json<AnalysisStatistics>> {
    Ok(Json(analyses::analysis_statistics(&state.db).await?))
}

pub fn statistics_routes() -> Router<AppState> {
    Router::new().route("/api/statistics", get(get_statistics))
}

//! Image submission endpoint

use axum::{
    extract::{Multipart, State},
    routing::post,
    Json, Router,
};
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::models::Analysis;
use crate::AppState;

/// Multipart field carrying the image
const IMAGE_FIELD: &str = "image";

/// POST /api/analyze
///
/// Stores the uploaded image, runs every analyzer on it and returns the
/// recorded analysis.
pub async fn analyze_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<Analysis>> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let original_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await?;
        upload = Some((original_name, bytes));
        break;
    }

    let (original_name, bytes) =
        upload.ok_or_else(|| ApiError::BadRequest("No image file provided".to_string()))?;

    let image = state
        .images
        .save_uploaded_image(&bytes, &original_name)
        .await?;

    info!(
        analysis_id = %image.id,
        original_name = %image.original_name,
        "Image received, starting analysis"
    );

    let analysis = match state.orchestrator.analyze_and_record(&state.db, &image).await {
        Ok(analysis) => analysis,
        Err(e) => {
            // No record will ever point at this file
            state.images.discard(&image).await;
            return Err(e.into());
        }
    };

    Ok(Json(analysis))
}

pub fn analyze_routes() -> Router<AppState> {
    Router::new().route("/api/analyze", post(analyze_image))
}

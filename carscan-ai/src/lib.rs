//! carscan-ai library interface
//!
//! Exposes public APIs for the binary and for integration testing.

pub mod analyzers;
pub mod api;
pub mod config;
pub mod consensus;
pub mod db;
pub mod error;
pub mod fallback;
pub mod models;
pub mod orchestrator;
pub mod storage;
pub mod types;

pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::orchestrator::AnalysisOrchestrator;
use crate::storage::images::UPLOADS_ROUTE;
use crate::storage::ImageStore;

/// Headroom above the image size limit for multipart framing
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub orchestrator: Arc<AnalysisOrchestrator>,
    pub images: Arc<ImageStore>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, orchestrator: AnalysisOrchestrator, images: ImageStore) -> Self {
        Self {
            db,
            orchestrator: Arc::new(orchestrator),
            images: Arc::new(images),
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let uploads = ServeDir::new(state.images.upload_dir());
    let body_limit = state.images.max_bytes() + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .merge(api::analyze_routes())
        .merge(api::history_routes())
        .merge(api::statistics_routes())
        .merge(api::health_routes())
        .nest_service(UPLOADS_ROUTE, uploads)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

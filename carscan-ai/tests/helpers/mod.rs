//! Test Helper Utilities
//!
//! Scripted analyzers and app construction shared by the carscan-ai
//! integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use carscan_ai::analyzers::{AnalyzerError, DamageAnalyzer};
use carscan_ai::config::{ConsensusConfig, PrimaryFailurePolicy};
use carscan_ai::consensus::ConsensusEngine;
use carscan_ai::fallback::FallbackSynthesizer;
use carscan_ai::orchestrator::AnalysisOrchestrator;
use carscan_ai::storage::ImageStore;
use carscan_ai::types::{
    AnalyzerKind, DamageRegion, DetectionResult, IssueCategory, IssueFlags, Severity,
    SourceMethod,
};
use carscan_ai::AppState;

pub const MAX_UPLOAD_BYTES: usize = 1024 * 1024;
pub const BOUNDARY: &str = "carscan-test-boundary";

/// What a scripted analyzer does when invoked
#[derive(Clone)]
pub enum Script {
    Succeed(DetectionResult),
    Fail(String),
    /// Sleep before succeeding; used for timeout tests
    Stall(Duration, DetectionResult),
}

/// Analyzer double returning a fixed outcome and counting invocations
pub struct ScriptedAnalyzer {
    kind: AnalyzerKind,
    script: Script,
    calls: AtomicUsize,
}

impl ScriptedAnalyzer {
    pub fn new(kind: AnalyzerKind, script: Script) -> Arc<Self> {
        Arc::new(Self {
            kind,
            script,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DamageAnalyzer for ScriptedAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        self.kind
    }

    async fn analyze(&self, _image_path: &Path) -> Result<DetectionResult, AnalyzerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Succeed(result) => Ok(result.clone()),
            Script::Fail(message) => Err(AnalyzerError::NotAvailable(message.clone())),
            Script::Stall(delay, result) => {
                tokio::time::sleep(*delay).await;
                Ok(result.clone())
            }
        }
    }
}

/// Genuine-looking result flagging `categories`, one region each
pub fn detection(
    kind: AnalyzerKind,
    categories: &[IssueCategory],
    cleanliness: f64,
) -> DetectionResult {
    let mut flags = IssueFlags::default();
    let mut regions = Vec::new();
    let mut confidence_scores = BTreeMap::new();

    for category in categories {
        flags.set(*category, true);
        confidence_scores.insert(*category, 0.8);
        regions.push(DamageRegion {
            category: *category,
            confidence: 0.8,
            x: 100.0,
            y: 120.0,
            width: 40.0,
            height: 30.0,
            severity: Severity::Moderate,
            description: format!("{} region", category),
            detected_by: kind.as_str().to_string(),
        });
    }

    DetectionResult {
        flags,
        cleanliness,
        status: "Good".to_string(),
        narrative: String::new(),
        detection_counts: BTreeMap::new(),
        confidence_scores,
        regions,
        source: SourceMethod::Analyzer {
            analyzer: kind,
            detail: None,
        },
    }
    .normalize()
}

/// In-memory pool with the carscan schema
///
/// A single connection keeps every query on the same in-memory database.
pub async fn create_test_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");

    carscan_ai::db::init_tables(&pool)
        .await
        .expect("Failed to initialize schema");

    pool
}

/// Orchestrator over scripted analyzers with a fixed-seed synthesizer
///
/// Every analyzer gets fallback disabled unless listed in `fallback`.
pub fn scripted_orchestrator(
    analyzers: Vec<Arc<ScriptedAnalyzer>>,
    fallback: &[AnalyzerKind],
    policy: PrimaryFailurePolicy,
) -> AnalysisOrchestrator {
    let consensus = ConsensusConfig {
        primary_failure: policy,
        ..ConsensusConfig::default()
    };

    let mut orchestrator = AnalysisOrchestrator::new(
        ConsensusEngine::new(&consensus),
        Arc::new(FallbackSynthesizer::from_seed(7)),
        policy,
    );

    for analyzer in analyzers {
        let kind = analyzer.kind();
        orchestrator = orchestrator.with_analyzer(analyzer, fallback.contains(&kind), None);
    }

    orchestrator
}

/// Full router over scripted analyzers
///
/// Returns the upload TempDir, which must outlive the test.
pub async fn create_test_app(orchestrator: AnalysisOrchestrator) -> (axum::Router, SqlitePool, TempDir) {
    let upload_dir = TempDir::new().expect("Failed to create temp dir");
    let pool = create_test_db().await;

    let images = ImageStore::new(
        upload_dir.path(),
        MAX_UPLOAD_BYTES,
        &["jpg".to_string(), "jpeg".to_string(), "png".to_string()],
    );

    let state = AppState::new(pool.clone(), orchestrator, images);
    (carscan_ai::build_router(state), pool, upload_dir)
}

/// multipart/form-data body with one file part
pub fn multipart_body(field: &str, file_name: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={}", BOUNDARY)
}

/// Minimal bytes standing in for an image; analyzers here never decode it
pub const FAKE_JPEG: &[u8] = b"\xFF\xD8\xFF\xE0fake-jpeg-data\xFF\xD9";

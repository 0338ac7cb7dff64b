//! Analyzer adapters
//!
//! Each analyzer kind is reached through the [`DamageAnalyzer`] capability so
//! the orchestrator and consensus engine never see the transport. The only
//! production implementation is [`ProcessAnalyzer`], which runs an external
//! detector process; tests substitute scripted fakes.
//!
//! Adapters never retry and never substitute results themselves. Whether a
//! failure is replaced by a synthetic result is the orchestrator's decision.

pub mod process;
pub mod wire;

pub use process::ProcessAnalyzer;

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::types::{AnalyzerKind, DetectionResult};

/// Capability interface for one analyzer kind
#[async_trait]
pub trait DamageAnalyzer: Send + Sync {
    /// Analyzer kind, used for provenance and primary designation
    fn kind(&self) -> AnalyzerKind;

    /// Analyze a previously validated, persisted image
    ///
    /// # Errors
    /// Returns `AnalyzerError` if the analyzer is unreachable or its output
    /// cannot be turned into a well-formed [`DetectionResult`].
    async fn analyze(&self, image_path: &Path) -> Result<DetectionResult, AnalyzerError>;
}

/// Why an analyzer invocation produced no usable result
#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// Analyzer missing, disabled, or its runtime is not installed
    #[error("Analyzer not available: {0}")]
    NotAvailable(String),

    /// Process ran and exited unsuccessfully
    #[error("Analyzer exited with {status}: {stderr}")]
    ExecutionFailed { status: String, stderr: String },

    /// Analyzer reported its own error object
    #[error("Analyzer reported error: {0}")]
    Reported(String),

    /// Output was not a well-formed detection result
    #[error("Failed to parse analyzer output: {0}")]
    Parse(String),

    #[error("Analyzer timed out after {}s", .0.as_secs())]
    TimedOut(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AnalyzerError {
    /// True for the "could not reach the analyzer" family, false when the
    /// analyzer ran but its result is unusable
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            AnalyzerError::NotAvailable(_) | AnalyzerError::TimedOut(_) | AnalyzerError::Io(_)
        )
    }
}

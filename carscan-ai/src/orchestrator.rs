//! Analysis orchestrator
//!
//! Fans one image out to every registered analyzer concurrently, waits for all
//! of them (join barrier, no early return), applies the fallback and
//! primary-failure policies, and hands the reports to the consensus engine.
//! [`AnalysisOrchestrator::analyze_and_record`] additionally writes exactly one
//! analysis record after the barrier.

use futures::future::join_all;
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::analyzers::{AnalyzerError, DamageAnalyzer, ProcessAnalyzer};
use crate::config::{PrimaryFailurePolicy, ServiceConfig};
use crate::consensus::{AnalyzerReport, ConsensusEngine, ConsensusOutcome, ReportStatus};
use crate::db;
use crate::fallback::FallbackSynthesizer;
use crate::models::Analysis;
use crate::storage::StoredImage;
use crate::types::{AnalyzerKind, DetectionResult};

/// Request-level failure
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The primary analyzer failed and nothing usable replaced it
    #[error("Primary analyzer {analyzer} failed: {cause}")]
    PrimaryAnalyzerFailed { analyzer: AnalyzerKind, cause: String },

    /// Analysis succeeded but the record could not be stored
    #[error("Failed to record analysis: {0}")]
    Persistence(#[from] carscan_common::Error),
}

/// One registered analyzer with its per-slot policy
struct AnalyzerSlot {
    analyzer: Arc<dyn DamageAnalyzer>,
    fallback: bool,
    timeout: Option<Duration>,
}

pub struct AnalysisOrchestrator {
    slots: Vec<AnalyzerSlot>,
    synthesizer: Arc<FallbackSynthesizer>,
    engine: ConsensusEngine,
    primary_failure: PrimaryFailurePolicy,
}

impl AnalysisOrchestrator {
    pub fn new(
        engine: ConsensusEngine,
        synthesizer: Arc<FallbackSynthesizer>,
        primary_failure: PrimaryFailurePolicy,
    ) -> Self {
        Self {
            slots: Vec::new(),
            synthesizer,
            engine,
            primary_failure,
        }
    }

    /// Register an analyzer
    ///
    /// `fallback` substitutes a synthetic result when it fails; `timeout`
    /// bounds each invocation (expiry counts as a failure). Registering a kind
    /// twice replaces the earlier slot, so each kind runs once per request.
    pub fn with_analyzer(
        mut self,
        analyzer: Arc<dyn DamageAnalyzer>,
        fallback: bool,
        timeout: Option<Duration>,
    ) -> Self {
        let kind = analyzer.kind();
        let slot = AnalyzerSlot {
            analyzer,
            fallback,
            timeout,
        };

        match self.slots.iter_mut().find(|s| s.analyzer.kind() == kind) {
            Some(existing) => {
                warn!(analyzer = %kind, "Analyzer registered twice, replacing earlier registration");
                *existing = slot;
            }
            None => self.slots.push(slot),
        }
        self
    }

    /// Production wiring: one process analyzer per kind
    pub fn from_config(config: &ServiceConfig) -> Self {
        let synthesizer = match config.fallback_seed {
            Some(seed) => FallbackSynthesizer::from_seed(seed),
            None => FallbackSynthesizer::from_entropy(),
        }
        .with_fair_threshold(config.consensus.fair_cleanliness_threshold);

        let mut orchestrator = Self::new(
            ConsensusEngine::new(&config.consensus),
            Arc::new(synthesizer),
            config.consensus.primary_failure,
        );

        for kind in AnalyzerKind::ALL {
            let command = config.analyzers.get(kind);
            orchestrator = orchestrator.with_analyzer(
                Arc::new(ProcessAnalyzer::new(kind, command)),
                command.fallback_for(kind),
                command.timeout(),
            );
        }

        orchestrator
    }

    pub fn primary(&self) -> AnalyzerKind {
        self.engine.primary()
    }

    /// Registered analyzer kinds in registration order
    pub fn analyzers(&self) -> Vec<AnalyzerKind> {
        self.slots.iter().map(|slot| slot.analyzer.kind()).collect()
    }

    /// Run every analyzer against `image_path` and reconcile the results
    ///
    /// # Errors
    /// `PrimaryAnalyzerFailed` when the primary failed without a substitute and
    /// the policy is `Fatal`.
    pub async fn analyze(&self, image_path: &Path) -> Result<ConsensusOutcome, AnalysisError> {
        let started = Instant::now();

        let invocations = self.slots.iter().map(|slot| async move {
            let outcome = match slot.timeout {
                Some(limit) => {
                    match tokio::time::timeout(limit, slot.analyzer.analyze(image_path)).await {
                        Ok(outcome) => outcome,
                        Err(_) => Err(AnalyzerError::TimedOut(limit)),
                    }
                }
                None => slot.analyzer.analyze(image_path).await,
            };
            (slot, outcome)
        });

        // Join barrier: every analyzer has finished or failed past this point
        let reports: Vec<AnalyzerReport> = join_all(invocations)
            .await
            .into_iter()
            .map(|(slot, outcome)| self.settle(slot, outcome))
            .collect();

        let primary = self.primary();
        let primary_failure = match reports.iter().find(|r| r.kind == primary) {
            Some(report) if report.status == ReportStatus::Failed => Some(
                report
                    .error
                    .clone()
                    .unwrap_or_else(|| "unknown error".to_string()),
            ),
            Some(_) => None,
            None => Some("analyzer not registered".to_string()),
        };

        if let Some(cause) = primary_failure {
            match self.primary_failure {
                PrimaryFailurePolicy::Fatal => {
                    error!(analyzer = %primary, error = %cause, "Primary analyzer failed");
                    return Err(AnalysisError::PrimaryAnalyzerFailed {
                        analyzer: primary,
                        cause,
                    });
                }
                PrimaryFailurePolicy::Degrade => {
                    warn!(
                        analyzer = %primary,
                        error = %cause,
                        "Primary analyzer failed, continuing without it"
                    );
                }
            }
        }

        let outcome = self.engine.reconcile(reports);

        info!(
            image = %image_path.display(),
            active = outcome.comparison.active,
            status = %outcome.combined.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Analysis complete"
        );

        Ok(outcome)
    }

    /// Analyze a stored image and persist the resulting record
    ///
    /// Nothing is written when analysis fails.
    pub async fn analyze_and_record(
        &self,
        pool: &SqlitePool,
        image: &StoredImage,
    ) -> Result<Analysis, AnalysisError> {
        let outcome = self.analyze(&image.path).await?;
        let analysis = Analysis::from_outcome(image, outcome, carscan_common::time::now());

        db::analyses::save_analysis(pool, &analysis)
            .await
            .map_err(|e| {
                error!(analysis_id = %analysis.id, error = %e, "Failed to save analysis");
                AnalysisError::Persistence(e)
            })?;

        info!(
            analysis_id = %analysis.id,
            status = %analysis.overall_status,
            "Analysis recorded"
        );

        Ok(analysis)
    }

    /// Turn one invocation outcome into a report, substituting when allowed
    fn settle(
        &self,
        slot: &AnalyzerSlot,
        outcome: Result<DetectionResult, AnalyzerError>,
    ) -> AnalyzerReport {
        let kind = slot.analyzer.kind();
        match outcome {
            // Every implementation's output is clamped and recounted here
            Ok(result) => AnalyzerReport::genuine(kind, result.normalize()),
            Err(e) if slot.fallback => {
                warn!(
                    analyzer = %kind,
                    error = %e,
                    unavailable = e.is_unavailable(),
                    "Analyzer failed, substituting synthetic result"
                );
                AnalyzerReport::synthetic(kind, self.synthesizer.synthesize(kind), e.to_string())
            }
            Err(e) => {
                warn!(
                    analyzer = %kind,
                    error = %e,
                    unavailable = e.is_unavailable(),
                    "Analyzer failed, excluded from voting"
                );
                AnalyzerReport::failed(kind, e.to_string())
            }
        }
    }
}

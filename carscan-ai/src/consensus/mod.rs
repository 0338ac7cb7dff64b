//! Consensus engine
//!
//! Reconciles the per-analyzer reports of one request into a single combined
//! verdict:
//!
//! - Each participating analyzer casts one vote per issue category (its flag).
//! - With `active` participants, a category is flagged iff
//!   `votes >= ceil((active + 1) / 2)`, i.e. a strict majority. A 1-of-2 split
//!   does not flag; 2-of-3 does.
//! - Cleanliness, confidence scores, detection counts and regions pass through
//!   unchanged from one base result (the primary's when it participated). Only
//!   the five flags are replaced by the vote; status and narrative are then
//!   re-derived from the voted flags.
//! - `agreement[c]` answers "did anyone raise it" (`votes >= 1`), independent
//!   of the majority outcome.
//! - Zero participants yields the `Unknown` sentinel, never an all-clean verdict.
//!
//! The [`ComparisonRecord`] keeps everything needed to re-run the rule, so a
//! persisted combined verdict can always be re-derived with [`ConsensusEngine::replay`].

pub mod assessment;

pub use assessment::{ConditionStatus, DEFAULT_FAIR_CLEANLINESS_THRESHOLD};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::config::ConsensusConfig;
use crate::types::{AnalyzerKind, DetectionResult, IssueCategory, IssueFlags, SourceMethod};

// ============================================================================
// Reports
// ============================================================================

/// How an analyzer slot was filled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    /// The analyzer itself produced the result
    Genuine,
    /// The analyzer failed and the fallback synthesizer filled in
    Synthetic,
    /// The analyzer failed with no substitute
    Failed,
}

/// One analyzer's contribution to a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerReport {
    pub kind: AnalyzerKind,
    pub status: ReportStatus,
    /// Whether this report's flags were counted as votes
    pub participated: bool,
    /// Failure that led to substitution or exclusion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub result: DetectionResult,
}

impl AnalyzerReport {
    pub fn genuine(kind: AnalyzerKind, result: DetectionResult) -> Self {
        Self {
            kind,
            status: ReportStatus::Genuine,
            participated: false,
            error: None,
            result,
        }
    }

    pub fn synthetic(kind: AnalyzerKind, result: DetectionResult, error: impl Into<String>) -> Self {
        Self {
            kind,
            status: ReportStatus::Synthetic,
            participated: false,
            error: Some(error.into()),
            result,
        }
    }

    pub fn failed(kind: AnalyzerKind, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            kind,
            status: ReportStatus::Failed,
            participated: false,
            result: DetectionResult::failed_placeholder(kind, error.clone()),
            error: Some(error),
        }
    }
}

/// Durable record of how a combined verdict was reached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRecord {
    pub primary: AnalyzerKind,
    /// One report per analyzer, in kind order
    pub reports: Vec<AnalyzerReport>,
    pub votes: BTreeMap<IssueCategory, u32>,
    pub active: u32,
    /// Votes needed to flag a category
    pub threshold: u32,
    pub agreement: BTreeMap<IssueCategory, bool>,
    pub conflicts: Vec<String>,
    pub fair_cleanliness_threshold: f64,
    pub combined: DetectionResult,
}

impl ComparisonRecord {
    pub fn report(&self, kind: AnalyzerKind) -> Option<&AnalyzerReport> {
        self.reports.iter().find(|r| r.kind == kind)
    }
}

/// Combined verdict plus the record explaining it
#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusOutcome {
    pub combined: DetectionResult,
    pub comparison: ComparisonRecord,
}

/// Votes needed to flag a category: `ceil((active + 1) / 2)`
pub fn vote_threshold(active: u32) -> u32 {
    (active + 2) / 2
}

// ============================================================================
// Engine
// ============================================================================

#[derive(Debug, Clone)]
pub struct ConsensusEngine {
    primary: AnalyzerKind,
    count_synthetic_votes: bool,
    fair_threshold: f64,
}

impl ConsensusEngine {
    pub fn new(config: &ConsensusConfig) -> Self {
        Self {
            primary: config.primary,
            count_synthetic_votes: config.count_synthetic_votes,
            fair_threshold: config.fair_cleanliness_threshold,
        }
    }

    pub fn primary(&self) -> AnalyzerKind {
        self.primary
    }

    /// Reconcile one request's reports
    ///
    /// Participation is decided here: genuine reports always vote, synthetic
    /// ones only when `count_synthetic_votes` is set, failed ones never.
    pub fn reconcile(&self, mut reports: Vec<AnalyzerReport>) -> ConsensusOutcome {
        for report in &mut reports {
            report.participated = match report.status {
                ReportStatus::Genuine => true,
                ReportStatus::Synthetic => self.count_synthetic_votes,
                ReportStatus::Failed => false,
            };
        }
        reports.sort_by_key(|r| r.kind);

        combine(self.primary, self.fair_threshold, reports)
    }

    /// Re-derive the combined verdict from a stored record
    ///
    /// Uses the record's own primary, threshold and participation flags, so the
    /// result does not depend on the current configuration.
    pub fn replay(record: &ComparisonRecord) -> ConsensusOutcome {
        combine(
            record.primary,
            record.fair_cleanliness_threshold,
            record.reports.clone(),
        )
    }

    /// Whether a stored record's combined flags, cleanliness and status are
    /// exactly what replaying its reports produces
    pub fn is_consistent(record: &ComparisonRecord) -> bool {
        let replayed = Self::replay(record).combined;
        replayed.flags == record.combined.flags
            && replayed.cleanliness == record.combined.cleanliness
            && replayed.status == record.combined.status
    }
}

fn combine(
    primary: AnalyzerKind,
    fair_threshold: f64,
    reports: Vec<AnalyzerReport>,
) -> ConsensusOutcome {
    let participants: Vec<&AnalyzerReport> = reports.iter().filter(|r| r.participated).collect();
    let active = participants.len() as u32;
    let threshold = vote_threshold(active);

    let mut votes = BTreeMap::new();
    let mut agreement = BTreeMap::new();
    let mut voted = IssueFlags::default();
    for category in IssueCategory::ALL {
        let count = participants
            .iter()
            .filter(|r| r.result.flags.get(category))
            .count() as u32;
        votes.insert(category, count);
        agreement.insert(category, count >= 1);
        voted.set(category, active > 0 && count >= threshold);
    }

    let base = participants
        .iter()
        .find(|r| r.kind == primary)
        .or_else(|| participants.first())
        .copied();

    let combined = match base {
        None => DetectionResult::unknown(),
        Some(base) => {
            let status = ConditionStatus::assess(&voted, base.result.cleanliness, fair_threshold);
            DetectionResult {
                flags: voted,
                cleanliness: base.result.cleanliness,
                status: status.label().to_string(),
                narrative: status.narrative(&voted),
                detection_counts: base.result.detection_counts.clone(),
                confidence_scores: base.result.confidence_scores.clone(),
                regions: base.result.regions.clone(),
                source: SourceMethod::Consensus {
                    participants: participants.iter().map(|r| r.kind).collect(),
                    base: Some(base.kind),
                },
            }
        }
    };

    let conflicts = conflict_notes(
        primary,
        &reports,
        base.map(|b| b.kind),
        active,
        &votes,
        &voted,
    );

    debug!(
        active = active,
        threshold = threshold,
        status = %combined.status,
        flagged = voted.count(),
        "Consensus reached"
    );

    ConsensusOutcome {
        combined: combined.clone(),
        comparison: ComparisonRecord {
            primary,
            reports,
            votes,
            active,
            threshold,
            agreement,
            conflicts,
            fair_cleanliness_threshold: fair_threshold,
            combined,
        },
    }
}

fn conflict_notes(
    primary: AnalyzerKind,
    reports: &[AnalyzerReport],
    base: Option<AnalyzerKind>,
    active: u32,
    votes: &BTreeMap<IssueCategory, u32>,
    voted: &IssueFlags,
) -> Vec<String> {
    let mut notes = vec![format!("Active analyzers: {} of {}", active, reports.len())];

    for report in reports {
        let reason = report.error.as_deref().unwrap_or("no reason recorded");
        match (report.status, report.participated) {
            (ReportStatus::Genuine, _) => {}
            (ReportStatus::Synthetic, true) => notes.push(format!(
                "{}: synthetic result counted as a vote ({})",
                report.kind, reason
            )),
            (ReportStatus::Synthetic, false) => notes.push(format!(
                "{}: synthetic result excluded from voting ({})",
                report.kind, reason
            )),
            (ReportStatus::Failed, _) => {
                notes.push(format!("{}: failed, not voting ({})", report.kind, reason))
            }
        }
    }

    match base {
        Some(base) if base != primary => notes.push(format!(
            "Primary analyzer {} did not vote; scores taken from {}",
            primary, base
        )),
        None => notes.push("No analyzer participated; result is unknown".to_string()),
        _ => {}
    }

    for (category, count) in votes {
        if *count > 0 && *count < active {
            notes.push(format!(
                "{}: {} of {} analyzers flagged it ({})",
                category,
                count,
                active,
                if voted.get(*category) {
                    "flagged"
                } else {
                    "not flagged"
                }
            ));
        }
    }

    notes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DamageRegion, Severity};

    fn engine() -> ConsensusEngine {
        ConsensusEngine::new(&ConsensusConfig::default())
    }

    fn result(kind: AnalyzerKind, categories: &[IssueCategory], cleanliness: f64) -> DetectionResult {
        let mut flags = IssueFlags::default();
        let mut regions = Vec::new();
        for c in categories {
            flags.set(*c, true);
            regions.push(DamageRegion {
                category: *c,
                confidence: 0.8,
                x: 10.0,
                y: 10.0,
                width: 5.0,
                height: 5.0,
                severity: Severity::Moderate,
                description: String::new(),
                detected_by: kind.to_string(),
            });
        }
        DetectionResult {
            flags,
            cleanliness,
            status: "raw".to_string(),
            narrative: "raw".to_string(),
            detection_counts: BTreeMap::new(),
            confidence_scores: categories.iter().map(|c| (*c, 0.8)).collect(),
            regions,
            source: SourceMethod::Analyzer {
                analyzer: kind,
                detail: None,
            },
        }
        .normalize()
    }

    fn genuine(kind: AnalyzerKind, categories: &[IssueCategory], cleanliness: f64) -> AnalyzerReport {
        AnalyzerReport::genuine(kind, result(kind, categories, cleanliness))
    }

    #[test]
    fn test_threshold_table() {
        assert_eq!(vote_threshold(1), 1);
        assert_eq!(vote_threshold(2), 2);
        assert_eq!(vote_threshold(3), 2);
    }

    #[test]
    fn test_all_flag_dirt_scenario() {
        let outcome = engine().reconcile(vec![
            genuine(AnalyzerKind::LocalModels, &[IssueCategory::Dirt], 0.9),
            genuine(AnalyzerKind::OfflineEnhanced, &[IssueCategory::Dirt], 0.6),
            genuine(AnalyzerKind::Yolo, &[IssueCategory::Dirt], 0.7),
        ]);

        assert_eq!(outcome.combined.flags.flagged(), vec![IssueCategory::Dirt]);
        assert_eq!(outcome.combined.cleanliness, 0.9);
        assert_eq!(outcome.combined.status, "Needs attention");
        assert!(outcome.combined.narrative.contains("dirt"));
        assert_eq!(outcome.comparison.active, 3);
        assert_eq!(outcome.comparison.conflicts, vec!["Active analyzers: 3 of 3"]);
    }

    #[test]
    fn test_two_of_three_flags() {
        let outcome = engine().reconcile(vec![
            genuine(AnalyzerKind::LocalModels, &[IssueCategory::Rust], 0.8),
            genuine(AnalyzerKind::OfflineEnhanced, &[IssueCategory::Rust], 0.8),
            genuine(AnalyzerKind::Yolo, &[], 0.8),
        ]);

        assert!(outcome.combined.flags.rust);
        assert_eq!(outcome.comparison.votes[&IssueCategory::Rust], 2);
        assert!(outcome
            .comparison
            .conflicts
            .contains(&"rust: 2 of 3 analyzers flagged it (flagged)".to_string()));
    }

    #[test]
    fn test_one_of_three_agreement_without_flag() {
        let outcome = engine().reconcile(vec![
            genuine(AnalyzerKind::LocalModels, &[], 0.9),
            genuine(AnalyzerKind::OfflineEnhanced, &[IssueCategory::Crack], 0.9),
            genuine(AnalyzerKind::Yolo, &[], 0.9),
        ]);

        assert!(!outcome.combined.flags.crack);
        assert!(outcome.comparison.agreement[&IssueCategory::Crack]);
        assert!(!outcome.comparison.agreement[&IssueCategory::Rust]);
        assert_eq!(outcome.combined.status, "Good");
    }

    #[test]
    fn test_one_of_two_split_does_not_flag() {
        let outcome = engine().reconcile(vec![
            genuine(AnalyzerKind::LocalModels, &[IssueCategory::Scratch], 0.9),
            genuine(AnalyzerKind::OfflineEnhanced, &[], 0.9),
            AnalyzerReport::failed(AnalyzerKind::Yolo, "weights missing"),
        ]);

        assert_eq!(outcome.comparison.active, 2);
        assert_eq!(outcome.comparison.threshold, 2);
        assert!(!outcome.combined.flags.scratch);
        assert!(outcome.comparison.agreement[&IssueCategory::Scratch]);
        assert!(outcome
            .comparison
            .conflicts
            .contains(&"yolo: failed, not voting (weights missing)".to_string()));
    }

    #[test]
    fn test_base_passthrough_from_primary() {
        let outcome = engine().reconcile(vec![
            genuine(AnalyzerKind::Yolo, &[IssueCategory::Dent], 0.3),
            genuine(AnalyzerKind::LocalModels, &[IssueCategory::Rust], 0.55),
            genuine(AnalyzerKind::OfflineEnhanced, &[], 0.95),
        ]);

        // No category reaches 2 votes, but counts/regions still come from the primary
        assert_eq!(outcome.combined.flags, IssueFlags::default());
        assert_eq!(outcome.combined.cleanliness, 0.55);
        assert_eq!(outcome.combined.status, "Fair");
        assert_eq!(outcome.combined.count(IssueCategory::Rust), 1);
        assert_eq!(outcome.combined.regions.len(), 1);
        assert_eq!(
            outcome.combined.source,
            SourceMethod::Consensus {
                participants: vec![
                    AnalyzerKind::LocalModels,
                    AnalyzerKind::OfflineEnhanced,
                    AnalyzerKind::Yolo
                ],
                base: Some(AnalyzerKind::LocalModels),
            }
        );
        // Reports are stored in kind order
        assert_eq!(outcome.comparison.reports[0].kind, AnalyzerKind::LocalModels);
    }

    #[test]
    fn test_synthetic_votes_counted_by_default() {
        let synthetic = AnalyzerReport::synthetic(
            AnalyzerKind::OfflineEnhanced,
            result(AnalyzerKind::OfflineEnhanced, &[IssueCategory::Dirt], 0.5),
            "python not installed",
        );
        let outcome = engine().reconcile(vec![
            genuine(AnalyzerKind::LocalModels, &[IssueCategory::Dirt], 0.6),
            synthetic,
            AnalyzerReport::failed(AnalyzerKind::Yolo, "no model"),
        ]);

        assert_eq!(outcome.comparison.active, 2);
        assert!(outcome.combined.flags.dirt);
    }

    #[test]
    fn test_synthetic_votes_can_be_excluded() {
        let config = ConsensusConfig {
            count_synthetic_votes: false,
            ..Default::default()
        };
        let synthetic = AnalyzerReport::synthetic(
            AnalyzerKind::LocalModels,
            result(AnalyzerKind::LocalModels, &[IssueCategory::Dirt], 0.5),
            "timed out",
        );
        let outcome = ConsensusEngine::new(&config).reconcile(vec![
            synthetic,
            genuine(AnalyzerKind::OfflineEnhanced, &[], 0.8),
            genuine(AnalyzerKind::Yolo, &[], 0.9),
        ]);

        assert_eq!(outcome.comparison.active, 2);
        assert!(!outcome.combined.flags.dirt);
        assert_eq!(outcome.combined.cleanliness, 0.8);
        assert!(outcome
            .comparison
            .conflicts
            .iter()
            .any(|n| n.starts_with("Primary analyzer local_models did not vote")));
    }

    #[test]
    fn test_zero_participants_yields_unknown_sentinel() {
        let outcome = engine().reconcile(vec![
            AnalyzerReport::failed(AnalyzerKind::LocalModels, "a"),
            AnalyzerReport::failed(AnalyzerKind::OfflineEnhanced, "b"),
            AnalyzerReport::failed(AnalyzerKind::Yolo, "c"),
        ]);

        assert_eq!(outcome.combined.status, "Unknown");
        assert_eq!(outcome.combined.flags, IssueFlags::default());
        assert_eq!(outcome.combined.cleanliness, 0.5);
        assert_eq!(outcome.comparison.active, 0);
        assert!(outcome.comparison.agreement.values().all(|a| !a));
    }

    #[test]
    fn test_replay_reproduces_combined() {
        let outcome = engine().reconcile(vec![
            genuine(AnalyzerKind::LocalModels, &[IssueCategory::Rust, IssueCategory::Dent], 0.4),
            genuine(AnalyzerKind::OfflineEnhanced, &[IssueCategory::Dent], 0.8),
            AnalyzerReport::failed(AnalyzerKind::Yolo, "offline"),
        ]);

        let replayed = ConsensusEngine::replay(&outcome.comparison);

        assert_eq!(replayed, outcome);
        assert!(ConsensusEngine::is_consistent(&outcome.comparison));
    }

    #[test]
    fn test_tampered_record_is_inconsistent() {
        let mut record = engine()
            .reconcile(vec![genuine(AnalyzerKind::LocalModels, &[], 0.9)])
            .comparison;
        record.combined.flags.rust = true;

        assert!(!ConsensusEngine::is_consistent(&record));
    }
}

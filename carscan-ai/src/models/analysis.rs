//! Persisted analysis record
//!
//! An [`Analysis`] is created once per successful request and never mutated.
//! Its flags, cleanliness, status and detail maps are copied from the combined
//! result, and the full [`ComparisonRecord`] is embedded so the verdict can be
//! re-derived later.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::consensus::{ComparisonRecord, ConsensusEngine, ConsensusOutcome};
use crate::storage::StoredImage;
use crate::types::{DamageRegion, IssueCategory, IssueFlags};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub id: Uuid,
    /// Public path of the stored image (`/uploads/<file>`)
    pub image_path: String,
    pub original_name: String,
    pub has_rust: bool,
    pub has_cracks: bool,
    pub has_dirt: bool,
    pub has_scratches: bool,
    pub has_dents: bool,
    pub cleanliness_score: f64,
    pub overall_status: String,
    pub details: String,
    pub detection_counts: BTreeMap<IssueCategory, u32>,
    pub confidence_scores: BTreeMap<IssueCategory, f64>,
    pub damage_details: Vec<DamageRegion>,
    pub comparison: ComparisonRecord,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Analysis {
    /// Build the record for a stored image from its consensus outcome
    ///
    /// The analysis id is the stored image id.
    pub fn from_outcome(image: &StoredImage, outcome: ConsensusOutcome, now: DateTime<Utc>) -> Self {
        let ConsensusOutcome {
            combined,
            comparison,
        } = outcome;

        Self {
            id: image.id,
            image_path: image.public_path(),
            original_name: image.original_name.clone(),
            has_rust: combined.flags.rust,
            has_cracks: combined.flags.crack,
            has_dirt: combined.flags.dirt,
            has_scratches: combined.flags.scratch,
            has_dents: combined.flags.dent,
            cleanliness_score: combined.cleanliness,
            overall_status: combined.status,
            details: combined.narrative,
            detection_counts: combined.detection_counts,
            confidence_scores: combined.confidence_scores,
            damage_details: combined.regions,
            comparison,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn flags(&self) -> IssueFlags {
        IssueFlags {
            rust: self.has_rust,
            crack: self.has_cracks,
            dirt: self.has_dirt,
            scratch: self.has_scratches,
            dent: self.has_dents,
        }
    }

    /// Whether the stored verdict is what replaying the embedded comparison yields
    pub fn is_consistent(&self) -> bool {
        let replayed = ConsensusEngine::replay(&self.comparison).combined;
        ConsensusEngine::is_consistent(&self.comparison)
            && replayed.flags == self.flags()
            && replayed.cleanliness == self.cleanliness_score
            && replayed.status == self.overall_status
    }
}

/// One page of analyses, newest first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisPage {
    pub data: Vec<Analysis>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Aggregate counts over all stored analyses
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisStatistics {
    pub total_analyses: i64,
    pub with_rust: i64,
    pub with_cracks: i64,
    pub with_dirt: i64,
    pub with_scratches: i64,
    pub with_dents: i64,
    /// 0.0 when nothing is stored
    pub avg_cleanliness: f64,
}

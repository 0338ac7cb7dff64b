//! Core detection types shared by analyzers, the synthesizer and consensus
//!
//! A [`DetectionResult`] is the normalized shape every analyzer invocation
//! produces (or that the fallback synthesizer fabricates in its place). It is
//! immutable once returned and consumed exactly once by the consensus engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::consensus::ConditionStatus;

// ============================================================================
// Issue categories
// ============================================================================

/// Damage or cleanliness concern voted on independently by each analyzer
///
/// Serialized in singular form (`"crack"`); the plural spellings analyzers
/// emit on the wire (`"cracks"`) are accepted when deserializing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueCategory {
    Rust,
    #[serde(alias = "cracks")]
    Crack,
    Dirt,
    #[serde(alias = "scratches")]
    Scratch,
    #[serde(alias = "dents")]
    Dent,
}

impl IssueCategory {
    /// Every category in canonical order
    pub const ALL: [IssueCategory; 5] = [
        IssueCategory::Rust,
        IssueCategory::Crack,
        IssueCategory::Dirt,
        IssueCategory::Scratch,
        IssueCategory::Dent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IssueCategory::Rust => "rust",
            IssueCategory::Crack => "crack",
            IssueCategory::Dirt => "dirt",
            IssueCategory::Scratch => "scratch",
            IssueCategory::Dent => "dent",
        }
    }

    /// Parse a category name as analyzers spell it (singular or plural, any case)
    pub fn from_wire(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "rust" => Some(IssueCategory::Rust),
            "crack" | "cracks" => Some(IssueCategory::Crack),
            "dirt" => Some(IssueCategory::Dirt),
            "scratch" | "scratches" => Some(IssueCategory::Scratch),
            "dent" | "dents" => Some(IssueCategory::Dent),
            _ => None,
        }
    }
}

impl fmt::Display for IssueCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a single detected region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Minor,
    Moderate,
    Severe,
}

impl Severity {
    /// Parse analyzer severity text, defaulting to `Minor` for anything unrecognized
    pub fn from_wire(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "severe" => Severity::Severe,
            "moderate" => Severity::Moderate,
            _ => Severity::Minor,
        }
    }
}

/// Boolean verdict per issue category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueFlags {
    pub rust: bool,
    pub crack: bool,
    pub dirt: bool,
    pub scratch: bool,
    pub dent: bool,
}

impl IssueFlags {
    pub fn get(&self, category: IssueCategory) -> bool {
        match category {
            IssueCategory::Rust => self.rust,
            IssueCategory::Crack => self.crack,
            IssueCategory::Dirt => self.dirt,
            IssueCategory::Scratch => self.scratch,
            IssueCategory::Dent => self.dent,
        }
    }

    pub fn set(&mut self, category: IssueCategory, value: bool) {
        match category {
            IssueCategory::Rust => self.rust = value,
            IssueCategory::Crack => self.crack = value,
            IssueCategory::Dirt => self.dirt = value,
            IssueCategory::Scratch => self.scratch = value,
            IssueCategory::Dent => self.dent = value,
        }
    }

    /// Flagged categories in canonical order
    pub fn flagged(&self) -> Vec<IssueCategory> {
        IssueCategory::ALL
            .into_iter()
            .filter(|c| self.get(*c))
            .collect()
    }

    pub fn count(&self) -> usize {
        self.flagged().len()
    }
}

// ============================================================================
// Analyzer identity and provenance
// ============================================================================

/// The three independent analyzer kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyzerKind {
    LocalModels,
    OfflineEnhanced,
    Yolo,
}

impl AnalyzerKind {
    pub const ALL: [AnalyzerKind; 3] = [
        AnalyzerKind::LocalModels,
        AnalyzerKind::OfflineEnhanced,
        AnalyzerKind::Yolo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalyzerKind::LocalModels => "local_models",
            AnalyzerKind::OfflineEnhanced => "offline_enhanced",
            AnalyzerKind::Yolo => "yolo",
        }
    }
}

impl fmt::Display for AnalyzerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance of a [`DetectionResult`]
///
/// Informational only: consensus behavior depends on the report status, never
/// on this tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceMethod {
    /// Produced by a real analyzer run; `detail` keeps its free-form method text
    Analyzer {
        analyzer: AnalyzerKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    /// Fabricated by the fallback synthesizer in place of the named analyzer
    Synthetic { analyzer: AnalyzerKind },
    /// Placeholder for an analyzer that failed without a fallback
    Failed { analyzer: AnalyzerKind, reason: String },
    /// Reconciled result; `base` is absent when nobody participated
    Consensus {
        participants: Vec<AnalyzerKind>,
        base: Option<AnalyzerKind>,
    },
}

impl SourceMethod {
    pub fn is_synthetic(&self) -> bool {
        matches!(self, SourceMethod::Synthetic { .. })
    }
}

// ============================================================================
// Detection results
// ============================================================================

/// One detected damage region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamageRegion {
    pub category: IssueCategory,
    /// Detector confidence (0.0-1.0)
    pub confidence: f64,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub severity: Severity,
    pub description: String,
    pub detected_by: String,
}

/// Normalized output of a single analyzer invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub flags: IssueFlags,
    /// Cleanliness score (0.0-1.0, higher is cleaner)
    pub cleanliness: f64,
    pub status: String,
    pub narrative: String,
    /// Region count per category; categories without regions are absent
    #[serde(default)]
    pub detection_counts: BTreeMap<IssueCategory, u32>,
    #[serde(default)]
    pub confidence_scores: BTreeMap<IssueCategory, f64>,
    #[serde(default)]
    pub regions: Vec<DamageRegion>,
    pub source: SourceMethod,
}

impl DetectionResult {
    /// Placeholder stored for an analyzer that failed and was not substituted
    pub fn failed_placeholder(analyzer: AnalyzerKind, reason: impl Into<String>) -> Self {
        Self {
            flags: IssueFlags::default(),
            cleanliness: 0.5,
            status: ConditionStatus::Unknown.label().to_string(),
            narrative: "Analysis failed".to_string(),
            detection_counts: BTreeMap::new(),
            confidence_scores: BTreeMap::new(),
            regions: Vec::new(),
            source: SourceMethod::Failed {
                analyzer,
                reason: reason.into(),
            },
        }
    }

    /// Sentinel combined result when no analyzer participated in the vote
    ///
    /// Distinct from an all-clean verdict: the status is `Unknown`.
    pub fn unknown() -> Self {
        Self {
            flags: IssueFlags::default(),
            cleanliness: 0.5,
            status: ConditionStatus::Unknown.label().to_string(),
            narrative: ConditionStatus::Unknown.advice().to_string(),
            detection_counts: BTreeMap::new(),
            confidence_scores: BTreeMap::new(),
            regions: Vec::new(),
            source: SourceMethod::Consensus {
                participants: Vec::new(),
                base: None,
            },
        }
    }

    /// Number of regions detected for a category
    pub fn count(&self, category: IssueCategory) -> u32 {
        self.detection_counts.get(&category).copied().unwrap_or(0)
    }

    /// Clamp scores into range and rebuild detection counts from the region list
    pub fn normalize(mut self) -> Self {
        self.cleanliness = clamp_unit(self.cleanliness);
        for score in self.confidence_scores.values_mut() {
            *score = clamp_unit(*score);
        }
        for region in &mut self.regions {
            region.confidence = clamp_unit(region.confidence);
            region.x = region.x.max(0.0);
            region.y = region.y.max(0.0);
            region.width = region.width.max(0.0);
            region.height = region.height.max(0.0);
        }
        self.detection_counts = count_regions(&self.regions);
        self
    }
}

/// Clamp into [0.0, 1.0], mapping NaN to 0.0
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Region count per category, omitting categories with no regions
pub fn count_regions(regions: &[DamageRegion]) -> BTreeMap<IssueCategory, u32> {
    let mut counts = BTreeMap::new();
    for region in regions {
        *counts.entry(region.category).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(category: IssueCategory, confidence: f64) -> DamageRegion {
        DamageRegion {
            category,
            confidence,
            x: -4.0,
            y: 10.0,
            width: 20.0,
            height: 5.0,
            severity: Severity::Minor,
            description: String::new(),
            detected_by: "test".to_string(),
        }
    }

    #[test]
    fn test_category_wire_names() {
        assert_eq!(IssueCategory::from_wire("Cracks"), Some(IssueCategory::Crack));
        assert_eq!(IssueCategory::from_wire("dent"), Some(IssueCategory::Dent));
        assert_eq!(IssueCategory::from_wire("paint"), None);
    }

    #[test]
    fn test_category_map_keys_accept_plurals() {
        let scores: BTreeMap<IssueCategory, f64> =
            serde_json::from_str(r#"{"scratches": 0.4, "rust": 0.9}"#).unwrap();

        assert_eq!(scores.get(&IssueCategory::Scratch), Some(&0.4));
        assert_eq!(serde_json::to_string(&scores).unwrap(), r#"{"rust":0.9,"scratch":0.4}"#);
    }

    #[test]
    fn test_flags_get_set_flagged() {
        let mut flags = IssueFlags::default();
        flags.set(IssueCategory::Dent, true);
        flags.set(IssueCategory::Rust, true);

        assert!(flags.get(IssueCategory::Dent));
        assert_eq!(flags.flagged(), vec![IssueCategory::Rust, IssueCategory::Dent]);
        assert_eq!(flags.count(), 2);
    }

    #[test]
    fn test_normalize_clamps_and_recounts() {
        let mut result = DetectionResult::failed_placeholder(AnalyzerKind::Yolo, "x");
        result.cleanliness = 1.7;
        result.confidence_scores.insert(IssueCategory::Rust, -0.2);
        result.detection_counts.insert(IssueCategory::Dirt, 9);
        result.regions = vec![
            region(IssueCategory::Rust, 1.3),
            region(IssueCategory::Rust, 0.5),
        ];

        let result = result.normalize();

        assert_eq!(result.cleanliness, 1.0);
        assert_eq!(result.confidence_scores[&IssueCategory::Rust], 0.0);
        assert_eq!(result.regions[0].confidence, 1.0);
        assert_eq!(result.regions[0].x, 0.0);
        assert_eq!(result.count(IssueCategory::Rust), 2);
        assert_eq!(result.count(IssueCategory::Dirt), 0);
    }

    #[test]
    fn test_unknown_sentinel_is_not_all_clean() {
        let sentinel = DetectionResult::unknown();

        assert_eq!(sentinel.flags, IssueFlags::default());
        assert_eq!(sentinel.cleanliness, 0.5);
        assert_eq!(sentinel.status, "Unknown");
    }

    #[test]
    fn test_source_method_tagging() {
        let source = SourceMethod::Synthetic {
            analyzer: AnalyzerKind::OfflineEnhanced,
        };
        let json = serde_json::to_value(&source).unwrap();

        assert_eq!(json["kind"], "synthetic");
        assert_eq!(json["analyzer"], "offline_enhanced");
        assert!(source.is_synthetic());
    }
}

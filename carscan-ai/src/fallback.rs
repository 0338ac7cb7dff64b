//! Fallback synthesizer
//!
//! Fabricates a structurally valid [`DetectionResult`] for an analyzer that
//! failed, so consensus always receives a well-formed input for that slot.
//! Results are tagged [`SourceMethod::Synthetic`] so consumers can discount
//! them. The generator is injected at construction; tests pass a seeded
//! `StdRng` for repeatable output.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::consensus::{ConditionStatus, DEFAULT_FAIR_CLEANLINESS_THRESHOLD};
use crate::types::{
    AnalyzerKind, DamageRegion, DetectionResult, IssueCategory, IssueFlags, Severity,
    SourceMethod,
};

const ALL_SEVERITIES: &[Severity] = &[Severity::Minor, Severity::Moderate, Severity::Severe];
const MILD_SEVERITIES: &[Severity] = &[Severity::Minor, Severity::Moderate];

/// Generation parameters for one category
#[derive(Debug, Clone)]
pub struct CategoryProfile {
    pub category: IssueCategory,
    /// Chance the category is flagged
    pub probability: f64,
    /// Inclusive region count range
    pub count: (u32, u32),
    /// Half-open confidence range
    pub confidence: (f64, f64),
    /// Inclusive box width range in pixels
    pub width: (u32, u32),
    pub height: (u32, u32),
    pub severities: &'static [Severity],
    pub description: &'static str,
}

/// Generation parameters for one analyzer kind
#[derive(Debug, Clone)]
pub struct SynthesisProfile {
    pub categories: Vec<CategoryProfile>,
    pub cleanliness: (f64, f64),
    /// Cleanliness multiplier range applied when dirt is flagged
    pub dirt_penalty: (f64, f64),
    pub detected_by: &'static str,
}

impl SynthesisProfile {
    pub fn for_kind(kind: AnalyzerKind) -> Self {
        match kind {
            AnalyzerKind::LocalModels => Self::local_models(),
            AnalyzerKind::OfflineEnhanced | AnalyzerKind::Yolo => Self::offline(),
        }
    }

    fn local_models() -> Self {
        Self {
            categories: vec![
                CategoryProfile {
                    category: IssueCategory::Rust,
                    probability: 0.20,
                    count: (1, 3),
                    confidence: (0.65, 0.95),
                    width: (25, 69),
                    height: (25, 69),
                    severities: ALL_SEVERITIES,
                    description: "Rust detected by color analysis",
                },
                CategoryProfile {
                    category: IssueCategory::Crack,
                    probability: 0.15,
                    count: (1, 2),
                    confidence: (0.70, 0.95),
                    width: (30, 109),
                    height: (2, 9),
                    severities: MILD_SEVERITIES,
                    description: "Crack detected by edge analysis",
                },
                CategoryProfile {
                    category: IssueCategory::Scratch,
                    probability: 0.35,
                    count: (1, 4),
                    confidence: (0.70, 0.95),
                    width: (40, 129),
                    height: (3, 14),
                    severities: ALL_SEVERITIES,
                    description: "Scratch detected by line analysis",
                },
                CategoryProfile {
                    category: IssueCategory::Dent,
                    probability: 0.25,
                    count: (1, 3),
                    confidence: (0.72, 0.95),
                    width: (35, 89),
                    height: (35, 89),
                    severities: ALL_SEVERITIES,
                    description: "Dent detected by shadow analysis",
                },
                CategoryProfile {
                    category: IssueCategory::Dirt,
                    probability: 0.50,
                    count: (2, 7),
                    confidence: (0.55, 0.95),
                    width: (20, 79),
                    height: (15, 54),
                    severities: MILD_SEVERITIES,
                    description: "Dirt detected by threshold analysis",
                },
            ],
            cleanliness: (0.4, 1.0),
            dirt_penalty: (0.6, 0.9),
            detected_by: "local models (synthetic)",
        }
    }

    fn offline() -> Self {
        Self {
            categories: vec![CategoryProfile {
                category: IssueCategory::Dirt,
                probability: 0.35,
                count: (2, 5),
                confidence: (0.45, 0.90),
                width: (20, 79),
                height: (15, 54),
                severities: MILD_SEVERITIES,
                description: "Dirt detected by threshold analysis",
            }],
            cleanliness: (0.2, 1.0),
            dirt_penalty: (0.65, 0.85),
            detected_by: "computer vision (synthetic)",
        }
    }
}

/// Always-succeeding stand-in for a failed analyzer
pub struct FallbackSynthesizer {
    rng: Mutex<StdRng>,
    fair_threshold: f64,
}

impl FallbackSynthesizer {
    pub fn new(rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
            fair_threshold: DEFAULT_FAIR_CLEANLINESS_THRESHOLD,
        }
    }

    pub fn from_seed(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }

    pub fn with_fair_threshold(mut self, threshold: f64) -> Self {
        self.fair_threshold = threshold;
        self
    }

    /// Synthesize a result in place of `kind` using its default profile
    pub fn synthesize(&self, kind: AnalyzerKind) -> DetectionResult {
        self.synthesize_with(kind, &SynthesisProfile::for_kind(kind))
    }

    pub fn synthesize_with(&self, kind: AnalyzerKind, profile: &SynthesisProfile) -> DetectionResult {
        // A poisoned lock still holds a usable generator
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut flags = IssueFlags::default();
        let mut confidence_scores = BTreeMap::new();
        let mut regions = Vec::new();
        let mut cleanliness = sample(&mut *rng, profile.cleanliness);

        for cat in &profile.categories {
            if !rng.gen_bool(cat.probability.clamp(0.0, 1.0)) {
                continue;
            }
            flags.set(cat.category, true);
            confidence_scores.insert(cat.category, sample(&mut *rng, cat.confidence));

            let count = rng.gen_range(cat.count.0..=cat.count.1.max(cat.count.0));
            for _ in 0..count {
                regions.push(DamageRegion {
                    category: cat.category,
                    confidence: sample(&mut *rng, cat.confidence),
                    x: f64::from(rng.gen_range(50..450u32)),
                    y: f64::from(rng.gen_range(50..350u32)),
                    width: f64::from(rng.gen_range(cat.width.0..=cat.width.1.max(cat.width.0))),
                    height: f64::from(rng.gen_range(cat.height.0..=cat.height.1.max(cat.height.0))),
                    severity: cat.severities.choose(&mut *rng).copied().unwrap_or(Severity::Minor),
                    description: cat.description.to_string(),
                    detected_by: profile.detected_by.to_string(),
                });
            }

            if cat.category == IssueCategory::Dirt {
                cleanliness *= sample(&mut *rng, profile.dirt_penalty);
            }
        }

        let status = ConditionStatus::assess(&flags, cleanliness, self.fair_threshold);

        DetectionResult {
            flags,
            cleanliness,
            status: status.label().to_string(),
            narrative: status.narrative(&flags),
            detection_counts: BTreeMap::new(),
            confidence_scores,
            regions,
            source: SourceMethod::Synthetic { analyzer: kind },
        }
        .normalize()
    }
}

/// Uniform sample in `[lo, hi)`, or `lo` for an empty range
fn sample<R: Rng + ?Sized>(rng: &mut R, (lo, hi): (f64, f64)) -> f64 {
    if hi > lo {
        rng.gen_range(lo..hi)
    } else {
        lo
    }
}

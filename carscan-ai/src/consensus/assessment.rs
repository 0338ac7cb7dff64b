//! Condition tiers and narrative text
//!
//! Shared by the consensus engine and the fallback synthesizer so every
//! result, genuine or synthetic, is labeled by the same rule.

use std::fmt;

use crate::types::IssueFlags;

/// Default cleanliness below which an issue-free result is only "Fair"
pub const DEFAULT_FAIR_CLEANLINESS_THRESHOLD: f64 = 0.7;

/// Overall condition tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionStatus {
    Good,
    Fair,
    NeedsAttention,
    Poor,
    /// Analysis could not be completed
    Unknown,
}

impl ConditionStatus {
    /// Tier from flagged category count and cleanliness
    ///
    /// 0 issues → Good (Fair when cleanliness < threshold), 1-2 → Needs attention,
    /// 3 or more → Poor.
    pub fn assess(flags: &IssueFlags, cleanliness: f64, fair_threshold: f64) -> Self {
        match flags.count() {
            0 if cleanliness < fair_threshold => ConditionStatus::Fair,
            0 => ConditionStatus::Good,
            1 | 2 => ConditionStatus::NeedsAttention,
            _ => ConditionStatus::Poor,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConditionStatus::Good => "Good",
            ConditionStatus::Fair => "Fair",
            ConditionStatus::NeedsAttention => "Needs attention",
            ConditionStatus::Poor => "Poor",
            ConditionStatus::Unknown => "Unknown",
        }
    }

    pub fn advice(&self) -> &'static str {
        match self {
            ConditionStatus::Good => "The vehicle is in excellent condition",
            ConditionStatus::Fair => "Professional washing and polishing is recommended",
            ConditionStatus::NeedsAttention => {
                "Repairing the damage is recommended to preserve the vehicle's value"
            }
            ConditionStatus::Poor => {
                "Comprehensive repair and repainting of the damaged areas is recommended"
            }
            ConditionStatus::Unknown => "Analysis could not be completed",
        }
    }

    /// Narrative listing the flagged categories followed by the tier advice
    pub fn narrative(&self, flags: &IssueFlags) -> String {
        let flagged = flags.flagged();
        if flagged.is_empty() {
            return self.advice().to_string();
        }
        let names: Vec<&str> = flagged.iter().map(|c| c.as_str()).collect();
        format!("Detected: {}. {}", names.join(", "), self.advice())
    }
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

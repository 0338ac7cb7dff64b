//! Analyzer stdout format
//!
//! Analyzers print one JSON object and exit. A successful run looks like:
//!
//! ```json
//! {
//!   "rust": false, "cracks": false, "dirt": true, "scratches": false, "dents": false,
//!   "cleanliness": 0.62, "status": "Needs attention", "description": "...",
//!   "detection_counts": {"dirt": 3},
//!   "confidence_scores": {"dirt": 0.81},
//!   "damage_details": [
//!     {"type": "dirt", "confidence": 0.8, "x": 120, "y": 64, "width": 40, "height": 22,
//!      "severity": "minor", "description": "...", "detected_by": "..."}
//!   ],
//!   "method": "local_models"
//! }
//! ```
//!
//! A failing analyzer prints `{"error": "..."}` instead.

use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::debug;

use super::AnalyzerError;
use crate::types::{
    count_regions, AnalyzerKind, DamageRegion, DetectionResult, IssueCategory, IssueFlags,
    Severity, SourceMethod,
};

#[derive(Debug, Deserialize)]
struct AnalyzerOutput {
    #[serde(default)]
    rust: bool,
    #[serde(default)]
    cracks: bool,
    #[serde(default)]
    dirt: bool,
    #[serde(default)]
    scratches: bool,
    #[serde(default)]
    dents: bool,
    cleanliness: f64,
    #[serde(default)]
    status: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    detection_counts: BTreeMap<String, i64>,
    #[serde(default)]
    confidence_scores: BTreeMap<String, f64>,
    #[serde(default)]
    damage_details: Vec<WireRegion>,
    #[serde(default)]
    method: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireRegion {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    x: f64,
    #[serde(default)]
    y: f64,
    #[serde(default)]
    width: f64,
    #[serde(default)]
    height: f64,
    #[serde(default)]
    severity: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    detected_by: String,
}

#[derive(Debug, Deserialize)]
struct ErrorOutput {
    error: String,
}

/// Extract the analyzer's own `{"error": ...}` message, if that is what it printed
pub fn reported_error(stdout: &str) -> Option<String> {
    json_candidates(stdout)
        .find_map(|candidate| serde_json::from_str::<ErrorOutput>(candidate).ok())
        .map(|e| e.error)
}

/// Parse and normalize one analyzer's stdout
///
/// # Errors
/// - `Reported` if the analyzer printed an error object
/// - `Parse` if stdout holds no well-formed result
pub fn parse_output(kind: AnalyzerKind, stdout: &str) -> Result<DetectionResult, AnalyzerError> {
    if let Some(message) = reported_error(stdout) {
        return Err(AnalyzerError::Reported(message));
    }

    let mut last_error = None;
    for candidate in json_candidates(stdout) {
        match serde_json::from_str::<AnalyzerOutput>(candidate) {
            Ok(output) => return Ok(output.into_result(kind)),
            Err(e) => last_error = Some(e.to_string()),
        }
    }

    Err(AnalyzerError::Parse(
        last_error.unwrap_or_else(|| "analyzer produced no output".to_string()),
    ))
}

/// Whole trimmed stdout first, then its last line (analyzers sometimes log
/// progress before the result)
fn json_candidates(stdout: &str) -> impl Iterator<Item = &str> {
    let whole = stdout.trim();
    let last_line = whole
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| line.starts_with('{'))
        .filter(|line| *line != whole);
    std::iter::once(whole)
        .filter(|s| !s.is_empty())
        .chain(last_line)
}

impl AnalyzerOutput {
    fn into_result(self, kind: AnalyzerKind) -> DetectionResult {
        let flags = IssueFlags {
            rust: self.rust,
            crack: self.cracks,
            dirt: self.dirt,
            scratch: self.scratches,
            dent: self.dents,
        };

        // Some detectors report cleanliness as a percentage
        let cleanliness = if self.cleanliness > 1.0 && self.cleanliness <= 100.0 {
            self.cleanliness / 100.0
        } else {
            self.cleanliness
        };

        let confidence_scores = self
            .confidence_scores
            .into_iter()
            .filter_map(|(name, score)| IssueCategory::from_wire(&name).map(|c| (c, score)))
            .collect();

        let regions: Vec<DamageRegion> = self
            .damage_details
            .into_iter()
            .filter_map(|region| region.into_region(kind))
            .collect();

        let recounted = count_regions(&regions);
        for (name, reported) in &self.detection_counts {
            if let Some(category) = IssueCategory::from_wire(name) {
                let actual = recounted.get(&category).copied().unwrap_or(0);
                if i64::from(actual) != *reported {
                    debug!(
                        analyzer = %kind,
                        category = %category,
                        reported = reported,
                        regions = actual,
                        "Detection count differs from region list, using region count"
                    );
                }
            }
        }

        DetectionResult {
            flags,
            cleanliness,
            status: self.status,
            narrative: self.description,
            detection_counts: recounted,
            confidence_scores,
            regions,
            source: SourceMethod::Analyzer {
                analyzer: kind,
                detail: self.method.filter(|m| !m.is_empty()),
            },
        }
        .normalize()
    }
}

impl WireRegion {
    fn into_region(self, kind: AnalyzerKind) -> Option<DamageRegion> {
        let Some(category) = IssueCategory::from_wire(&self.kind) else {
            debug!(analyzer = %kind, region_type = %self.kind, "Dropping region of unknown type");
            return None;
        };

        let detected_by = if self.detected_by.is_empty() {
            kind.to_string()
        } else {
            self.detected_by
        };

        Some(DamageRegion {
            category,
            confidence: self.confidence,
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
            severity: Severity::from_wire(&self.severity),
            description: self.description,
            detected_by,
        })
    }
}

//! Service configuration for carscan-ai
//!
//! Loaded from a TOML file (`<root>/carscan-ai.toml` unless `--config` names
//! another). Every key has a compiled default, so a missing file starts the
//! service with defaults. Relative paths are resolved against the root folder.

use carscan_common::config::load_toml_or_default;
use carscan_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::types::AnalyzerKind;

/// Config file name looked up in the root folder
pub const CONFIG_FILE_NAME: &str = "carscan-ai.toml";

/// Default per-analyzer timeout
pub const DEFAULT_ANALYZER_TIMEOUT_SECS: u64 = 120;

/// Default upload size limit (10 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub bind_address: String,
    pub port: u16,
    /// Tracing filter used when `RUST_LOG` is unset
    pub log_level: String,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    /// Accepted image extensions, lowercase without the dot
    pub allowed_extensions: Vec<String>,
    pub database_file: PathBuf,
    /// Fixed seed for the fallback synthesizer; OS entropy when absent
    pub fallback_seed: Option<u64>,
    pub consensus: ConsensusConfig,
    pub analyzers: AnalyzersConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 8081,
            log_level: "carscan_ai=info,tower_http=info".to_string(),
            upload_dir: PathBuf::from("uploads"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            allowed_extensions: vec!["jpg".to_string(), "jpeg".to_string(), "png".to_string()],
            database_file: PathBuf::from("carscan.db"),
            fallback_seed: None,
            consensus: ConsensusConfig::default(),
            analyzers: AnalyzersConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load, resolve relative paths against `root_folder`, and validate
    pub fn load(path: &Path, root_folder: &Path) -> Result<Self> {
        let config: ServiceConfig = load_toml_or_default(path)?;
        let config = config.with_root(root_folder);
        config.validate()?;
        Ok(config)
    }

    /// Resolve relative paths (uploads, database, analyzer scripts) against `root`
    pub fn with_root(mut self, root: &Path) -> Self {
        self.upload_dir = absolutize(root, &self.upload_dir);
        self.database_file = absolutize(root, &self.database_file);
        for kind in AnalyzerKind::ALL {
            let analyzer = self.analyzers.get_mut(kind);
            let script = analyzer
                .script
                .clone()
                .unwrap_or_else(|| PathBuf::from(default_script(kind)));
            analyzer.script = Some(absolutize(root, &script));
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        let threshold = self.consensus.fair_cleanliness_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::Config(format!(
                "consensus.fair_cleanliness_threshold must be within [0, 1], got {}",
                threshold
            )));
        }
        if self.max_upload_bytes == 0 {
            return Err(Error::Config("max_upload_bytes must be greater than 0".to_string()));
        }
        if self.allowed_extensions.is_empty() {
            return Err(Error::Config("allowed_extensions must not be empty".to_string()));
        }
        if self.allowed_extensions.iter().any(|ext| ext.trim().is_empty()) {
            return Err(Error::Config("allowed_extensions contains an empty entry".to_string()));
        }
        Ok(())
    }
}

fn absolutize(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

// ============================================================================
// Consensus
// ============================================================================

/// What happens when the primary analyzer fails and has no fallback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryFailurePolicy {
    /// Abort the request; nothing is recorded
    #[default]
    Fatal,
    /// Continue without the primary; all-failed yields the unknown sentinel
    Degrade,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    pub primary: AnalyzerKind,
    /// Whether fallback-synthesized results vote alongside genuine ones
    pub count_synthetic_votes: bool,
    pub primary_failure: PrimaryFailurePolicy,
    /// Cleanliness below this downgrades an issue-free verdict to "Fair"
    pub fair_cleanliness_threshold: f64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            primary: AnalyzerKind::LocalModels,
            count_synthetic_votes: true,
            primary_failure: PrimaryFailurePolicy::Fatal,
            fair_cleanliness_threshold: 0.7,
        }
    }
}

// ============================================================================
// Analyzer commands
// ============================================================================

/// External command settings for one analyzer
///
/// `script`, `args` and `fallback` fall back to per-kind defaults when unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerCommandConfig {
    pub program: String,
    pub script: Option<PathBuf>,
    /// Extra arguments appended after the image path
    pub args: Option<Vec<String>>,
    /// 0 disables the timeout
    pub timeout_secs: u64,
    pub fallback: Option<bool>,
    pub enabled: bool,
}

impl Default for AnalyzerCommandConfig {
    fn default() -> Self {
        Self {
            program: "python".to_string(),
            script: None,
            args: None,
            timeout_secs: DEFAULT_ANALYZER_TIMEOUT_SECS,
            fallback: None,
            enabled: true,
        }
    }
}

impl AnalyzerCommandConfig {
    pub fn script_for(&self, kind: AnalyzerKind) -> PathBuf {
        self.script
            .clone()
            .unwrap_or_else(|| PathBuf::from(default_script(kind)))
    }

    pub fn args_for(&self, kind: AnalyzerKind) -> Vec<String> {
        match &self.args {
            Some(args) => args.clone(),
            None if kind == AnalyzerKind::Yolo => vec!["small".to_string()],
            None => Vec::new(),
        }
    }

    /// Whether a failure of this analyzer is replaced by a synthetic result
    pub fn fallback_for(&self, kind: AnalyzerKind) -> bool {
        self.fallback.unwrap_or(kind != AnalyzerKind::Yolo)
    }

    pub fn timeout(&self) -> Option<std::time::Duration> {
        (self.timeout_secs > 0).then(|| std::time::Duration::from_secs(self.timeout_secs))
    }
}

fn default_script(kind: AnalyzerKind) -> &'static str {
    match kind {
        AnalyzerKind::LocalModels => "model/local_models_simulator.py",
        AnalyzerKind::OfflineEnhanced => "model/offline_analyzer.py",
        AnalyzerKind::Yolo => "model/yolo_damage_detector.py",
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzersConfig {
    pub local_models: AnalyzerCommandConfig,
    pub offline_enhanced: AnalyzerCommandConfig,
    pub yolo: AnalyzerCommandConfig,
}

impl AnalyzersConfig {
    pub fn get(&self, kind: AnalyzerKind) -> &AnalyzerCommandConfig {
        match kind {
            AnalyzerKind::LocalModels => &self.local_models,
            AnalyzerKind::OfflineEnhanced => &self.offline_enhanced,
            AnalyzerKind::Yolo => &self.yolo,
        }
    }

    pub fn get_mut(&mut self, kind: AnalyzerKind) -> &mut AnalyzerCommandConfig {
        match kind {
            AnalyzerKind::LocalModels => &mut self.local_models,
            AnalyzerKind::OfflineEnhanced => &mut self.offline_enhanced,
            AnalyzerKind::Yolo => &mut self.yolo,
        }
    }
}

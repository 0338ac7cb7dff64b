//! External process analyzer
//!
//! Runs `<program> <script> <image> [args...]` and parses the single JSON
//! object the detector prints on stdout. The process is killed if the
//! invocation future is dropped (e.g. when the orchestrator's timeout fires).

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use super::{wire, AnalyzerError, DamageAnalyzer};
use crate::config::AnalyzerCommandConfig;
use crate::types::{AnalyzerKind, DetectionResult};

/// Longest stderr excerpt kept in an error
const STDERR_EXCERPT_CHARS: usize = 2000;

pub struct ProcessAnalyzer {
    kind: AnalyzerKind,
    program: String,
    script: PathBuf,
    args: Vec<String>,
    enabled: bool,
}

impl ProcessAnalyzer {
    pub fn new(kind: AnalyzerKind, config: &AnalyzerCommandConfig) -> Self {
        Self {
            kind,
            program: config.program.clone(),
            script: config.script_for(kind),
            args: config.args_for(kind),
            enabled: config.enabled,
        }
    }

    fn command(&self, image_path: &Path) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg(&self.script)
            .arg(image_path)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl DamageAnalyzer for ProcessAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        self.kind
    }

    async fn analyze(&self, image_path: &Path) -> Result<DetectionResult, AnalyzerError> {
        if !self.enabled {
            return Err(AnalyzerError::NotAvailable(format!(
                "{} analyzer disabled in configuration",
                self.kind
            )));
        }

        if !self.script.exists() {
            return Err(AnalyzerError::NotAvailable(format!(
                "analyzer script not found: {}",
                self.script.display()
            )));
        }

        debug!(
            analyzer = %self.kind,
            program = %self.program,
            script = %self.script.display(),
            image = %image_path.display(),
            "Invoking analyzer"
        );

        let output = self
            .command(image_path)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    AnalyzerError::NotAvailable(format!("{} not installed", self.program))
                }
                _ => AnalyzerError::Io(e),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);

        if !output.status.success() {
            if let Some(message) = wire::reported_error(&stdout) {
                return Err(AnalyzerError::Reported(message));
            }
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AnalyzerError::ExecutionFailed {
                status: output.status.to_string(),
                stderr: stderr.trim().chars().take(STDERR_EXCERPT_CHARS).collect(),
            });
        }

        let result = wire::parse_output(self.kind, &stdout)?;

        debug!(
            analyzer = %self.kind,
            flagged = result.flags.count(),
            regions = result.regions.len(),
            "Analyzer completed"
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(program: &str, script: PathBuf) -> AnalyzerCommandConfig {
        AnalyzerCommandConfig {
            program: program.to_string(),
            script: Some(script),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_disabled_analyzer_not_available() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("detector.py");
        std::fs::write(&script, "").unwrap();
        let mut cfg = config("python", script);
        cfg.enabled = false;

        let analyzer = ProcessAnalyzer::new(AnalyzerKind::Yolo, &cfg);
        let err = analyzer.analyze(Path::new("car.jpg")).await.unwrap_err();

        assert!(matches!(err, AnalyzerError::NotAvailable(_)));
    }

    #[tokio::test]
    async fn test_missing_script_not_available() {
        let dir = tempfile::tempdir().unwrap();
        let analyzer = ProcessAnalyzer::new(
            AnalyzerKind::LocalModels,
            &config("python", dir.path().join("absent.py")),
        );

        let err = analyzer.analyze(Path::new("car.jpg")).await.unwrap_err();

        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_missing_program_not_available() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("detector.py");
        std::fs::write(&script, "").unwrap();
        let analyzer = ProcessAnalyzer::new(
            AnalyzerKind::OfflineEnhanced,
            &config("carscan-no-such-interpreter", script),
        );

        let err = analyzer.analyze(Path::new("car.jpg")).await.unwrap_err();

        assert!(matches!(err, AnalyzerError::NotAvailable(msg) if msg.contains("not installed")));
    }

    #[cfg(unix)]
    mod unix {
        use super::*;

        fn shell_analyzer(body: &str) -> (tempfile::TempDir, ProcessAnalyzer) {
            let dir = tempfile::tempdir().unwrap();
            let script = dir.path().join("detector.sh");
            std::fs::write(&script, body).unwrap();
            let analyzer = ProcessAnalyzer::new(AnalyzerKind::Yolo, &config("sh", script));
            (dir, analyzer)
        }

        #[tokio::test]
        async fn test_successful_run() {
            let (_dir, analyzer) = shell_analyzer(
                r#"echo '{"dents": true, "cleanliness": 0.8, "status": "Needs attention", "method": "yolov8_small"}'"#,
            );

            let result = analyzer.analyze(Path::new("car.jpg")).await.unwrap();

            assert!(result.flags.dent);
            assert_eq!(result.cleanliness, 0.8);
        }

        #[tokio::test]
        async fn test_image_path_and_args_passed() {
            // $1 is the image path, $2 the first configured arg ("small" for yolo)
            let (_dir, analyzer) = shell_analyzer(
                r#"if [ "$1" = "car.jpg" ] && [ "$2" = "small" ]; then echo '{"cleanliness": 1.0}'; else exit 3; fi"#,
            );

            assert!(analyzer.analyze(Path::new("car.jpg")).await.is_ok());
        }

        #[tokio::test]
        async fn test_reported_error_on_failure_exit() {
            let (_dir, analyzer) =
                shell_analyzer(r#"echo '{"error": "ultralytics not installed"}'; exit 1"#);

            let err = analyzer.analyze(Path::new("car.jpg")).await.unwrap_err();

            assert!(matches!(err, AnalyzerError::Reported(msg) if msg == "ultralytics not installed"));
        }

        #[tokio::test]
        async fn test_nonzero_exit_keeps_stderr() {
            let (_dir, analyzer) = shell_analyzer("echo 'segfault in model' >&2; exit 2");

            let err = analyzer.analyze(Path::new("car.jpg")).await.unwrap_err();

            match err {
                AnalyzerError::ExecutionFailed { stderr, .. } => {
                    assert_eq!(stderr, "segfault in model")
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }

        #[tokio::test]
        async fn test_garbage_stdout_is_parse_error() {
            let (_dir, analyzer) = shell_analyzer("echo 'not json at all'");

            let err = analyzer.analyze(Path::new("car.jpg")).await.unwrap_err();

            assert!(matches!(err, AnalyzerError::Parse(_)));
            assert!(!err.is_unavailable());
        }
    }
}

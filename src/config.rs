//! Configuration for a gridsweep campaign.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Main configuration for a campaign run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Input configuration
    #[serde(default)]
    pub input: InputConfig,

    /// Output configuration
    #[serde(default)]
    pub output: OutputConfig,

    /// Worker configuration
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Processing configuration
    #[serde(default)]
    pub processing: ProcessingConfig,
}

/// Input data configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Path to the coordinates file (one work unit per line)
    #[serde(default = "default_coordinates_path")]
    pub coordinates_path: PathBuf,

    /// Search query handed to the worker for every unit
    #[serde(default = "default_query")]
    pub query: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            coordinates_path: default_coordinates_path(),
            query: default_query(),
        }
    }
}

/// Output file configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Master CSV that collects rows from every unit
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,

    /// Append-only log of completed unit identifiers
    #[serde(default = "default_progress_path")]
    pub progress_path: PathBuf,

    /// Append-only log of units that exhausted their retries.
    /// Not read back; lets an operator re-queue gaps by hand.
    #[serde(default)]
    pub failed_path: Option<PathBuf>,

    /// Scratch directory for the query file, the per-unit artifact and the error log
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Worker diagnostic log (default: `<work_dir>/worker-errors.log`)
    #[serde(default)]
    pub error_log_path: Option<PathBuf>,
}

impl OutputConfig {
    /// Query file written once per run and handed to the worker.
    pub fn query_path(&self) -> PathBuf {
        self.work_dir.join("queries.txt")
    }

    /// Per-unit results artifact produced by the worker.
    pub fn artifact_path(&self) -> PathBuf {
        self.work_dir.join("unit-results.csv")
    }

    /// Worker diagnostic log, appended across attempts.
    pub fn error_log_path(&self) -> PathBuf {
        self.error_log_path
            .clone()
            .unwrap_or_else(|| self.work_dir.join("worker-errors.log"))
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_path: default_output_path(),
            progress_path: default_progress_path(),
            failed_path: None,
            work_dir: default_work_dir(),
            error_log_path: None,
        }
    }
}

/// How the worker is launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerBackend {
    /// `reference` is a container image started with `docker run`
    Docker,
    /// `reference` is an executable path or a name on `PATH`
    Binary,
}

/// Worker invocation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Execution backend
    #[serde(default = "default_backend")]
    pub backend: WorkerBackend,

    /// Container image or executable
    #[serde(default = "default_worker_reference")]
    pub reference: String,

    /// Container CLI used by the docker backend
    #[serde(default = "default_docker_program")]
    pub docker_program: String,

    /// Radius + short timeout profile instead of depth + long timeout
    #[serde(default)]
    pub fast_mode: bool,

    /// Scroll depth (browser mode only)
    #[serde(default = "default_depth")]
    pub depth: u32,

    /// Search radius in meters (fast mode only, unless the unit carries its own)
    #[serde(default = "default_radius_meters")]
    pub radius_meters: u32,

    /// Worker self-exit after inactivity, fast mode
    #[serde(default = "default_fast_inactivity_timeout")]
    pub fast_inactivity_timeout: String,

    /// Worker self-exit after inactivity, browser mode
    #[serde(default = "default_browser_inactivity_timeout")]
    pub browser_inactivity_timeout: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            reference: default_worker_reference(),
            docker_program: default_docker_program(),
            fast_mode: false,
            depth: default_depth(),
            radius_meters: default_radius_meters(),
            fast_inactivity_timeout: default_fast_inactivity_timeout(),
            browser_inactivity_timeout: default_browser_inactivity_timeout(),
        }
    }
}

/// Processing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Pause after each unit, in seconds
    #[serde(default = "default_delay_secs")]
    pub delay_secs: u64,

    /// Kill a worker that runs longer than this (disabled when unset)
    #[serde(default)]
    pub unit_timeout_secs: Option<u64>,

    /// Print the run summary block
    #[serde(default = "default_true")]
    pub enable_metrics: bool,

    /// Optional path to save metrics JSON after run completes
    #[serde(default)]
    pub metrics_output_path: Option<PathBuf>,

    /// Retry configuration for failed units
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            delay_secs: default_delay_secs(),
            unit_timeout_secs: None,
            enable_metrics: true,
            metrics_output_path: None,
            retry: RetryConfig::default(),
        }
    }
}

/// Retry configuration for failed worker runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts per unit, including the first
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Fixed pause between attempts, in seconds
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_secs: default_backoff_secs(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML or JSON file.
    /// Format is auto-detected from file extension (.yaml, .yml, or .json).
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let config: Config = match ext {
            "yaml" | "yml" => serde_yaml::from_str(&contents)?,
            "json" => serde_json::from_str(&contents)?,
            _ => {
                // Try YAML first (it's a superset of JSON)
                serde_yaml::from_str(&contents)?
            }
        };
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Load configuration from a JSON string.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        Ok(config)
    }

    /// Serialize configuration to YAML.
    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Validate the configuration.
    ///
    /// Only checks values; whether the files and the worker exist is
    /// checked by the preflight in `run_campaign`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.processing.retry.max_retries == 0 {
            return Err(ConfigError::Invalid("max_retries must be > 0".into()));
        }
        if self.worker.reference.trim().is_empty() {
            return Err(ConfigError::Invalid("worker reference must not be empty".into()));
        }
        if self.input.query.trim().is_empty() {
            return Err(ConfigError::Invalid("query must not be empty".into()));
        }
        if self.processing.unit_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid("unit_timeout_secs must be > 0 when set".into()));
        }
        if !self.worker.fast_mode && self.worker.depth == 0 {
            return Err(ConfigError::Invalid("depth must be > 0 in browser mode".into()));
        }
        if self.output.output_path == self.output.progress_path {
            return Err(ConfigError::Invalid(
                "output_path and progress_path must differ".into(),
            ));
        }
        Ok(())
    }
}

// Default value functions for serde
fn default_coordinates_path() -> PathBuf { PathBuf::from("coordinates.txt") }
fn default_query() -> String { "restaurants".to_string() }
fn default_output_path() -> PathBuf { PathBuf::from("results.csv") }
fn default_progress_path() -> PathBuf { PathBuf::from("progress.log") }
fn default_work_dir() -> PathBuf { PathBuf::from(".gridsweep") }
fn default_backend() -> WorkerBackend { WorkerBackend::Docker }
fn default_worker_reference() -> String { "gosom/google-maps-scraper".to_string() }
fn default_docker_program() -> String { "docker".to_string() }
fn default_depth() -> u32 { 20 }
fn default_radius_meters() -> u32 { 150 }
fn default_fast_inactivity_timeout() -> String { "1m".to_string() }
fn default_browser_inactivity_timeout() -> String { "3m".to_string() }
fn default_delay_secs() -> u64 { 1 }
fn default_true() -> bool { true }
fn default_max_retries() -> u32 { 3 }
fn default_backoff_secs() -> u64 { 2 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.processing.delay_secs, 1);
        assert_eq!(config.worker.depth, 20);
        assert_eq!(config.processing.retry.max_retries, 3);
        assert_eq!(config.processing.retry.backoff_secs, 2);
        assert!(!config.worker.fast_mode);
        assert_eq!(config.worker.backend, WorkerBackend::Docker);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config = Config::from_yaml(
            r#"
input:
  coordinates_path: grid.txt
worker:
  backend: binary
  reference: /usr/local/bin/scraper
  fast_mode: true
processing:
  retry:
    max_retries: 5
"#,
        )
        .unwrap();

        assert_eq!(config.input.coordinates_path, PathBuf::from("grid.txt"));
        assert_eq!(config.input.query, "restaurants");
        assert_eq!(config.worker.backend, WorkerBackend::Binary);
        assert!(config.worker.fast_mode);
        assert_eq!(config.processing.retry.max_retries, 5);
        assert_eq!(config.processing.retry.backoff_secs, 2);
        assert_eq!(config.output.progress_path, PathBuf::from("progress.log"));
    }

    #[test]
    fn test_json_config() {
        let config = Config::from_json(r#"{"processing": {"delay_secs": 0}}"#).unwrap();
        assert_eq!(config.processing.delay_secs, 0);
        assert_eq!(config.worker.reference, "gosom/google-maps-scraper");
    }

    #[test]
    fn test_yaml_round_trip_keeps_backend() {
        let mut config = Config::default();
        config.worker.backend = WorkerBackend::Binary;
        let yaml = config.to_yaml().unwrap();
        assert!(yaml.contains("backend: binary"));
        let parsed = Config::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.worker.backend, WorkerBackend::Binary);
    }

    #[test]
    fn test_derived_work_paths() {
        let mut output = OutputConfig::default();
        output.work_dir = PathBuf::from("/tmp/run");
        assert_eq!(output.query_path(), PathBuf::from("/tmp/run/queries.txt"));
        assert_eq!(output.artifact_path(), PathBuf::from("/tmp/run/unit-results.csv"));
        assert_eq!(output.error_log_path(), PathBuf::from("/tmp/run/worker-errors.log"));

        output.error_log_path = Some(PathBuf::from("errors.log"));
        assert_eq!(output.error_log_path(), PathBuf::from("errors.log"));
    }

    #[test]
    fn test_config_validation_invalid() {
        let mut config = Config::default();
        config.processing.retry.max_retries = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.worker.reference = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.processing.unit_timeout_secs = Some(0);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.output.progress_path = config.output.output_path.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_depth_ignored_in_fast_mode() {
        let mut config = Config::default();
        config.worker.depth = 0;
        assert!(config.validate().is_err());
        config.worker.fast_mode = true;
        assert!(config.validate().is_ok());
    }
}

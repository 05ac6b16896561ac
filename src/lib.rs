//! gridsweep
//!
//! Checkpointed batch executor for grid-partitioned scraping campaigns.
//! Each line of a coordinates file is a work unit; every unit is handed to
//! an external scraper, its CSV rows are folded into one master file, and
//! completion is checkpointed so an interrupted campaign resumes where it
//! stopped.
//!
//! # Architecture
//!
//! - **Index**: Work unit loading and coordinate bounds
//! - **I/O**: Append-only progress log and master CSV aggregation
//! - **Worker**: Container or binary invocation behind the [`Worker`] trait
//! - **Pipeline**: Sequential orchestrator with retry, rate limiting and metrics
//!
//! # Usage
//!
//! ```no_run
//! use gridsweep::{build_runtime, run_campaign, Config};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::from_file("config.yaml".as_ref())?;
//!     let summary = build_runtime()?.block_on(run_campaign(config))?;
//!     println!("{}", summary);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod index;
pub mod io;
pub mod pipeline;
pub mod worker;

pub use config::{Config, WorkerBackend};
pub use error::{CampaignError, ConfigError};
pub use index::{coordinate_bounds, load_work_units, WorkUnit};
pub use io::{ProgressLog, ResultAggregator};
pub use pipeline::{Metrics, Orchestrator, RunStats, RunSummary};
pub use worker::{ProcessWorker, Worker};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Worker wall time per grid cell used for estimates, in seconds.
const CELL_SECS_MIN: u64 = 2;
const CELL_SECS_MAX: u64 = 4;

/// Run a campaign to completion with the given configuration.
///
/// Ctrl-C stops the run before the in-flight unit is checkpointed and
/// returns [`CampaignError::Interrupted`].
pub async fn run_campaign(config: Config) -> Result<RunSummary, CampaignError> {
    config.validate()?;

    let config = Arc::new(config);

    tracing::info!("Starting gridsweep campaign");

    // Fail fast on missing inputs before touching any output
    if !config.input.coordinates_path.exists() {
        return Err(ConfigError::MissingInput(config.input.coordinates_path.clone()).into());
    }
    worker::preflight(&config).await?;

    let worker = ProcessWorker::new(config.clone())?;
    let metrics = Metrics::new();
    let orchestrator = Orchestrator::new(config.clone(), worker, metrics.clone());

    let result = orchestrator.run_with_shutdown(shutdown_signal()).await;

    let stats = metrics.snapshot();
    tracing::info!("{}", stats);
    if config.processing.enable_metrics {
        stats.print_summary();
    }
    if let Some(path) = &config.processing.metrics_output_path {
        if let Err(e) = stats.save_to_file(path) {
            tracing::warn!("Failed to save metrics to {}: {}", path.display(), e);
        }
    }

    result
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Campaign state without running anything.
#[derive(Debug, Clone, PartialEq)]
pub struct CampaignStatus {
    /// Distinct units in the coordinates file
    pub total_units: usize,

    /// Units already in the progress log
    pub done: usize,

    /// Units still to process
    pub pending: usize,

    /// `[min_lat, min_lng, max_lat, max_lng]` of all coordinate units
    pub bounds: Option<[f64; 4]>,

    /// Estimated remaining wall time range
    pub estimate: (Duration, Duration),
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Units: {} total, {} done, {} pending", self.total_units, self.done, self.pending)?;
        match self.bounds {
            Some(b) => writeln!(
                f,
                "Bounds: lat [{:.4}, {:.4}], lng [{:.4}, {:.4}]",
                b[0], b[2], b[1], b[3]
            )?,
            None => writeln!(f, "Bounds: n/a")?,
        }
        write!(
            f,
            "Estimated time remaining: {} - {}",
            pipeline::format_duration(self.estimate.0),
            pipeline::format_duration(self.estimate.1)
        )
    }
}

/// Inspect the coordinates file and progress log.
///
/// Nothing is created or written.
pub fn campaign_status(config: &Config) -> Result<CampaignStatus, CampaignError> {
    let units = load_work_units(&config.input.coordinates_path)?;

    let ids: HashSet<&str> = units.iter().map(WorkUnit::id).collect();
    let done = if config.output.progress_path.exists() {
        let progress = ProgressLog::load(&config.output.progress_path)?;
        units
            .iter()
            .filter(|u| progress.contains(u))
            .map(WorkUnit::id)
            .collect::<HashSet<_>>()
            .len()
    } else {
        0
    };
    let pending = ids.len() - done;

    let delay = config.processing.delay_secs;
    let estimate = (
        Duration::from_secs(pending as u64 * (CELL_SECS_MIN + delay)),
        Duration::from_secs(pending as u64 * (CELL_SECS_MAX + delay)),
    );

    Ok(CampaignStatus {
        total_units: ids.len(),
        done,
        pending,
        bounds: coordinate_bounds(&units),
        estimate,
    })
}

/// Build the single-threaded Tokio runtime a campaign runs on.
pub fn build_runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    Ok(runtime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir, coordinates: &str) -> Config {
        let mut config = Config::default();
        config.input.coordinates_path = dir.path().join("coordinates.txt");
        config.output.progress_path = dir.path().join("progress.log");
        config.output.output_path = dir.path().join("results.csv");
        fs::write(&config.input.coordinates_path, coordinates).unwrap();
        config
    }

    #[test]
    fn test_status_counts_and_estimate() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir, "1.0,103.0\n1.5,104.0\n1.2,103.5\n1.0,103.0\n");
        fs::write(&config.output.progress_path, "1.0,103.0\nstale,entry\n").unwrap();

        let status = campaign_status(&config).unwrap();

        assert_eq!(status.total_units, 3);
        assert_eq!(status.done, 1);
        assert_eq!(status.pending, 2);
        assert_eq!(status.bounds, Some([1.0, 103.0, 1.5, 104.0]));
        // delay 1s: 2 * 3s .. 2 * 5s
        assert_eq!(status.estimate, (Duration::from_secs(6), Duration::from_secs(10)));
        assert!(status.to_string().contains("3 total, 1 done, 2 pending"));
    }

    #[test]
    fn test_status_does_not_create_files() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir, "a\n");

        let status = campaign_status(&config).unwrap();

        assert_eq!(status.pending, 1);
        assert_eq!(status.bounds, None);
        assert!(!config.output.progress_path.exists());
        assert!(!config.output.output_path.exists());
    }

    #[test]
    fn test_status_missing_coordinates() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir, "");
        fs::remove_file(&config.input.coordinates_path).unwrap();

        assert!(matches!(
            campaign_status(&config),
            Err(CampaignError::Config(ConfigError::MissingInput(_)))
        ));
    }

    #[tokio::test]
    async fn test_run_campaign_missing_coordinates_fails_fast() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir, "");
        fs::remove_file(&config.input.coordinates_path).unwrap();
        let output_path = config.output.output_path.clone();

        let err = run_campaign(config).await.unwrap_err();

        assert!(matches!(err, CampaignError::Config(ConfigError::MissingInput(_))));
        assert!(!output_path.exists());
    }

    #[tokio::test]
    async fn test_run_campaign_missing_binary_fails_fast() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir, "a\n");
        config.worker.backend = WorkerBackend::Binary;
        config.worker.reference = "gridsweep-no-such-scraper".to_string();

        let err = run_campaign(config).await.unwrap_err();

        assert!(matches!(err, CampaignError::Config(ConfigError::MissingWorker(_))));
        assert_eq!(err.exit_code(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_campaign_with_binary_worker() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir, "1.3,103.8\n1.4,103.9\n");
        config.output.work_dir = dir.path().join("work");
        config.worker.backend = WorkerBackend::Binary;
        config.worker.reference = "true".to_string();
        config.processing.delay_secs = 0;
        config.processing.enable_metrics = false;
        config.processing.metrics_output_path = Some(dir.path().join("metrics.json"));

        let summary = run_campaign(config.clone()).await.unwrap();

        // `true` writes no artifact rows
        assert_eq!(summary.units_processed, 2);
        assert_eq!(summary.rows_collected, 0);
        assert_eq!(
            fs::read_to_string(&config.output.progress_path).unwrap(),
            "1.3,103.8\n1.4,103.9\n"
        );
        assert!(fs::read_to_string(&config.output.output_path)
            .unwrap()
            .starts_with("input_id,link,title"));
        assert!(dir.path().join("metrics.json").exists());
    }
}

//! Sequential campaign loop.
//!
//! For each pending unit, in file order:
//! invoke (with retry) → aggregate → checkpoint → report → rate-limit.
//! The checkpoint for a unit is written only after its rows are appended,
//! so a crash in between replays the unit on the next run.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::error::CampaignError;
use crate::index::{load_work_units, WorkUnit};
use crate::io::{terminate_last_line, ProgressLog, ResultAggregator};
use crate::pipeline::{
    Metrics, ProgressReporter, RateLimiter, RetryController, RetryPolicy, UnitOutcome,
};
use crate::worker::Worker;

/// Result of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Distinct units in the coordinates file
    pub total_units: usize,

    /// Units skipped as already complete (earlier run or repeated line)
    pub units_skipped: usize,

    /// Units driven to a terminal state this run
    pub units_processed: usize,

    /// Units that exhausted their retries this run
    pub errors: usize,

    /// Worker invocations this run
    pub attempts: u64,

    /// Data rows appended this run
    pub rows_appended: usize,

    /// Data rows in the master output after the run
    pub rows_collected: usize,

    pub output_path: PathBuf,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} rows collected ({} new), {} units processed, {} skipped, {} errors. Output: {}",
            self.rows_collected,
            self.rows_appended,
            self.units_processed,
            self.units_skipped,
            self.errors,
            self.output_path.display()
        )
    }
}

/// Drives every unit of a campaign through a [`Worker`].
pub struct Orchestrator<W: Worker> {
    config: Arc<Config>,
    worker: W,
    metrics: Arc<Metrics>,
    retry: RetryController,
    rate_limiter: RateLimiter,
}

impl<W: Worker> Orchestrator<W> {
    pub fn new(config: Arc<Config>, worker: W, metrics: Arc<Metrics>) -> Self {
        let retry = RetryController::new(
            RetryPolicy::from_config(&config.processing.retry),
            metrics.clone(),
        );
        let rate_limiter = RateLimiter::from_secs(config.processing.delay_secs);

        Self {
            config,
            worker,
            metrics,
            retry,
            rate_limiter,
        }
    }

    pub fn worker(&self) -> &W {
        &self.worker
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Run to completion with no interrupt source.
    pub async fn run(&self) -> Result<RunSummary, CampaignError> {
        self.run_with_shutdown(std::future::pending::<()>()).await
    }

    /// Run until every unit is complete or `shutdown` resolves.
    ///
    /// On shutdown the in-flight worker future is dropped (killing the
    /// child) and its unit is left out of the progress log.
    pub async fn run_with_shutdown<F>(&self, shutdown: F) -> Result<RunSummary, CampaignError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let units = load_work_units(&self.config.input.coordinates_path)?;
        let mut progress = ProgressLog::load(&self.config.output.progress_path)?;
        let aggregator = ResultAggregator::new(&self.config.output.output_path);

        let pending = pending_units(&units, &progress);
        let total_units = units.iter().map(WorkUnit::id).collect::<HashSet<_>>().len();
        let units_skipped = units.len() - pending.len();
        for _ in 0..units_skipped {
            self.metrics.add_unit_skipped();
        }

        let mut summary = RunSummary {
            total_units,
            units_skipped,
            output_path: self.config.output.output_path.clone(),
            ..Default::default()
        };

        if pending.is_empty() {
            if units.is_empty() {
                tracing::info!(
                    "No work units in {}",
                    self.config.input.coordinates_path.display()
                );
            } else {
                tracing::info!("All coordinates already processed");
            }
            summary.rows_collected = aggregator.count_rows()?;
            return Ok(summary);
        }

        tracing::info!(
            "Processing {} pending units ({} of {} already done, checkpoints in {})",
            pending.len(),
            total_units - pending.len(),
            total_units,
            progress.path().display()
        );

        aggregator.ensure_header()?;

        let reporter = ProgressReporter::new(self.metrics.clone(), total_units);
        let done_before = total_units - pending.len();
        let last = pending.len() - 1;

        for (i, &unit) in pending.iter().enumerate() {
            let outcome = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    return Err(self.interrupted(Some(unit)));
                }
                outcome = self.retry.run(&self.worker, unit) => outcome?,
            };

            self.finish_unit(unit, outcome, &aggregator, &mut progress, &mut summary)?;
            reporter.report(unit.id(), done_before + i + 1);

            if i == last {
                break;
            }
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    return Err(self.interrupted(None));
                }
                _ = self.rate_limiter.pause() => {}
            }
        }

        summary.attempts = self.metrics.snapshot().attempts;
        summary.rows_collected = aggregator.count_rows()?;

        tracing::info!("Run complete: {}", summary);
        Ok(summary)
    }

    /// Aggregate (on success), then checkpoint.
    fn finish_unit(
        &self,
        unit: &WorkUnit,
        outcome: UnitOutcome,
        aggregator: &ResultAggregator,
        progress: &mut ProgressLog,
        summary: &mut RunSummary,
    ) -> Result<(), CampaignError> {
        match outcome {
            UnitOutcome::Success { .. } => {
                let rows = aggregator.append_artifact(self.worker.artifact_path())?;
                self.metrics.add_rows(rows as u64);
                summary.rows_appended += rows;
                tracing::debug!(
                    "{} succeeded on attempt {}: {} rows",
                    unit,
                    outcome.attempts(),
                    rows
                );
            }
            UnitOutcome::Exhausted { .. } => {
                summary.errors += 1;
                if let Some(path) = &self.config.output.failed_path {
                    append_failure(path, unit)?;
                }
            }
        }

        self.metrics.add_unit_processed(outcome.is_success());
        summary.units_processed += 1;
        progress.record_completion(unit)
    }

    fn interrupted(&self, in_flight: Option<&WorkUnit>) -> CampaignError {
        let in_flight = in_flight.map(|u| u.id().to_string());
        match &in_flight {
            Some(unit) => tracing::error!("Interrupted while processing {}; not checkpointed", unit),
            None => tracing::error!("Interrupted between units"),
        }
        CampaignError::Interrupted { in_flight }
    }
}

/// Units not yet complete, in file order, each id at most once.
fn pending_units<'a>(units: &'a [WorkUnit], progress: &ProgressLog) -> Vec<&'a WorkUnit> {
    let mut seen = HashSet::new();
    let mut pending = Vec::new();
    for unit in units {
        if !progress.contains(unit) && seen.insert(unit.id()) {
            pending.push(unit);
        }
    }
    pending
}

/// Append an exhausted unit to the failure log.
fn append_failure(path: &Path, unit: &WorkUnit) -> Result<(), CampaignError> {
    let write_err = |source| CampaignError::ProgressWrite {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    terminate_last_line(path).map_err(write_err)?;

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(write_err)?;
    file.write_all(format!("{}\n", unit.id()).as_bytes())
        .map_err(write_err)
}

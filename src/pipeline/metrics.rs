//! Run statistics and progress/ETA reporting.

use serde::{Serialize, Serializer};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Counters for the current run. Never persisted except as an optional JSON export.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Units driven to a terminal state this run
    pub units_processed: AtomicU64,

    /// Units whose worker eventually exited 0
    pub units_succeeded: AtomicU64,

    /// Units that exhausted their retries
    pub units_exhausted: AtomicU64,

    /// Units skipped as already complete (progress log or repeated line)
    pub units_skipped: AtomicU64,

    /// Worker invocations, including retries
    pub attempts: AtomicU64,

    /// Attempts that were followed by another attempt
    pub retries: AtomicU64,

    /// Data rows appended to the master output
    pub rows_appended: AtomicU64,

    /// Wall time spent inside the worker (microseconds)
    pub worker_us: AtomicU64,

    /// Start time
    start_time: Option<Instant>,
}

impl Metrics {
    /// Create new metrics; the run clock starts now.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        })
    }

    /// Record a unit that reached a terminal state.
    pub fn add_unit_processed(&self, succeeded: bool) {
        self.units_processed.fetch_add(1, Ordering::Relaxed);
        if succeeded {
            self.units_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.units_exhausted.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a unit skipped as already complete.
    pub fn add_unit_skipped(&self) {
        self.units_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a worker invocation.
    pub fn add_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a retry.
    pub fn add_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Record rows appended to the master output.
    pub fn add_rows(&self, rows: u64) {
        self.rows_appended.fetch_add(rows, Ordering::Relaxed);
    }

    /// Record time spent inside the worker.
    pub fn add_worker_time(&self, duration: Duration) {
        self.worker_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// Get elapsed time since start.
    pub fn elapsed(&self) -> Duration {
        self.start_time.map_or(Duration::ZERO, |t| t.elapsed())
    }

    pub fn units_processed(&self) -> u64 {
        self.units_processed.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.units_exhausted.load(Ordering::Relaxed)
    }

    /// Get a snapshot of current metrics.
    pub fn snapshot(&self) -> RunStats {
        let elapsed = self.elapsed();
        let units_processed = self.units_processed.load(Ordering::Relaxed);
        let units_per_minute = if elapsed.as_secs_f64() > 0.0 {
            units_processed as f64 / elapsed.as_secs_f64() * 60.0
        } else {
            0.0
        };

        RunStats {
            units_processed,
            units_succeeded: self.units_succeeded.load(Ordering::Relaxed),
            units_exhausted: self.units_exhausted.load(Ordering::Relaxed),
            units_skipped: self.units_skipped.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            rows_appended: self.rows_appended.load(Ordering::Relaxed),
            worker_secs: self.worker_us.load(Ordering::Relaxed) as f64 / 1_000_000.0,
            elapsed,
            units_per_minute,
        }
    }
}

/// Snapshot of run statistics at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct RunStats {
    pub units_processed: u64,
    pub units_succeeded: u64,
    pub units_exhausted: u64,
    pub units_skipped: u64,
    pub attempts: u64,
    pub retries: u64,
    pub rows_appended: u64,
    /// Total wall time inside the worker (seconds)
    pub worker_secs: f64,
    #[serde(serialize_with = "serialize_duration")]
    pub elapsed: Duration,
    pub units_per_minute: f64,
}

impl RunStats {
    /// Save stats to a JSON file.
    pub fn save_to_file(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!("Metrics saved to {}", path.display());
        Ok(())
    }

    /// Print a final summary.
    pub fn print_summary(&self) {
        println!("\n=== Run Summary ===");
        println!("Total time: {}", format_duration(self.elapsed));
        println!("Units processed: {}", self.units_processed);
        println!("  succeeded: {}", self.units_succeeded);
        println!("  exhausted: {}", self.units_exhausted);
        println!("Units skipped (already done): {}", self.units_skipped);
        println!("Worker attempts: {} ({} retries)", self.attempts, self.retries);
        println!("Rows appended: {}", self.rows_appended);
        println!("Worker time: {:.1}s", self.worker_secs);
        println!("Rate: {:.2} units/min", self.units_per_minute);
        println!("===================\n");
    }
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Units: {} processed ({} ok, {} exhausted), {} skipped | Attempts: {} | \
             Rows: {} | Elapsed: {:.1}s",
            self.units_processed,
            self.units_succeeded,
            self.units_exhausted,
            self.units_skipped,
            self.attempts,
            self.rows_appended,
            self.elapsed.as_secs_f64(),
        )
    }
}

/// Processing rate as shown in progress lines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Throughput {
    /// Not enough data yet (fewer than 2 units, or no time elapsed)
    Calculating,
    /// Units per second
    PerSecond(f64),
}

/// One progress line: `[done/total] unit rate ETA errors`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressReport {
    /// Completed units, including those completed by earlier runs
    pub done: usize,
    pub total: usize,
    pub unit: String,
    pub throughput: Throughput,
    pub eta: Option<Duration>,
    pub errors: u64,
}

impl std::fmt::Display for ProgressReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}/{}] {} | ", self.done, self.total, self.unit)?;
        match self.throughput {
            Throughput::Calculating => write!(f, "rate: calculating | ETA: calculating")?,
            Throughput::PerSecond(rate) => {
                write!(f, "rate: {:.2} units/min | ETA: ", rate * 60.0)?;
                match self.eta {
                    Some(eta) => write!(f, "{}", format_duration(eta))?,
                    None => write!(f, "unknown")?,
                }
            }
        }
        write!(f, " | errors: {}", self.errors)
    }
}

/// Computes throughput and ETA after each unit.
///
/// Purely observational: nothing here feeds back into control flow.
pub struct ProgressReporter {
    metrics: Arc<Metrics>,
    total_units: usize,
}

impl ProgressReporter {
    pub fn new(metrics: Arc<Metrics>, total_units: usize) -> Self {
        Self {
            metrics,
            total_units,
        }
    }

    /// Build the report from explicit inputs.
    pub fn compute(
        total: usize,
        done: usize,
        processed_this_run: u64,
        elapsed: Duration,
        unit: &str,
        errors: u64,
    ) -> ProgressReport {
        let secs = elapsed.as_secs_f64();
        let (throughput, eta) = if processed_this_run < 2 || secs <= 0.0 {
            (Throughput::Calculating, None)
        } else {
            let rate = processed_this_run as f64 / secs;
            let remaining = total.saturating_sub(done) as f64;
            let eta = (rate > 0.0).then(|| Duration::from_secs_f64(remaining / rate));
            (Throughput::PerSecond(rate), eta)
        };

        ProgressReport {
            done,
            total,
            unit: unit.to_string(),
            throughput,
            eta,
            errors,
        }
    }

    /// Report progress after `unit`; `done` counts all completed units.
    pub fn report(&self, unit: &str, done: usize) -> ProgressReport {
        let report = Self::compute(
            self.total_units,
            done,
            self.metrics.units_processed(),
            self.metrics.elapsed(),
            unit,
            self.metrics.errors(),
        );
        tracing::info!("{}", report);
        report
    }
}

/// Compact `1h 02m` / `3m 05s` / `42s` rendering.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}h {:02}m", h, m)
    } else if m > 0 {
        format!("{}m {:02}s", m, s)
    } else {
        format!("{}s", s)
    }
}

//! Worker backed by a real subprocess (container or native binary).

use async_trait::async_trait;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

use crate::config::{Config, WorkerBackend};
use crate::error::{CampaignError, ConfigError};
use crate::index::WorkUnit;
use crate::worker::{Worker, WorkerCommand, WorkerOutcome};

/// `docker run` exits with this status when the container itself could not start.
const DOCKER_RUN_FAILURE: i32 = 125;

/// Runs the configured worker as a child process, one unit at a time.
pub struct ProcessWorker {
    /// Configuration
    config: Arc<Config>,

    /// Absolute path of the query file
    query_path: PathBuf,

    /// Absolute path of the per-unit results artifact
    artifact_path: PathBuf,

    /// Worker stdout/stderr are appended here
    error_log_path: PathBuf,

    /// Orchestrator-side watchdog
    unit_timeout: Option<Duration>,

    /// Invocations so far, for unique container names
    launches: AtomicU64,
}

impl ProcessWorker {
    /// Prepare the work directory, write the query file and create an empty artifact.
    pub fn new(config: Arc<Config>) -> Result<Self, CampaignError> {
        let work_dir = &config.output.work_dir;
        let prepare_err = |e: std::io::Error| {
            ConfigError::Invalid(format!(
                "cannot prepare work directory {}: {}",
                work_dir.display(),
                e
            ))
        };

        fs::create_dir_all(work_dir).map_err(prepare_err)?;

        // Bind mounts need absolute paths, so canonicalize once the files exist
        let query_path = config.output.query_path();
        fs::write(&query_path, format!("{}\n", config.input.query.trim())).map_err(prepare_err)?;
        let query_path = fs::canonicalize(&query_path).map_err(prepare_err)?;

        let artifact_path = config.output.artifact_path();
        fs::write(&artifact_path, b"").map_err(prepare_err)?;
        let artifact_path = fs::canonicalize(&artifact_path).map_err(prepare_err)?;

        let error_log_path = config.output.error_log_path();
        if let Some(parent) = error_log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(prepare_err)?;
        }

        tracing::info!(
            "Worker: {:?} {} ({} mode), diagnostics -> {}",
            config.worker.backend,
            config.worker.reference,
            if config.worker.fast_mode { "fast" } else { "browser" },
            error_log_path.display()
        );

        Ok(Self {
            unit_timeout: config.processing.unit_timeout_secs.map(Duration::from_secs),
            config,
            query_path,
            artifact_path,
            error_log_path,
            launches: AtomicU64::new(0),
        })
    }

    /// Name for the next docker container: `gridsweep-<pid>-<n>`.
    fn next_container_name(&self) -> String {
        let n = self.launches.fetch_add(1, Ordering::Relaxed) + 1;
        format!("gridsweep-{}-{}", std::process::id(), n)
    }

    /// Open the error log for appending and mark the start of an attempt.
    fn open_error_log(&self, unit: &WorkUnit, attempt: u32, program: &str) -> Result<File, CampaignError> {
        let log_err = |e: std::io::Error| CampaignError::Invocation {
            program: program.to_string(),
            reason: format!("cannot open error log {}: {}", self.error_log_path.display(), e),
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.error_log_path)
            .map_err(log_err)?;
        writeln!(file, "--- {} attempt {} ---", unit, attempt).map_err(log_err)?;
        Ok(file)
    }
}

#[async_trait]
impl Worker for ProcessWorker {
    async fn invoke(&self, unit: &WorkUnit, attempt: u32) -> Result<WorkerOutcome, CampaignError> {
        // The docker bind mount needs the file to exist, and must not see the previous unit's rows.
        self.reset_artifact()?;

        let command = WorkerCommand::build(
            &self.config.worker,
            unit,
            &self.query_path,
            &self.artifact_path,
            &self.next_container_name(),
        );
        tracing::debug!("Running: {}", command);

        let stdout = self.open_error_log(unit, attempt, &command.program)?;
        let stderr = stdout
            .try_clone()
            .map_err(|e| CampaignError::invocation(&command.program, e))?;

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CampaignError::invocation(&command.program, e))?;

        // Armed until the client exits on its own; kills the container on timeout or drop.
        let mut container = ContainerGuard::new(&command.program, command.container.clone());

        let status = match self.unit_timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    tracing::warn!(
                        "Worker for {} exceeded {}s, killing it",
                        unit,
                        limit.as_secs()
                    );
                    if let Err(e) = child.kill().await {
                        tracing::warn!("Failed to kill worker for {}: {}", unit, e);
                    }
                    return Ok(WorkerOutcome::TimedOut);
                }
            },
            None => child.wait().await,
        }
        .map_err(|e| CampaignError::invocation(&command.program, e))?;
        container.disarm();

        if status.success() {
            return Ok(WorkerOutcome::Success);
        }

        if self.config.worker.backend == WorkerBackend::Docker
            && status.code() == Some(DOCKER_RUN_FAILURE)
        {
            return Err(CampaignError::Invocation {
                program: command.program,
                reason: format!(
                    "container {} could not be started (see {})",
                    self.config.worker.reference,
                    self.error_log_path.display()
                ),
            });
        }

        Ok(WorkerOutcome::Failure {
            code: status.code(),
        })
    }

    fn artifact_path(&self) -> &Path {
        &self.artifact_path
    }

    fn reset_artifact(&self) -> Result<(), CampaignError> {
        fs::write(&self.artifact_path, b"").map_err(|source| CampaignError::Aggregation {
            path: self.artifact_path.clone(),
            source,
        })
    }
}

/// Check that the worker can be launched at all, before any unit runs.
pub async fn preflight(config: &Config) -> Result<(), CampaignError> {
    let worker = &config.worker;
    match worker.backend {
        WorkerBackend::Binary => {
            let resolved = which::which(&worker.reference)
                .map_err(|_| ConfigError::MissingWorker(worker.reference.clone()))?;
            tracing::info!("Worker binary: {}", resolved.display());
        }
        WorkerBackend::Docker => {
            let info = Command::new(&worker.docker_program)
                .arg("info")
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await
                .map_err(|e| {
                    ConfigError::BackendUnavailable(format!("{}: {}", worker.docker_program, e))
                })?;
            if !info.success() {
                return Err(ConfigError::BackendUnavailable(format!(
                    "`{} info` failed; is the daemon running?",
                    worker.docker_program
                ))
                .into());
            }

            let image = Command::new(&worker.docker_program)
                .args(["image", "inspect", &worker.reference])
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await
                .map_err(|e| {
                    ConfigError::BackendUnavailable(format!("{}: {}", worker.docker_program, e))
                })?;
            if !image.success() {
                return Err(ConfigError::MissingWorker(worker.reference.clone()).into());
            }
            tracing::info!("Worker image: {}", worker.reference);
        }
    }
    Ok(())
}

/// Kills a named container when dropped while armed.
///
/// `kill_on_drop` only reaches the `docker` client process; the container
/// it started keeps running and keeps the artifact bind-mounted.
struct ContainerGuard {
    program: String,
    name: Option<String>,
}

impl ContainerGuard {
    fn new(program: &str, name: Option<String>) -> Self {
        Self {
            program: program.to_string(),
            name,
        }
    }

    fn disarm(&mut self) {
        self.name = None;
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        let Some(name) = self.name.take() else {
            return;
        };

        // Drop cannot await; the kill runs detached
        match std::process::Command::new(&self.program)
            .args(["kill", &name])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(_) => tracing::info!("Stopping container {}", name),
            Err(e) => tracing::warn!("Failed to stop container {}: {}", name, e),
        }
    }
}

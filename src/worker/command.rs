//! Worker argument contract.
//!
//! Every invocation gets the same base flags:
//!
//! ```text
//! -input <queries> -results <csv> -geo <lat,lng> -zoom 18 -lang en -c 1
//! ```
//!
//! followed by either the fast-mode profile (`-fast-mode -radius <m>` and a
//! short inactivity exit) or the browser profile (`-depth <n>` and a long
//! inactivity exit).
//!
//! `-geo` receives only the `lat,lng` part of a `lat,lng,radius` unit id; the
//! radius travels as `-radius` instead. Other ids are passed whole.
//!
//! Docker runs are named so an abandoned attempt's container can be killed
//! by name; killing the `docker` client alone leaves the container running.

use std::path::Path;

use crate::config::{WorkerBackend, WorkerConfig};
use crate::index::WorkUnit;

/// Map zoom level passed to every invocation.
pub const WORKER_ZOOM: u32 = 18;

/// Result language passed to every invocation.
pub const WORKER_LANGUAGE: &str = "en";

/// Worker-internal concurrency. Units are already serialized by the orchestrator.
pub const WORKER_CONCURRENCY: u32 = 1;

/// Mount points inside the container for the docker backend.
const CONTAINER_QUERY_PATH: &str = "/queries.txt";
const CONTAINER_RESULTS_PATH: &str = "/results.csv";

/// Fully resolved program and arguments for one worker run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Container name, docker backend only
    pub container: Option<String>,
}

impl WorkerCommand {
    /// Build the command for `unit`.
    ///
    /// `query_path` and `artifact_path` are host paths; for the docker
    /// backend they must be absolute since they become bind mounts.
    /// `container_name` is ignored by the binary backend.
    pub fn build(
        worker: &WorkerConfig,
        unit: &WorkUnit,
        query_path: &Path,
        artifact_path: &Path,
        container_name: &str,
    ) -> Self {
        match worker.backend {
            WorkerBackend::Binary => Self {
                program: worker.reference.clone(),
                args: worker_args(
                    worker,
                    unit,
                    &query_path.display().to_string(),
                    &artifact_path.display().to_string(),
                ),
                container: None,
            },
            WorkerBackend::Docker => {
                let mut args = vec![
                    "run".to_string(),
                    "--rm".to_string(),
                    "--name".to_string(),
                    container_name.to_string(),
                    "-v".to_string(),
                    format!("{}:{}:ro", query_path.display(), CONTAINER_QUERY_PATH),
                    "-v".to_string(),
                    format!("{}:{}", artifact_path.display(), CONTAINER_RESULTS_PATH),
                    worker.reference.clone(),
                ];
                args.extend(worker_args(
                    worker,
                    unit,
                    CONTAINER_QUERY_PATH,
                    CONTAINER_RESULTS_PATH,
                ));
                Self {
                    program: worker.docker_program.clone(),
                    args,
                    container: Some(container_name.to_string()),
                }
            }
        }
    }
}

impl std::fmt::Display for WorkerCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

fn worker_args(worker: &WorkerConfig, unit: &WorkUnit, input: &str, results: &str) -> Vec<String> {
    let mut args = vec![
        "-input".to_string(),
        input.to_string(),
        "-results".to_string(),
        results.to_string(),
        "-geo".to_string(),
        unit.geo_target().to_string(),
        "-zoom".to_string(),
        WORKER_ZOOM.to_string(),
        "-lang".to_string(),
        WORKER_LANGUAGE.to_string(),
        "-c".to_string(),
        WORKER_CONCURRENCY.to_string(),
    ];

    if worker.fast_mode {
        let radius = unit.radius_override().unwrap_or(worker.radius_meters);
        args.extend([
            "-fast-mode".to_string(),
            "-radius".to_string(),
            radius.to_string(),
            "-exit-on-inactivity".to_string(),
            worker.fast_inactivity_timeout.clone(),
        ]);
    } else {
        args.extend([
            "-depth".to_string(),
            worker.depth.to_string(),
            "-exit-on-inactivity".to_string(),
            worker.browser_inactivity_timeout.clone(),
        ]);
    }

    args
}

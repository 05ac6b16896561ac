//! External worker invocation.
//!
//! The orchestrator and retry controller only see the [`Worker`] trait, so
//! they can be driven by a scripted fake in tests.

mod command;
mod process;

#[cfg(test)]
pub(crate) mod fake;

pub use command::{WorkerCommand, WORKER_CONCURRENCY, WORKER_LANGUAGE, WORKER_ZOOM};
pub use process::{preflight, ProcessWorker};

use async_trait::async_trait;
use std::path::Path;

use crate::error::CampaignError;
use crate::index::WorkUnit;

/// Outcome of a worker process that did start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// Exit status zero
    Success,
    /// Nonzero exit, or killed by a signal (`code` is `None`)
    Failure { code: Option<i32> },
    /// Killed by the orchestrator-side watchdog
    TimedOut,
}

impl WorkerOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, WorkerOutcome::Success)
    }
}

impl std::fmt::Display for WorkerOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerOutcome::Success => write!(f, "success"),
            WorkerOutcome::Failure { code: Some(code) } => write!(f, "exit status {}", code),
            WorkerOutcome::Failure { code: None } => write!(f, "terminated by signal"),
            WorkerOutcome::TimedOut => write!(f, "timed out"),
        }
    }
}

/// Capability to run the external worker for one unit.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Run the worker once for `unit`; `attempt` starts at 1.
    ///
    /// Returns `Err` only when the process could not be started at all.
    async fn invoke(&self, unit: &WorkUnit, attempt: u32) -> Result<WorkerOutcome, CampaignError>;

    /// Where a successful run leaves its CSV.
    fn artifact_path(&self) -> &Path;

    /// Truncate the artifact so a stale result is never aggregated.
    fn reset_artifact(&self) -> Result<(), CampaignError>;
}

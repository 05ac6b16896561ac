//! Error taxonomy for a campaign run.
//!
//! Only the variants here abort a run. A worker that starts but exits
//! nonzero is not an error at this level; the retry controller absorbs it.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Problems detected before the unit loop starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("coordinates file not found: {}", .0.display())]
    MissingInput(PathBuf),
    #[error("worker `{0}` not found")]
    MissingWorker(String),
    #[error("worker backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Fatal errors of a campaign run.
#[derive(Debug, Error)]
pub enum CampaignError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The worker process could not be started at all.
    #[error("failed to launch worker `{program}`: {reason}")]
    Invocation { program: String, reason: String },

    #[error("result aggregation failed at {}: {source}", .path.display())]
    Aggregation {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read progress log {}: {source}", .path.display())]
    ProgressRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write progress log {}: {source}", .path.display())]
    ProgressWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Operator interrupt. `in_flight` names the unit whose checkpoint was not written.
    #[error("interrupted{}", in_flight_suffix(.in_flight))]
    Interrupted { in_flight: Option<String> },
}

fn in_flight_suffix(in_flight: &Option<String>) -> String {
    match in_flight {
        Some(unit) => format!(" while processing {}", unit),
        None => String::new(),
    }
}

impl CampaignError {
    /// Build an invocation error from a spawn failure.
    pub fn invocation(program: impl Into<String>, source: io::Error) -> Self {
        Self::Invocation {
            program: program.into(),
            reason: source.to_string(),
        }
    }

    /// Process exit status `main` should use for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CampaignError::Interrupted { .. } => 130,
            _ => 1,
        }
    }
}

//! Scripted in-process worker for tests.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::CampaignError;
use crate::index::WorkUnit;
use crate::worker::{Worker, WorkerOutcome};

/// What one scripted invocation does.
#[derive(Debug, Clone)]
pub(crate) enum FakeRun {
    /// Exit 0 after writing this CSV text to the artifact
    Succeed(String),
    /// Exit nonzero after leaving partial output behind
    Fail,
    /// Killed by the watchdog
    TimeOut,
    /// Process could not be started
    LaunchError,
}

impl FakeRun {
    /// Header plus `rows` data rows tagged with the unit id.
    pub(crate) fn rows(unit: &str, rows: usize) -> Self {
        let mut csv = String::from("input_id,title\n");
        for i in 0..rows {
            csv.push_str(&format!("\"{}\",place-{}\n", unit, i));
        }
        FakeRun::Succeed(csv)
    }
}

/// Worker whose outcomes are scripted per unit id.
///
/// Units without a script (or whose script ran out) get one data row.
pub(crate) struct ScriptedWorker {
    artifact: PathBuf,
    scripts: Mutex<HashMap<String, VecDeque<FakeRun>>>,
    calls: Mutex<Vec<(String, u32)>>,
}

impl ScriptedWorker {
    pub(crate) fn new(artifact: impl Into<PathBuf>) -> Self {
        Self {
            artifact: artifact.into(),
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Script the successive invocations for `unit`.
    pub(crate) fn on(self, unit: &str, runs: impl IntoIterator<Item = FakeRun>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(unit.to_string(), runs.into_iter().collect());
        self
    }

    /// Every `(unit, attempt)` seen so far, in order.
    pub(crate) fn calls(&self) -> Vec<(String, u32)> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn invocations(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Worker for ScriptedWorker {
    async fn invoke(&self, unit: &WorkUnit, attempt: u32) -> Result<WorkerOutcome, CampaignError> {
        self.calls
            .lock()
            .unwrap()
            .push((unit.id().to_string(), attempt));

        let run = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(unit.id())
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| FakeRun::rows(unit.id(), 1));

        match run {
            FakeRun::Succeed(csv) => {
                fs::write(&self.artifact, csv).unwrap();
                Ok(WorkerOutcome::Success)
            }
            FakeRun::Fail => {
                fs::write(&self.artifact, "input_id,title\npartial,row\n").unwrap();
                Ok(WorkerOutcome::Failure { code: Some(1) })
            }
            FakeRun::TimeOut => Ok(WorkerOutcome::TimedOut),
            FakeRun::LaunchError => Err(CampaignError::Invocation {
                program: "fake-worker".to_string(),
                reason: "image not found".to_string(),
            }),
        }
    }

    fn artifact_path(&self) -> &Path {
        &self.artifact
    }

    fn reset_artifact(&self) -> Result<(), CampaignError> {
        fs::write(&self.artifact, b"").map_err(|source| CampaignError::Aggregation {
            path: self.artifact.clone(),
            source,
        })
    }
}

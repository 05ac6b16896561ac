//! Bounded retry with fixed backoff, as a small state machine.
//!
//! ```text
//! Attempt(1) --fail--> Attempt(2) --fail--> ... Attempt(max) --fail--> Done(Exhausted)
//!     |                    |                         |
//!  success              success                   success
//!     v                    v                         v
//! Done(Success)       Done(Success)             Done(Success)
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::RetryConfig;
use crate::error::CampaignError;
use crate::index::WorkUnit;
use crate::pipeline::Metrics;
use crate::worker::Worker;

/// Terminal result of driving one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOutcome {
    /// The worker exited 0 on attempt `attempts`
    Success { attempts: u32 },
    /// Every attempt failed
    Exhausted { attempts: u32 },
}

impl UnitOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, UnitOutcome::Success { .. })
    }

    pub fn attempts(&self) -> u32 {
        match *self {
            UnitOutcome::Success { attempts } | UnitOutcome::Exhausted { attempts } => attempts,
        }
    }
}

/// Position of a unit in the retry state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// About to run attempt `n` (1-based)
    Attempt(u32),
    Done(UnitOutcome),
}

/// Retry limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per unit, including the first
    pub max_attempts: u32,

    /// Pause between attempts
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            backoff: Duration::from_secs(config.backoff_secs),
        }
    }

    pub fn start(&self) -> RetryState {
        RetryState::Attempt(1)
    }

    /// Transition after an attempt finished with `succeeded`.
    ///
    /// `Done` states are absorbing.
    pub fn next(&self, state: RetryState, succeeded: bool) -> RetryState {
        match state {
            RetryState::Done(outcome) => RetryState::Done(outcome),
            RetryState::Attempt(n) if succeeded => {
                RetryState::Done(UnitOutcome::Success { attempts: n })
            }
            RetryState::Attempt(n) if n < self.max_attempts => RetryState::Attempt(n + 1),
            RetryState::Attempt(n) => RetryState::Done(UnitOutcome::Exhausted { attempts: n }),
        }
    }
}

/// Drives a [`Worker`] through the retry state machine for one unit.
pub struct RetryController {
    policy: RetryPolicy,
    metrics: Arc<Metrics>,
}

impl RetryController {
    pub fn new(policy: RetryPolicy, metrics: Arc<Metrics>) -> Self {
        Self { policy, metrics }
    }

    /// Run `unit` until success or exhaustion.
    ///
    /// A failed attempt is never an error here; only a worker that cannot
    /// be launched (or an artifact that cannot be reset) aborts.
    pub async fn run<W: Worker + ?Sized>(
        &self,
        worker: &W,
        unit: &WorkUnit,
    ) -> Result<UnitOutcome, CampaignError> {
        let mut state = self.policy.start();

        loop {
            let attempt = match state {
                RetryState::Done(outcome) => return Ok(outcome),
                RetryState::Attempt(n) => n,
            };

            self.metrics.add_attempt();
            let started = Instant::now();
            let outcome = worker.invoke(unit, attempt).await?;
            self.metrics.add_worker_time(started.elapsed());

            state = self.policy.next(state, outcome.is_success());

            match state {
                RetryState::Attempt(_) => {
                    tracing::warn!(
                        "{} attempt {}/{} failed ({}), retrying in {}s",
                        unit,
                        attempt,
                        self.policy.max_attempts,
                        outcome,
                        self.policy.backoff.as_secs()
                    );
                    worker.reset_artifact()?;
                    self.metrics.add_retry();
                    tokio::time::sleep(self.policy.backoff).await;
                }
                RetryState::Done(UnitOutcome::Exhausted { attempts }) => {
                    tracing::warn!(
                        "{} failed after {} attempts ({}), marking done",
                        unit,
                        attempts,
                        outcome
                    );
                }
                RetryState::Done(UnitOutcome::Success { .. }) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::fake::{FakeRun, ScriptedWorker};
    use tempfile::TempDir;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff: Duration::from_secs(2),
        }
    }

    fn unit(id: &str) -> WorkUnit {
        WorkUnit::parse(id).unwrap()
    }

    #[test]
    fn test_transitions() {
        let p = policy(3);
        let s = p.start();
        assert_eq!(s, RetryState::Attempt(1));

        assert_eq!(
            p.next(s, true),
            RetryState::Done(UnitOutcome::Success { attempts: 1 })
        );

        let s = p.next(s, false);
        assert_eq!(s, RetryState::Attempt(2));
        let s = p.next(s, false);
        assert_eq!(s, RetryState::Attempt(3));
        let s = p.next(s, false);
        assert_eq!(s, RetryState::Done(UnitOutcome::Exhausted { attempts: 3 }));

        // Done is absorbing
        assert_eq!(p.next(s, true), s);
    }

    #[test]
    fn test_single_attempt_policy() {
        let p = policy(1);
        assert_eq!(
            p.next(p.start(), false),
            RetryState::Done(UnitOutcome::Exhausted { attempts: 1 })
        );
    }

    #[test]
    fn test_policy_from_config() {
        let p = RetryPolicy::from_config(&RetryConfig::default());
        assert_eq!(p.max_attempts, 3);
        assert_eq!(p.backoff, Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_failures() {
        let dir = TempDir::new().unwrap();
        let worker = ScriptedWorker::new(dir.path().join("artifact.csv")).on(
            "a",
            [FakeRun::Fail, FakeRun::TimeOut, FakeRun::rows("a", 2)],
        );
        let metrics = Metrics::new();
        let controller = RetryController::new(policy(3), metrics.clone());

        let started = tokio::time::Instant::now();
        let outcome = controller.run(&worker, &unit("a")).await.unwrap();

        assert_eq!(outcome, UnitOutcome::Success { attempts: 3 });
        assert_eq!(
            worker.calls(),
            vec![("a".to_string(), 1), ("a".to_string(), 2), ("a".to_string(), 3)]
        );
        // Two backoffs of 2s each
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(4) && waited < Duration::from_secs(5));

        let stats = metrics.snapshot();
        assert_eq!(stats.attempts, 3);
        assert_eq!(stats.retries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_after_max_attempts() {
        let dir = TempDir::new().unwrap();
        let worker = ScriptedWorker::new(dir.path().join("artifact.csv"))
            .on("a", [FakeRun::Fail, FakeRun::Fail, FakeRun::Fail, FakeRun::rows("a", 1)]);
        let controller = RetryController::new(policy(3), Metrics::new());

        let outcome = controller.run(&worker, &unit("a")).await.unwrap();

        assert_eq!(outcome, UnitOutcome::Exhausted { attempts: 3 });
        assert!(!outcome.is_success());
        assert_eq!(outcome.attempts(), 3);
        assert_eq!(worker.invocations(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_artifact_reset_between_attempts() {
        let dir = TempDir::new().unwrap();
        let artifact = dir.path().join("artifact.csv");
        let worker = ScriptedWorker::new(&artifact).on("a", [FakeRun::Fail, FakeRun::TimeOut]);
        let controller = RetryController::new(policy(2), Metrics::new());

        // First failure leaves partial rows; the reset before attempt 2 clears them,
        // and the timed-out attempt 2 writes nothing.
        let outcome = controller.run(&worker, &unit("a")).await.unwrap();
        assert_eq!(outcome, UnitOutcome::Exhausted { attempts: 2 });
        assert_eq!(std::fs::read_to_string(&artifact).unwrap(), "");
    }

    #[tokio::test]
    async fn test_launch_error_is_not_retried() {
        let dir = TempDir::new().unwrap();
        let worker = ScriptedWorker::new(dir.path().join("artifact.csv"))
            .on("a", [FakeRun::LaunchError, FakeRun::rows("a", 1)]);
        let controller = RetryController::new(policy(3), Metrics::new());

        let err = controller.run(&worker, &unit("a")).await.unwrap_err();
        assert!(matches!(err, CampaignError::Invocation { .. }));
        assert_eq!(worker.invocations(), 1);
    }
}

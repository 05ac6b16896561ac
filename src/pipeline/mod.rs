//! Campaign loop: retry, rate limiting, progress reporting and metrics.

mod metrics;
mod orchestrator;
mod rate_limit;
mod retry;


pub use metrics::{format_duration, Metrics, ProgressReport, ProgressReporter, RunStats, Throughput};
pub use orchestrator::{Orchestrator, RunSummary};
pub use rate_limit::RateLimiter;
pub use retry::{RetryController, RetryPolicy, RetryState, UnitOutcome};

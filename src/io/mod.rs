//! Durable campaign files: the progress log and the master CSV output.

mod csv_output;
mod progress_log;

pub use csv_output::{ResultAggregator, OUTPUT_HEADER};
pub use progress_log::ProgressLog;
pub(crate) use progress_log::terminate_last_line;

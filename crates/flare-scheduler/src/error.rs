//! Error types for the scheduler crate.

use thiserror::Error;
use tokio_cron_scheduler::JobSchedulerError;

/// Errors from scheduler setup and lifecycle.
///
/// Per-request execution failures are [`flare_search::IndexError`]s and are
/// recorded on the request instead.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The cron runtime behind the commit job failed
    #[error("Commit scheduler error: {0}")]
    Scheduler(String),

    #[error("Invalid cron expression: {0}")]
    InvalidCron(String),

    /// Neither an IANA zone nor a fixed UTC offset
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    /// Invalid coalescer or throttle configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// start() on a worker pool or commit scheduler that is running
    #[error("Already running")]
    AlreadyRunning,

    #[error("Not running")]
    NotRunning,
}

impl From<JobSchedulerError> for SchedulerError {
    fn from(err: JobSchedulerError) -> Self {
        SchedulerError::Scheduler(err.to_string())
    }
}

//! Cron-driven `commit_if_dirty`.
//!
//! Runs alongside the coalescer's every-K forced commit. A tick that fires
//! while the previous commit is still in flight is skipped.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono_tz::Tz;
use flare_search::Session;
use serde::Serialize;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, info, warn};

use crate::SchedulerError;

/// Check that `expr` is a valid 6-field cron expression
/// (second minute hour day-of-month month day-of-week).
///
/// ```
/// use flare_scheduler::validate_cron_expression;
///
/// assert!(validate_cron_expression("0 */5 * * * *").is_ok());
/// assert!(validate_cron_expression("every five minutes").is_err());
/// ```
pub fn validate_cron_expression(expr: &str) -> Result<(), SchedulerError> {
    match Job::new_async(expr, |_uuid, _lock| Box::pin(async {})) {
        Ok(_) => Ok(()),
        Err(e) => Err(SchedulerError::InvalidCron(format!("'{}': {}", expr, e))),
    }
}

pub fn parse_timezone(tz: &str) -> Result<Tz, SchedulerError> {
    tz.parse()
        .map_err(|_| SchedulerError::InvalidTimezone(tz.to_string()))
}

/// Counters of the commit job.
#[derive(Debug, Default)]
pub struct CommitJobState {
    running: AtomicBool,
    runs: AtomicU64,
    commits: AtomicU64,
    skipped: AtomicU64,
    failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CommitJobStats {
    /// Ticks that checked the session
    pub runs: u64,
    /// Ticks that issued a commit
    pub commits: u64,
    /// Ticks dropped because the previous one was still running
    pub skipped: u64,
    pub failures: u64,
}

impl CommitJobState {
    pub fn stats(&self) -> CommitJobStats {
        CommitJobStats {
            runs: self.runs.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    fn try_start(&self) -> Option<RunGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| RunGuard { flag: &self.running })
    }
}

/// Clears the running flag when the tick ends, even on panic.
struct RunGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// One commit tick: commit the session if it is dirty.
pub async fn run_commit_tick(session: &Session, state: &CommitJobState, soft: bool) {
    let Some(_guard) = state.try_start() else {
        state.skipped.fetch_add(1, Ordering::Relaxed);
        debug!("Previous commit still running; skipping tick");
        return;
    };
    state.runs.fetch_add(1, Ordering::Relaxed);

    match session.commit_if_dirty(soft).await {
        Ok(true) => {
            state.commits.fetch_add(1, Ordering::Relaxed);
            debug!(soft, "Scheduled commit");
        }
        Ok(false) => {}
        Err(e) => {
            state.failures.fetch_add(1, Ordering::Relaxed);
            warn!(error = %e, "Scheduled commit failed");
        }
    }
}

/// Owns the cron scheduler running the commit job.
pub struct CommitScheduler {
    scheduler: JobScheduler,
    state: Arc<CommitJobState>,
    is_running: AtomicBool,
}

impl CommitScheduler {
    pub async fn new() -> Result<Self, SchedulerError> {
        Ok(Self {
            scheduler: JobScheduler::new().await?,
            state: Arc::new(CommitJobState::default()),
            is_running: AtomicBool::new(false),
        })
    }

    /// Register `commit_if_dirty(soft)` on `cron` in `timezone`.
    pub async fn add_commit_job(
        &self,
        session: Arc<Session>,
        cron: &str,
        timezone: &str,
        soft: bool,
    ) -> Result<uuid::Uuid, SchedulerError> {
        let tz = parse_timezone(timezone)?;
        validate_cron_expression(cron)?;

        let state = self.state.clone();
        let job = Job::new_async_tz(cron, tz, move |_uuid, _lock| {
            let session = session.clone();
            let state = state.clone();
            Box::pin(async move {
                run_commit_tick(&session, &state, soft).await;
            })
        })
        .map_err(|e| SchedulerError::InvalidCron(e.to_string()))?;

        let uuid = self.scheduler.add(job).await?;
        info!(uuid = %uuid, cron, timezone = %tz.name(), soft, "Commit job registered");
        Ok(uuid)
    }

    pub async fn start(&self) -> Result<(), SchedulerError> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }
        self.scheduler.start().await?;
        info!("Commit scheduler started");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), SchedulerError> {
        if !self.is_running.swap(false, Ordering::SeqCst) {
            return Err(SchedulerError::NotRunning);
        }
        if let Err(e) = self.scheduler.shutdown().await {
            warn!("Error during commit scheduler shutdown: {}", e);
        }
        info!("Commit scheduler stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> CommitJobStats {
        self.state.stats()
    }
}

//! Coalescer configuration.

use std::time::Duration;

use flare_types::IndexerSettings;
use serde::{Deserialize, Serialize};

use crate::SchedulerError;

/// Runtime settings of a [`crate::Coalescer`] and its worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoalescerConfig {
    /// Lane (dedupe scope) requests are queued in
    pub lane: String,

    /// Worker tasks pulling from the lane
    pub workers: usize,

    /// Completed executions between forced hard commits
    pub commit_every: u64,

    /// Idle wait between polls when no request is pending
    pub poll_interval: Duration,
}

impl Default for CoalescerConfig {
    fn default() -> Self {
        Self::from_settings(&IndexerSettings::default())
    }
}

impl CoalescerConfig {
    pub fn from_settings(settings: &IndexerSettings) -> Self {
        Self {
            lane: settings.lane.clone(),
            workers: settings.workers,
            commit_every: settings.commit_every,
            poll_interval: Duration::from_millis(settings.poll_interval_ms),
        }
    }

    pub fn with_lane(mut self, lane: impl Into<String>) -> Self {
        self.lane = lane.into();
        self
    }

    pub fn with_commit_every(mut self, commit_every: u64) -> Self {
        self.commit_every = commit_every;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.lane.trim().is_empty() {
            return Err(SchedulerError::Config("lane must not be empty".to_string()));
        }
        if self.workers == 0 {
            return Err(SchedulerError::Config("workers must be at least 1".to_string()));
        }
        if self.commit_every == 0 {
            return Err(SchedulerError::Config(
                "commit_every must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

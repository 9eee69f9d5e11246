//! Indexing coalescer for flare.
//!
//! Index requests are queued per subject in a named lane. Repeated requests
//! for a subject collapse into its one pending request at the most urgent
//! priority asked for; a pool of workers claims and executes them against a
//! [`flare_search::Session`].
//!
//! - [`JobStore`] / [`MemoryJobStore`]: atomic find-or-create and claim
//! - [`Coalescer`]: enqueue, claim-and-execute, forced periodic commits
//! - [`Throttle`]: business-hours spacing of executions
//! - [`WorkerPool`]: tokio tasks draining the lane
//! - [`CommitScheduler`]: cron-driven `commit_if_dirty`
//!
//! # Example
//!
//! ```ignore
//! let coalescer = Arc::new(
//!     Coalescer::new(store, session, source, CoalescerConfig::default())?
//!         .with_throttle(Arc::new(Throttle::from_settings(&throttle_settings)?)),
//! );
//! coalescer.enqueue(Subject::new("Article", "42"), Priority::MEDIUM).await?;
//!
//! let mut pool = WorkerPool::new(coalescer.clone());
//! pool.start()?;
//! ```

mod coalescer;
mod commit_job;
mod config;
mod error;
mod source;
mod stats;
mod store;
mod throttle;
mod worker;

pub use coalescer::{Coalescer, ExecutionOutcome};
pub use commit_job::{
    parse_timezone, run_commit_tick, validate_cron_expression, CommitJobState, CommitJobStats,
    CommitScheduler,
};
pub use config::CoalescerConfig;
pub use error::SchedulerError;
pub use source::RecordSource;
pub use stats::{CoalescerMetrics, CoalescerStats};
pub use store::{EnqueueOutcome, JobStore, MemoryJobStore};
pub use throttle::{
    Clock, FixedClock, SystemClock, Throttle, ThrottleStatus, ThrottleWindow, WindowZone,
};
pub use worker::WorkerPool;

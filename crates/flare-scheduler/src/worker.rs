//! Worker pool draining a coalescer lane.

use std::sync::Arc;

use flare_search::IndexError;
use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::coalescer::Coalescer;
use crate::SchedulerError;

/// Fixed set of tasks, each executing one request at a time.
///
/// Shutdown is cooperative: a worker finishes its in-flight execution and
/// then exits.
pub struct WorkerPool {
    coalescer: Arc<Coalescer>,
    shutdown_token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(coalescer: Arc<Coalescer>) -> Self {
        Self {
            coalescer,
            shutdown_token: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    /// Spawn `config.workers` worker tasks.
    pub fn start(&mut self) -> Result<(), SchedulerError> {
        if !self.handles.is_empty() {
            return Err(SchedulerError::AlreadyRunning);
        }
        let workers = self.coalescer.config().workers;
        for worker in 0..workers {
            let coalescer = self.coalescer.clone();
            let token = self.shutdown_token.clone();
            self.handles
                .push(tokio::spawn(run_worker(worker, coalescer, token)));
        }
        info!(workers, lane = %self.coalescer.lane(), "Worker pool started");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        !self.handles.is_empty()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Signal every worker to stop and wait for them to exit.
    pub async fn shutdown(&mut self) -> Result<(), SchedulerError> {
        if self.handles.is_empty() {
            return Err(SchedulerError::NotRunning);
        }
        info!("Stopping worker pool");
        self.shutdown_token.cancel();
        self.coalescer.wake_all();

        for result in join_all(self.handles.drain(..)).await {
            if let Err(e) = result {
                warn!(error = %e, "Worker task ended abnormally");
            }
        }
        self.shutdown_token = CancellationToken::new();
        info!("Worker pool stopped");
        Ok(())
    }
}

async fn run_worker(worker: usize, coalescer: Arc<Coalescer>, token: CancellationToken) {
    let poll_interval = coalescer.config().poll_interval;
    debug!(worker, "Worker started");

    while !token.is_cancelled() {
        match coalescer.run_next().await {
            Ok(Some(_)) => continue,
            // Recorded on the request by the coalescer.
            Err(e) if !matches!(e, IndexError::Store(_)) => continue,
            Err(e) => warn!(worker, error = %e, "Job store error"),
            Ok(None) => {}
        }

        tokio::select! {
            _ = token.cancelled() => break,
            _ = coalescer.wait_for_work() => {}
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }

    debug!(worker, "Worker stopped");
}

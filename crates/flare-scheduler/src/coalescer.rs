//! Indexing coalescer.
//!
//! Accepts "index this subject at priority P" requests, folds repeated
//! requests for a subject into its single pending request, and executes
//! claimed requests against the search session. Every `commit_every`
//! completed executions a hard commit is forced.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use flare_search::{IndexError, Session, TypeIndex};
use flare_types::{Indexable, IndexRequest, Priority, Subject};
use tokio::sync::Notify;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::config::CoalescerConfig;
use crate::source::RecordSource;
use crate::stats::{CoalescerMetrics, CoalescerStats};
use crate::store::{EnqueueOutcome, JobStore};
use crate::throttle::Throttle;
use crate::SchedulerError;

/// What a claimed execution did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// The record was rendered and sent
    Indexed { uid: String },
    /// The record no longer exists; its document was removed
    Removed { uid: String },
    /// Another worker owned the request
    Skipped,
}

/// The indexing coalescer for one lane.
pub struct Coalescer {
    store: Arc<dyn JobStore>,
    session: Arc<Session>,
    source: Arc<dyn RecordSource>,
    throttle: Option<Arc<Throttle>>,
    config: CoalescerConfig,
    // Process-local; each process forces its own commits.
    completions: AtomicU64,
    metrics: CoalescerMetrics,
    work_available: Notify,
}

impl Coalescer {
    pub fn new(
        store: Arc<dyn JobStore>,
        session: Arc<Session>,
        source: Arc<dyn RecordSource>,
        config: CoalescerConfig,
    ) -> Result<Self, SchedulerError> {
        config.validate()?;
        Ok(Self {
            store,
            session,
            source,
            throttle: None,
            config,
            completions: AtomicU64::new(0),
            metrics: CoalescerMetrics::new(),
            work_available: Notify::new(),
        })
    }

    pub fn with_throttle(mut self, throttle: Arc<Throttle>) -> Self {
        self.throttle = Some(throttle);
        self
    }

    pub fn config(&self) -> &CoalescerConfig {
        &self.config
    }

    pub fn lane(&self) -> &str {
        &self.config.lane
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn throttle(&self) -> Option<&Arc<Throttle>> {
        self.throttle.as_ref()
    }

    pub fn stats(&self) -> CoalescerStats {
        self.metrics.snapshot()
    }

    /// Request that `subject` be (re)indexed.
    ///
    /// Never contacts the backend; execution happens later on a worker.
    pub async fn enqueue(
        &self,
        subject: Subject,
        priority: Priority,
    ) -> Result<IndexRequest, IndexError> {
        let outcome = self
            .store
            .find_or_create_pending(&self.config.lane, &subject, priority)
            .await?;

        match &outcome {
            EnqueueOutcome::Created(request) => {
                self.metrics.record_created();
                debug!(subject = %subject, priority = %priority, lane = %self.config.lane, id = %request.id, "Enqueued");
                self.work_available.notify_one();
            }
            EnqueueOutcome::Merged { request, raised } => {
                self.metrics.record_merged(*raised);
                debug!(
                    subject = %subject,
                    priority = %request.priority,
                    raised = *raised,
                    lane = %self.config.lane,
                    "Merged into pending request"
                );
            }
        }
        Ok(outcome.into_request())
    }

    pub async fn enqueue_record(
        &self,
        record: &dyn Indexable,
        priority: Priority,
    ) -> Result<IndexRequest, IndexError> {
        self.enqueue(record.subject(), priority).await
    }

    /// True when a request for `subject` is waiting to be claimed.
    pub async fn is_pending(&self, subject: &Subject) -> Result<bool, IndexError> {
        Ok(self
            .store
            .requests_for(&self.config.lane, subject)
            .await?
            .iter()
            .any(IndexRequest::is_pending))
    }

    pub async fn requests_for(&self, subject: &Subject) -> Result<Vec<IndexRequest>, IndexError> {
        self.store.requests_for(&self.config.lane, subject).await
    }

    /// Claim the next pending request of the lane and execute it.
    ///
    /// Returns `Ok(None)` when the lane is empty.
    pub async fn run_next(&self) -> Result<Option<ExecutionOutcome>, IndexError> {
        match self.store.next_pending(&self.config.lane).await? {
            Some(request) => self.claim_and_execute(request.id).await.map(Some),
            None => Ok(None),
        }
    }

    /// Execute pending requests until the lane is empty. Failed executions
    /// are recorded on their requests and do not stop the drain.
    ///
    /// Returns the number of requests that completed.
    pub async fn drain(&self) -> Result<u64, IndexError> {
        let mut completed = 0;
        loop {
            match self.run_next().await {
                Ok(Some(ExecutionOutcome::Skipped)) => {}
                Ok(Some(_)) => completed += 1,
                Ok(None) => return Ok(completed),
                Err(IndexError::Store(msg)) => return Err(IndexError::Store(msg)),
                Err(_) => {}
            }
        }
    }

    /// Claim a request and execute it.
    ///
    /// A lost claim is not an error. Any other failure marks the request
    /// Failed and is returned for the job store's retry policy.
    pub async fn claim_and_execute(&self, id: Ulid) -> Result<ExecutionOutcome, IndexError> {
        let request = match self.store.claim(id).await {
            Ok(request) => request,
            Err(IndexError::ClaimConflict(_)) => {
                debug!(id = %id, "Request already claimed; skipping");
                self.metrics.record_skipped_claim();
                return Ok(ExecutionOutcome::Skipped);
            }
            Err(e) => return Err(e),
        };

        if let Some(throttle) = &self.throttle {
            throttle.maybe_wait().await;
        }

        match self.execute(&request.subject).await {
            Ok(outcome) => {
                self.store.finish(request.id, Ok(())).await?;
                match &outcome {
                    ExecutionOutcome::Indexed { .. } => self.metrics.record_indexed(),
                    ExecutionOutcome::Removed { .. } => self.metrics.record_removed(),
                    ExecutionOutcome::Skipped => {}
                }
                self.record_completion().await;
                Ok(outcome)
            }
            Err(e) => {
                warn!(subject = %request.subject, id = %request.id, error = %e, "Index request failed");
                self.metrics.record_failed();
                if let Err(finish_err) = self.store.finish(request.id, Err(e.to_string())).await {
                    warn!(id = %request.id, error = %finish_err, "Could not mark request failed");
                }
                Err(e)
            }
        }
    }

    async fn execute(&self, subject: &Subject) -> Result<ExecutionOutcome, IndexError> {
        match self.source.load(subject).await? {
            Some(record) => {
                let uid = self.session.index_record(record.as_ref()).await?;
                Ok(ExecutionOutcome::Indexed { uid })
            }
            None => {
                let index = TypeIndex::new(self.session.clone(), &subject.type_name);
                index.remove(std::slice::from_ref(&subject.id)).await?;
                let uid = index.uid(&subject.id);
                info!(subject = %subject, uid = %uid, "Record gone; removed from index");
                Ok(ExecutionOutcome::Removed { uid })
            }
        }
    }

    async fn record_completion(&self) {
        let completed = self.completions.fetch_add(1, Ordering::AcqRel) + 1;
        if completed % self.config.commit_every != 0 {
            return;
        }
        match self.session.commit(false).await {
            Ok(()) => {
                info!(completed, "Forced commit");
                self.metrics.record_forced_commit(true);
            }
            Err(e) => {
                warn!(completed, error = %e, "Forced commit failed");
                self.metrics.record_forced_commit(false);
            }
        }
    }

    pub(crate) async fn wait_for_work(&self) {
        self.work_available.notified().await;
    }

    pub(crate) fn wake_all(&self) {
        self.work_available.notify_waiters();
    }

    // --- operator commands ---

    pub async fn commit(&self, soft: bool) -> Result<(), IndexError> {
        self.session.commit(soft).await
    }

    pub async fn commit_if_dirty(&self, soft: bool) -> Result<bool, IndexError> {
        self.session.commit_if_dirty(soft).await
    }

    pub fn dirty(&self) -> bool {
        self.session.dirty()
    }

    /// Remove documents of a type by record id, without committing.
    pub async fn remove<S: AsRef<str>>(&self, type_name: &str, ids: &[S]) -> Result<(), IndexError> {
        TypeIndex::new(self.session.clone(), type_name).remove(ids).await
    }

    /// Remove documents of a type matching a query, without committing.
    pub async fn remove_by(&self, type_name: &str, query: &str) -> Result<(), IndexError> {
        TypeIndex::new(self.session.clone(), type_name)
            .remove_by(&[query])
            .await
    }

    /// Delete a pending request before it is claimed.
    pub async fn cancel(&self, id: Ulid) -> Result<bool, IndexError> {
        self.store.cancel(id).await
    }
}

impl std::fmt::Debug for Coalescer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coalescer")
            .field("lane", &self.config.lane)
            .field("commit_every", &self.config.commit_every)
            .field("throttled", &self.throttle.is_some())
            .field("stats", &self.metrics.snapshot())
            .finish()
    }
}

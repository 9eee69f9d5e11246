//! Job store.
//!
//! The store owns [`IndexRequest`] rows. It is the single source of truth for
//! the two atomic primitives the coalescer depends on: find-or-create of the
//! pending request for a (lane, subject) key, and the Pending -> Executing
//! claim.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use flare_search::IndexError;
use flare_types::{IndexRequest, Priority, RequestKey, RequestState, Subject};
use tracing::debug;
use ulid::Ulid;

/// Result of [`JobStore::find_or_create_pending`].
#[derive(Debug, Clone, PartialEq)]
pub enum EnqueueOutcome {
    /// No pending request existed; this one was created.
    Created(IndexRequest),
    /// An existing pending request absorbed the enqueue. `raised` is true when
    /// its priority was lowered to the more urgent value.
    Merged { request: IndexRequest, raised: bool },
}

impl EnqueueOutcome {
    pub fn request(&self) -> &IndexRequest {
        match self {
            EnqueueOutcome::Created(request) => request,
            EnqueueOutcome::Merged { request, .. } => request,
        }
    }

    pub fn into_request(self) -> IndexRequest {
        match self {
            EnqueueOutcome::Created(request) => request,
            EnqueueOutcome::Merged { request, .. } => request,
        }
    }
}

/// Storage for index requests.
///
/// Implementations backed by a database must make `find_or_create_pending`
/// and `claim` atomic, e.g. with a unique index on the pending key and a
/// conditional state update.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Create the pending request for `(lane, subject)`, or merge `priority`
    /// into the one that already exists. `enqueued_at` of an existing request
    /// never changes.
    async fn find_or_create_pending(
        &self,
        lane: &str,
        subject: &Subject,
        priority: Priority,
    ) -> Result<EnqueueOutcome, IndexError>;

    /// The pending request in `lane` that should run next: most urgent
    /// first, then oldest.
    async fn next_pending(&self, lane: &str) -> Result<Option<IndexRequest>, IndexError>;

    /// Transition Pending -> Executing.
    ///
    /// Fails with [`IndexError::ClaimConflict`] when the request is no longer
    /// pending.
    async fn claim(&self, id: Ulid) -> Result<IndexRequest, IndexError>;

    /// Transition Executing -> Done (`Ok`) or Failed (`Err` with message).
    async fn finish(&self, id: Ulid, outcome: Result<(), String>) -> Result<(), IndexError>;

    async fn get(&self, id: Ulid) -> Result<Option<IndexRequest>, IndexError>;

    /// Every request, in any state, for a subject in a lane.
    async fn requests_for(
        &self,
        lane: &str,
        subject: &Subject,
    ) -> Result<Vec<IndexRequest>, IndexError>;

    /// Delete a request that has not been claimed yet. Returns whether
    /// anything was deleted.
    async fn cancel(&self, id: Ulid) -> Result<bool, IndexError>;

    /// Drop Done and Failed requests. Returns how many were dropped.
    async fn purge_terminal(&self) -> Result<usize, IndexError>;

    async fn pending_count(&self, lane: &str) -> Result<usize, IndexError>;
}

/// In-process [`JobStore`].
///
/// Pending uniqueness is enforced by a key index whose per-key entry lock is
/// the critical section for enqueue, claim and cancel. Contention is limited
/// to requests for the same key.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    requests: DashMap<Ulid, IndexRequest>,
    pending: DashMap<RequestKey, Ulid>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn find_or_create_pending(
        &self,
        lane: &str,
        subject: &Subject,
        priority: Priority,
    ) -> Result<EnqueueOutcome, IndexError> {
        let key = RequestKey::new(lane, subject.clone());
        match self.pending.entry(key) {
            Entry::Occupied(mut entry) => {
                let id = *entry.get();
                if let Some(mut existing) = self.requests.get_mut(&id) {
                    let raised = priority.is_more_urgent_than(existing.priority);
                    if raised {
                        existing.priority = priority;
                    }
                    return Ok(EnqueueOutcome::Merged {
                        request: existing.clone(),
                        raised,
                    });
                }
                // Key index points at a request that is gone; replace it.
                let request = IndexRequest::pending(lane, subject.clone(), priority);
                self.requests.insert(request.id, request.clone());
                entry.insert(request.id);
                Ok(EnqueueOutcome::Created(request))
            }
            Entry::Vacant(entry) => {
                let request = IndexRequest::pending(lane, subject.clone(), priority);
                self.requests.insert(request.id, request.clone());
                entry.insert(request.id);
                Ok(EnqueueOutcome::Created(request))
            }
        }
    }

    async fn next_pending(&self, lane: &str) -> Result<Option<IndexRequest>, IndexError> {
        let mut best: Option<IndexRequest> = None;
        for item in self.requests.iter() {
            let request = item.value();
            if request.lane != lane || !request.is_pending() {
                continue;
            }
            match &best {
                Some(current) if !request.runs_before(current) => {}
                _ => best = Some(request.clone()),
            }
        }
        Ok(best)
    }

    async fn claim(&self, id: Ulid) -> Result<IndexRequest, IndexError> {
        let key = match self.requests.get(&id) {
            Some(request) if request.is_pending() => request.value().key(),
            _ => return Err(IndexError::ClaimConflict(id.to_string())),
        };

        match self.pending.entry(key) {
            Entry::Occupied(entry) if *entry.get() == id => {
                let claimed = match self.requests.get_mut(&id) {
                    Some(mut request) if request.is_pending() => {
                        request.state = RequestState::Executing;
                        request.clone()
                    }
                    _ => return Err(IndexError::ClaimConflict(id.to_string())),
                };
                entry.remove();
                debug!(id = %id, subject = %claimed.subject, "Claimed request");
                Ok(claimed)
            }
            _ => Err(IndexError::ClaimConflict(id.to_string())),
        }
    }

    async fn finish(&self, id: Ulid, outcome: Result<(), String>) -> Result<(), IndexError> {
        let mut request = self
            .requests
            .get_mut(&id)
            .ok_or_else(|| IndexError::Store(format!("unknown request {}", id)))?;
        if request.state != RequestState::Executing {
            return Err(IndexError::Store(format!(
                "request {} is {:?}, not executing",
                id, request.state
            )));
        }
        match outcome {
            Ok(()) => {
                request.state = RequestState::Done;
                request.last_error = None;
            }
            Err(message) => {
                request.state = RequestState::Failed;
                request.last_error = Some(message);
            }
        }
        Ok(())
    }

    async fn get(&self, id: Ulid) -> Result<Option<IndexRequest>, IndexError> {
        Ok(self.requests.get(&id).map(|r| r.value().clone()))
    }

    async fn requests_for(
        &self,
        lane: &str,
        subject: &Subject,
    ) -> Result<Vec<IndexRequest>, IndexError> {
        let mut found: Vec<IndexRequest> = self
            .requests
            .iter()
            .filter(|r| r.lane == lane && &r.subject == subject)
            .map(|r| r.value().clone())
            .collect();
        found.sort_by_key(|r| (r.enqueued_at, r.id));
        Ok(found)
    }

    async fn cancel(&self, id: Ulid) -> Result<bool, IndexError> {
        let key = match self.requests.get(&id) {
            Some(request) if request.is_pending() => request.value().key(),
            _ => return Ok(false),
        };
        match self.pending.entry(key) {
            Entry::Occupied(entry) if *entry.get() == id => {
                entry.remove();
                self.requests.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn purge_terminal(&self) -> Result<usize, IndexError> {
        let before = self.requests.len();
        self.requests.retain(|_, request| !request.state.is_terminal());
        Ok(before.saturating_sub(self.requests.len()))
    }

    async fn pending_count(&self, lane: &str) -> Result<usize, IndexError> {
        Ok(self.pending.iter().filter(|entry| entry.key().lane == lane).count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn subject(id: &str) -> Subject {
        Subject::new("Article", id)
    }

    #[tokio::test]
    async fn test_merge_keeps_most_urgent() {
        let store = MemoryJobStore::new();
        let first = store
            .find_or_create_pending("indexer", &subject("1"), Priority::LOW)
            .await
            .unwrap();
        assert!(matches!(first, EnqueueOutcome::Created(_)));

        let merged = store
            .find_or_create_pending("indexer", &subject("1"), Priority::HIGH)
            .await
            .unwrap();
        match &merged {
            EnqueueOutcome::Merged { request, raised } => {
                assert!(raised);
                assert_eq!(request.priority, Priority::HIGH);
                assert_eq!(request.id, first.request().id);
                assert_eq!(request.enqueued_at, first.request().enqueued_at);
            }
            other => panic!("unexpected {other:?}"),
        }

        let again = store
            .find_or_create_pending("indexer", &subject("1"), Priority::MEDIUM)
            .await
            .unwrap();
        match again {
            EnqueueOutcome::Merged { request, raised } => {
                assert!(!raised);
                assert_eq!(request.priority, Priority::HIGH);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_lanes_are_independent() {
        let store = MemoryJobStore::new();
        store
            .find_or_create_pending("indexer", &subject("1"), Priority::LOW)
            .await
            .unwrap();
        let other = store
            .find_or_create_pending("default", &subject("1"), Priority::LOW)
            .await
            .unwrap();
        assert!(matches!(other, EnqueueOutcome::Created(_)));
        assert_eq!(store.pending_count("indexer").await.unwrap(), 1);
        assert_eq!(store.pending_count("default").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_claim_once() {
        let store = MemoryJobStore::new();
        let id = store
            .find_or_create_pending("indexer", &subject("1"), Priority::LOW)
            .await
            .unwrap()
            .request()
            .id;

        let claimed = store.claim(id).await.unwrap();
        assert_eq!(claimed.state, RequestState::Executing);
        assert!(matches!(
            store.claim(id).await,
            Err(IndexError::ClaimConflict(_))
        ));
        assert!(matches!(
            store.claim(Ulid::new()).await,
            Err(IndexError::ClaimConflict(_))
        ));
    }

    #[tokio::test]
    async fn test_enqueue_after_claim_creates_new_request() {
        let store = MemoryJobStore::new();
        let id = store
            .find_or_create_pending("indexer", &subject("1"), Priority::LOW)
            .await
            .unwrap()
            .request()
            .id;
        store.claim(id).await.unwrap();

        let fresh = store
            .find_or_create_pending("indexer", &subject("1"), Priority::LOW)
            .await
            .unwrap();
        assert!(matches!(fresh, EnqueueOutcome::Created(_)));
        assert_ne!(fresh.request().id, id);

        let all = store.requests_for("indexer", &subject("1")).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].state, RequestState::Executing);
        assert_eq!(all[1].state, RequestState::Pending);
    }

    #[tokio::test]
    async fn test_next_pending_order() {
        let store = MemoryJobStore::new();
        store
            .find_or_create_pending("indexer", &subject("low"), Priority::LOW)
            .await
            .unwrap();
        store
            .find_or_create_pending("indexer", &subject("high"), Priority::HIGH)
            .await
            .unwrap();
        store
            .find_or_create_pending("indexer", &subject("high2"), Priority::HIGH)
            .await
            .unwrap();

        let next = store.next_pending("indexer").await.unwrap().unwrap();
        assert_eq!(next.priority, Priority::HIGH);
        assert_ne!(next.subject.id, "low");
        assert!(store.next_pending("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_finish_and_purge() {
        let store = MemoryJobStore::new();
        let a = store
            .find_or_create_pending("indexer", &subject("a"), Priority::LOW)
            .await
            .unwrap()
            .into_request();
        let b = store
            .find_or_create_pending("indexer", &subject("b"), Priority::LOW)
            .await
            .unwrap()
            .into_request();
        store
            .find_or_create_pending("indexer", &subject("c"), Priority::LOW)
            .await
            .unwrap();

        // finishing an unclaimed request is a store error
        assert!(matches!(
            store.finish(a.id, Ok(())).await,
            Err(IndexError::Store(_))
        ));

        store.claim(a.id).await.unwrap();
        store.claim(b.id).await.unwrap();
        store.finish(a.id, Ok(())).await.unwrap();
        store.finish(b.id, Err("boom".to_string())).await.unwrap();

        let failed = store.get(b.id).await.unwrap().unwrap();
        assert_eq!(failed.state, RequestState::Failed);
        assert_eq!(failed.last_error.as_deref(), Some("boom"));

        assert_eq!(store.purge_terminal().await.unwrap(), 2);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_only_pending() {
        let store = MemoryJobStore::new();
        let a = store
            .find_or_create_pending("indexer", &subject("a"), Priority::LOW)
            .await
            .unwrap()
            .into_request();
        assert!(store.cancel(a.id).await.unwrap());
        assert!(store.is_empty());
        assert_eq!(store.pending_count("indexer").await.unwrap(), 0);

        let b = store
            .find_or_create_pending("indexer", &subject("b"), Priority::LOW)
            .await
            .unwrap()
            .into_request();
        store.claim(b.id).await.unwrap();
        assert!(!store.cancel(b.id).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_enqueue_creates_one_request() {
        let store = Arc::new(MemoryJobStore::new());
        let handles: Vec<_> = (0..32)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .find_or_create_pending("indexer", &subject("hot"), Priority(i % 7))
                        .await
                        .unwrap()
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let all = store.requests_for("indexer", &subject("hot")).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].priority, Priority(0));
    }
}

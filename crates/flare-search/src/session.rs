//! Indexing session.
//!
//! A [`Session`] owns one backend handle, the document adapter and the dirty
//! counters for that backend. Construct one at process start and share it
//! (behind an `Arc`) with every component that writes to the index.

use std::sync::Arc;

use flare_types::{Document, Indexable, Settings, Subject};
use tracing::{debug, info, warn};

use crate::adapter::{DocumentAdapter, IndexProfile};
use crate::backend::{Page, QueryResponse, SearchBackend, SearchOptions};
use crate::dirty::{DirtyCounts, DirtyTracker};
use crate::error::{IndexError, SearchError};
use crate::scope;
use crate::solr::SolrClient;

/// Backend connection plus commit bookkeeping.
pub struct Session {
    backend: Arc<dyn SearchBackend>,
    adapter: DocumentAdapter,
    tracker: DirtyTracker,
    disabled: bool,
}

impl Session {
    pub fn new(backend: Arc<dyn SearchBackend>, adapter: DocumentAdapter) -> Self {
        Self {
            backend,
            adapter,
            tracker: DirtyTracker::new(),
            disabled: false,
        }
    }

    /// Session talking to the Solr core described by the settings.
    pub fn from_settings(settings: &Settings) -> Result<Self, SearchError> {
        let backend = SolrClient::from_settings(&settings.solr)?;
        info!(
            read_url = backend.read_url(),
            write_url = backend.write_url(),
            disabled = settings.disabled,
            "Search session created"
        );
        Ok(Self::new(Arc::new(backend), DocumentAdapter::from_settings(settings))
            .with_disabled(settings.disabled))
    }

    /// When disabled, mutations are accepted and dropped and queries return
    /// nothing. The backend is never contacted.
    pub fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Register the profile for a type (uid prefix, scope, after-index hook).
    pub fn with_profile(mut self, profile: IndexProfile) -> Self {
        self.adapter.register(profile);
        self
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn backend(&self) -> &Arc<dyn SearchBackend> {
        &self.backend
    }

    pub fn adapter(&self) -> &DocumentAdapter {
        &self.adapter
    }

    pub fn profile(&self, type_name: &str) -> IndexProfile {
        self.adapter.profile(type_name)
    }

    pub fn uid(&self, subject: &Subject) -> String {
        self.adapter.subject_uid(subject)
    }

    // --- mutations ---

    /// Send documents without committing.
    pub async fn index(&self, documents: &[Document]) -> Result<(), IndexError> {
        if documents.is_empty() || self.disabled {
            return Ok(());
        }
        self.backend.add(documents).await?;
        self.tracker.record_add(documents.len() as u64);
        Ok(())
    }

    /// Send documents and commit immediately.
    pub async fn index_and_commit(&self, documents: &[Document]) -> Result<(), IndexError> {
        self.index(documents).await?;
        self.commit(false).await
    }

    /// Render a record, send it and run its type's after-index hook.
    ///
    /// Returns the uid that was written.
    pub async fn index_record(&self, record: &dyn Indexable) -> Result<String, IndexError> {
        let document = self.adapter.render(record)?;
        let uid = document.uid().unwrap_or_default().to_string();
        self.index(std::slice::from_ref(&document)).await?;
        info!(uid = %uid, "Reindexed {}", uid);

        let subject = record.subject();
        self.adapter.profile(&subject.type_name).run_after_index(record);
        record.after_index_hook();
        Ok(uid)
    }

    /// Delete documents by uid.
    pub async fn delete(&self, uids: &[String]) -> Result<(), IndexError> {
        if uids.is_empty() || self.disabled {
            return Ok(());
        }
        self.backend.delete_by_id(uids).await?;
        self.tracker.record_delete(uids.len() as u64);
        Ok(())
    }

    pub async fn delete_and_commit(&self, uids: &[String]) -> Result<(), IndexError> {
        self.delete(uids).await?;
        self.commit(false).await
    }

    /// Delete every document matching a query.
    pub async fn delete_by(&self, query: &str) -> Result<(), IndexError> {
        if self.disabled {
            return Ok(());
        }
        self.backend.delete_by_query(query).await?;
        self.tracker.record_delete(1);
        Ok(())
    }

    pub async fn delete_by_and_commit(&self, query: &str) -> Result<(), IndexError> {
        self.delete_by(query).await?;
        self.commit(false).await
    }

    /// Commit pending changes.
    ///
    /// The dirty counters are only cleared when the backend accepts the
    /// commit.
    pub async fn commit(&self, soft: bool) -> Result<(), IndexError> {
        if self.disabled {
            return Ok(());
        }
        let snapshot = self.tracker.snapshot();
        self.backend.commit(soft).await?;
        self.tracker.settle(snapshot);
        debug!(soft, adds = snapshot.adds, deletes = snapshot.deletes, "Committed");
        Ok(())
    }

    /// Merge index segments. Also performs a hard commit.
    pub async fn optimize(&self) -> Result<(), IndexError> {
        if self.disabled {
            return Ok(());
        }
        let snapshot = self.tracker.snapshot();
        self.backend.optimize().await?;
        self.tracker.settle(snapshot);
        info!("Index optimized");
        Ok(())
    }

    /// Commit when anything changed since the last commit.
    ///
    /// Returns whether a commit was issued.
    pub async fn commit_if_dirty(&self, soft: bool) -> Result<bool, IndexError> {
        if !self.tracker.dirty() {
            return Ok(false);
        }
        self.commit(soft).await?;
        Ok(true)
    }

    /// Commit when a delete is pending.
    pub async fn commit_if_delete_dirty(&self, soft: bool) -> Result<bool, IndexError> {
        if !self.tracker.delete_dirty() {
            return Ok(false);
        }
        self.commit(soft).await?;
        Ok(true)
    }

    /// Flush outstanding changes with a hard commit before the session is
    /// dropped.
    pub async fn shutdown(&self) -> Result<(), IndexError> {
        match self.commit_if_dirty(false).await {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(error = %e, "Final commit failed");
                Err(e)
            }
        }
    }

    // --- counters ---

    pub fn dirty(&self) -> bool {
        self.tracker.dirty()
    }

    pub fn delete_dirty(&self) -> bool {
        self.tracker.delete_dirty()
    }

    pub fn counts(&self) -> DirtyCounts {
        self.tracker.counts()
    }

    pub fn tracker(&self) -> &DirtyTracker {
        &self.tracker
    }

    // --- queries ---

    /// Look up a single document by uid.
    pub async fn find(&self, uid: &str) -> Result<Option<Document>, IndexError> {
        let response = self
            .select(&scope::uid_clause(uid), &SearchOptions::new().rows(1))
            .await?;
        Ok(response.docs.into_iter().next())
    }

    pub async fn find_by(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<QueryResponse, IndexError> {
        self.select(query, options).await
    }

    /// 1-based page of results.
    pub async fn paginate(
        &self,
        page: u64,
        per_page: u64,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Page, IndexError> {
        if self.disabled {
            return Ok(Page::from_response(page, per_page, QueryResponse::default()));
        }
        Ok(self.backend.paginate(query, page, per_page, options).await?)
    }

    async fn select(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<QueryResponse, IndexError> {
        if self.disabled {
            return Ok(QueryResponse::default());
        }
        Ok(self.backend.select(query, options).await?)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("backend", &self.backend.name())
            .field("counts", &self.tracker.counts())
            .field("disabled", &self.disabled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{BackendOp, MockBackend, MockFailure};

    fn session() -> (Arc<MockBackend>, Session) {
        let backend = Arc::new(MockBackend::new());
        let session = Session::new(backend.clone(), DocumentAdapter::new());
        (backend, session)
    }

    fn doc(uid: &str) -> Document {
        Document::new().with_field("uid", uid)
    }

    #[tokio::test]
    async fn test_index_marks_dirty_without_commit() {
        let (backend, session) = session();
        session.index(&[doc("a"), doc("b")]).await.unwrap();
        assert!(session.dirty());
        assert_eq!(session.counts().adds, 2);
        assert_eq!(backend.commit_count(), 0);
    }

    #[tokio::test]
    async fn test_index_and_commit() {
        let (backend, session) = session();
        session.index_and_commit(&[doc("a")]).await.unwrap();
        assert!(!session.dirty());
        assert_eq!(
            backend.ops(),
            vec![
                BackendOp::Add(vec!["a".to_string()]),
                BackendOp::Commit { soft: false }
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_commit_keeps_counters() {
        let (backend, session) = session();
        session.index(&[doc("a")]).await.unwrap();
        session.delete(&["b".to_string()]).await.unwrap();

        backend.fail_with(MockFailure::Unavailable);
        let err = session.commit(true).await.unwrap_err();
        assert!(matches!(err, IndexError::BackendUnavailable(_)));
        assert!(session.dirty());
        assert_eq!(session.counts(), DirtyCounts { adds: 1, deletes: 1 });

        backend.recover();
        session.commit(true).await.unwrap();
        assert!(!session.dirty());
    }

    #[tokio::test]
    async fn test_rejected_commit_surfaces_status() {
        let (backend, session) = session();
        session.index(&[doc("a")]).await.unwrap();
        backend.fail_commits_with(MockFailure::Status(400));
        match session.commit(false).await.unwrap_err() {
            IndexError::BackendRequest { status, .. } => assert_eq!(status, 400),
            other => panic!("unexpected {other:?}"),
        }
        assert!(session.dirty());
    }

    #[tokio::test]
    async fn test_failed_add_does_not_count() {
        let (backend, session) = session();
        backend.fail_with(MockFailure::Unavailable);
        assert!(session.index(&[doc("a")]).await.is_err());
        assert!(!session.dirty());
    }

    #[tokio::test]
    async fn test_commit_if_dirty() {
        let (backend, session) = session();
        assert!(!session.commit_if_dirty(false).await.unwrap());
        assert_eq!(backend.commit_count(), 0);

        session.index(&[doc("a")]).await.unwrap();
        assert!(!session.commit_if_delete_dirty(false).await.unwrap());
        assert!(session.commit_if_dirty(true).await.unwrap());
        assert_eq!(backend.commit_count(), 1);
        assert!(!session.dirty());
    }

    #[tokio::test]
    async fn test_deletes_are_delete_dirty() {
        let (backend, session) = session();
        session.delete_by("tree:art").await.unwrap();
        assert!(session.delete_dirty());
        assert!(session.commit_if_delete_dirty(false).await.unwrap());
        assert!(!session.delete_dirty());
        assert_eq!(backend.commit_count(), 1);
    }

    #[tokio::test]
    async fn test_find_and_paginate() {
        let (backend, session) = session();
        for uid in ["a", "b", "c"] {
            backend.seed(doc(uid));
        }
        let found = session.find("a").await.unwrap();
        assert!(found.is_some());
        assert!(backend.ops().contains(&BackendOp::Select("uid:a".to_string())));

        let page = session
            .paginate(2, 2, "*:*", &SearchOptions::new())
            .await
            .unwrap();
        assert_eq!(page.total_entries, 3);
        assert_eq!(page.docs.len(), 1);
        assert!(!page.has_next());
    }

    #[tokio::test]
    async fn test_disabled_session_never_contacts_backend() {
        let backend = Arc::new(MockBackend::new());
        let session = Session::new(backend.clone(), DocumentAdapter::new()).with_disabled(true);

        session.index_and_commit(&[doc("a")]).await.unwrap();
        session.delete_by("*:*").await.unwrap();
        assert!(session.find("a").await.unwrap().is_none());
        assert!(backend.ops().is_empty());
        assert!(!session.dirty());
    }
}

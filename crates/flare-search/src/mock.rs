//! In-memory search backend for tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use flare_types::Document;

use crate::backend::{QueryResponse, SearchBackend, SearchOptions};
use crate::error::SearchError;

/// A call received by [`MockBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum BackendOp {
    Add(Vec<String>),
    DeleteById(Vec<String>),
    DeleteByQuery(String),
    Commit { soft: bool },
    Optimize,
    Select(String),
}

/// How the mock should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// Connection-level failure
    Unavailable,
    /// Non-success HTTP status
    Status(u16),
}

impl MockFailure {
    fn to_error(self) -> SearchError {
        match self {
            MockFailure::Unavailable => SearchError::Unavailable("connection refused".to_string()),
            MockFailure::Status(status) => SearchError::Request {
                status,
                body: "mock failure".to_string(),
            },
        }
    }
}

/// Backend that keeps documents in a map keyed by uid and records every call.
///
/// Selects ignore the query and return every stored document ordered by uid,
/// windowed by `start`/`rows`.
#[derive(Debug, Default)]
pub struct MockBackend {
    docs: Mutex<BTreeMap<String, Document>>,
    ops: Mutex<Vec<BackendOp>>,
    failure: Mutex<Option<MockFailure>>,
    commit_failure: Mutex<Option<MockFailure>>,
    commits: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every subsequent call until [`MockBackend::recover`].
    pub fn fail_with(&self, failure: MockFailure) {
        *lock(&self.failure) = Some(failure);
    }

    /// Fail only commits.
    pub fn fail_commits_with(&self, failure: MockFailure) {
        *lock(&self.commit_failure) = Some(failure);
    }

    pub fn recover(&self) {
        *lock(&self.failure) = None;
        *lock(&self.commit_failure) = None;
    }

    pub fn ops(&self) -> Vec<BackendOp> {
        lock(&self.ops).clone()
    }

    pub fn clear_ops(&self) {
        lock(&self.ops).clear();
    }

    /// Successful commits.
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn document(&self, uid: &str) -> Option<Document> {
        lock(&self.docs).get(uid).cloned()
    }

    pub fn document_count(&self) -> usize {
        lock(&self.docs).len()
    }

    /// Insert a document directly, bypassing op recording.
    pub fn seed(&self, document: Document) {
        if let Some(uid) = document.uid().map(str::to_string) {
            lock(&self.docs).insert(uid, document);
        }
    }

    fn record(&self, op: BackendOp) -> Result<(), SearchError> {
        lock(&self.ops).push(op);
        match *lock(&self.failure) {
            Some(failure) => Err(failure.to_error()),
            None => Ok(()),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl SearchBackend for MockBackend {
    async fn add(&self, documents: &[Document]) -> Result<(), SearchError> {
        let uids = documents
            .iter()
            .map(|d| d.uid().unwrap_or_default().to_string())
            .collect();
        self.record(BackendOp::Add(uids))?;
        let mut docs = lock(&self.docs);
        for document in documents {
            if let Some(uid) = document.uid() {
                docs.insert(uid.to_string(), document.clone());
            }
        }
        Ok(())
    }

    async fn delete_by_id(&self, uids: &[String]) -> Result<(), SearchError> {
        self.record(BackendOp::DeleteById(uids.to_vec()))?;
        let mut docs = lock(&self.docs);
        for uid in uids {
            docs.remove(uid);
        }
        Ok(())
    }

    async fn delete_by_query(&self, query: &str) -> Result<(), SearchError> {
        self.record(BackendOp::DeleteByQuery(query.to_string()))?;
        if query == "*:*" {
            lock(&self.docs).clear();
        }
        Ok(())
    }

    async fn commit(&self, soft: bool) -> Result<(), SearchError> {
        self.record(BackendOp::Commit { soft })?;
        if let Some(failure) = *lock(&self.commit_failure) {
            return Err(failure.to_error());
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn optimize(&self) -> Result<(), SearchError> {
        self.record(BackendOp::Optimize)
    }

    async fn select(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<QueryResponse, SearchError> {
        self.record(BackendOp::Select(query.to_string()))?;
        let docs = lock(&self.docs);
        let start = options.start.unwrap_or(0) as usize;
        let rows = options.rows.map(|r| r as usize).unwrap_or(usize::MAX);
        Ok(QueryResponse {
            num_found: docs.len() as u64,
            docs: docs.values().skip(start).take(rows).cloned().collect(),
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

//! Per-type index handle.
//!
//! Every query and delete issued through a [`TypeIndex`] is confined to the
//! type's scope filter and addresses documents by the type's uid.

use std::sync::Arc;

use flare_types::{Document, Indexable};
use serde_json::Value;
use tracing::debug;

use crate::adapter::IndexProfile;
use crate::backend::{Page, QueryResponse, SearchOptions};
use crate::error::IndexError;
use crate::scope::{self, ScopeFilter};
use crate::session::Session;

/// Field holding the backend's document version.
pub const VERSION_FIELD: &str = "_version_";
/// Field holding the backend's insertion timestamp.
pub const TIMESTAMP_FIELD: &str = "_timestamp_";

/// Scoped access to the documents of one entity type.
#[derive(Debug, Clone)]
pub struct TypeIndex {
    session: Arc<Session>,
    profile: IndexProfile,
}

impl TypeIndex {
    /// Handle for `type_name` using the profile registered on the session.
    pub fn new(session: Arc<Session>, type_name: &str) -> Self {
        let profile = session.profile(type_name);
        Self { session, profile }
    }

    pub fn with_profile(session: Arc<Session>, profile: IndexProfile) -> Self {
        Self { session, profile }
    }

    pub fn profile(&self) -> &IndexProfile {
        &self.profile
    }

    pub fn scope(&self) -> &ScopeFilter {
        &self.profile.scope
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn uid(&self, id: &str) -> String {
        self.profile.uid(id)
    }

    pub fn uid_query(&self, id: &str) -> String {
        self.profile.uid_query(id)
    }

    /// Index a record without committing.
    pub async fn index(&self, record: &dyn Indexable) -> Result<String, IndexError> {
        self.session.index_record(record).await
    }

    /// Drop the record's sub-documents, index it and commit.
    pub async fn index_now(&self, record: &dyn Indexable) -> Result<String, IndexError> {
        self.remove_subdocs(&record.subject().id).await?;
        let uid = self.session.index_record(record).await?;
        self.session.commit(false).await?;
        Ok(uid)
    }

    /// Remove documents by id.
    ///
    /// Unscoped types delete by uid; scoped types issue one scoped delete
    /// query (a single clause for one id, a disjunction for several).
    pub async fn remove<S: AsRef<str>>(&self, ids: &[S]) -> Result<(), IndexError> {
        if ids.is_empty() {
            return Ok(());
        }
        let uids: Vec<String> = ids.iter().map(|id| self.uid(id.as_ref())).collect();
        if self.scope().is_empty() {
            self.session.delete(&uids).await
        } else {
            self.session.delete_by(&self.scope().delete_query(&uids)).await
        }
    }

    pub async fn remove_now<S: AsRef<str>>(&self, ids: &[S]) -> Result<(), IndexError> {
        self.remove(ids).await?;
        self.session.commit(false).await
    }

    /// Delete by one or more queries, each confined to the scope.
    pub async fn remove_by<S: AsRef<str>>(&self, queries: &[S]) -> Result<(), IndexError> {
        for query in queries {
            self.session.delete_by(&self.scope().apply(query.as_ref())).await?;
        }
        Ok(())
    }

    pub async fn remove_by_now<S: AsRef<str>>(&self, queries: &[S]) -> Result<(), IndexError> {
        self.remove_by(queries).await?;
        self.session.commit(false).await
    }

    /// The indexed document for `id`, if any.
    pub async fn find(&self, id: &str) -> Result<Option<Document>, IndexError> {
        if self.scope().is_empty() {
            return self.session.find(&self.uid(id)).await;
        }
        let query = self.scope().apply(&self.uid_query(id));
        let response = self
            .session
            .find_by(&query, &SearchOptions::new().rows(1))
            .await?;
        Ok(response.docs.into_iter().next())
    }

    pub async fn search_by(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<QueryResponse, IndexError> {
        self.session.find_by(&self.scope().apply(query), options).await
    }

    pub async fn paginate(
        &self,
        page: u64,
        per_page: u64,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Page, IndexError> {
        self.session
            .paginate(page, per_page, &self.scope().apply(query), options)
            .await
    }

    /// Delete the documents whose uid starts with `<uid>_`.
    pub async fn remove_subdocs(&self, id: &str) -> Result<(), IndexError> {
        let query = scope::build(self.scope().fragments(), &format!("{}_*", self.uid_query(id)));
        self.session.delete_by(&query).await
    }

    /// Delete stale versions of the record's document.
    ///
    /// Does nothing when the document is not indexed or carries no version.
    pub async fn remove_orphaned_subdocs(&self, id: &str) -> Result<(), IndexError> {
        let Some(document) = self.find(id).await? else {
            return Ok(());
        };
        let Some(version) = document.get(VERSION_FIELD).and_then(version_string) else {
            debug!(id, "No version on indexed document; skipping orphan removal");
            return Ok(());
        };
        let mut fragments = self.scope().fragments().to_vec();
        fragments.push(self.uid_query(id));
        let query = scope::build(&fragments, &format!("NOT {}:{}", VERSION_FIELD, version));
        self.session.delete_by(&query).await
    }

    /// Earliest indexed document under this type's uid prefix.
    pub async fn oldest_document(&self) -> Result<Option<Document>, IndexError> {
        let prefix = self.profile.uid_prefix.clone().unwrap_or_default();
        let options = SearchOptions::new()
            .sort(format!("{} asc", TIMESTAMP_FIELD))
            .rows(1);
        let response = self.search_by(&format!("tree:{}", prefix), &options).await?;
        Ok(response.docs.into_iter().next())
    }
}

fn version_string(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::DocumentAdapter;
    use crate::mock::{BackendOp, MockBackend};
    use flare_types::{DocumentBuildError, Subject};
    use pretty_assertions::assert_eq;

    struct Article(&'static str);

    impl Indexable for Article {
        fn subject(&self) -> Subject {
            Subject::new("Article", self.0)
        }

        fn render_document(&self) -> Result<Document, DocumentBuildError> {
            Ok(Document::new().with_field("title", format!("Article {}", self.0)))
        }
    }

    fn scoped() -> (Arc<MockBackend>, TypeIndex) {
        let backend = Arc::new(MockBackend::new());
        let profile = IndexProfile::new("Article")
            .with_uid_prefix("art")
            .with_scope(vec!["tree:art".to_string()]);
        let session = Session::new(backend.clone(), DocumentAdapter::new()).with_profile(profile);
        (backend, TypeIndex::new(Arc::new(session), "Article"))
    }

    fn unscoped() -> (Arc<MockBackend>, TypeIndex) {
        let backend = Arc::new(MockBackend::new());
        let session = Session::new(backend.clone(), DocumentAdapter::new());
        (backend, TypeIndex::new(Arc::new(session), "Article"))
    }

    #[tokio::test]
    async fn test_remove_unscoped_deletes_by_id() {
        let (backend, index) = unscoped();
        index.remove(&["1", "2"]).await.unwrap();
        assert_eq!(
            backend.ops(),
            vec![BackendOp::DeleteById(vec!["1".to_string(), "2".to_string()])]
        );
        assert_eq!(index.session().counts().deletes, 2);
    }

    #[tokio::test]
    async fn test_remove_scoped_single_and_multi() {
        let (backend, index) = scoped();
        index.remove(&["1"]).await.unwrap();
        index.remove(&["1", "2"]).await.unwrap();
        assert_eq!(
            backend.ops(),
            vec![
                BackendOp::DeleteByQuery("(tree:art) AND (uid:art-1)".to_string()),
                BackendOp::DeleteByQuery("(tree:art) AND (uid:art-1 OR uid:art-2)".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_remove_nothing_is_noop() {
        let (backend, index) = scoped();
        let none: [&str; 0] = [];
        index.remove(&none).await.unwrap();
        assert!(backend.ops().is_empty());
    }

    #[tokio::test]
    async fn test_remove_by_scopes_each_query() {
        let (backend, index) = scoped();
        index.remove_by_now(&["title:a", "title:b"]).await.unwrap();
        assert_eq!(
            backend.ops(),
            vec![
                BackendOp::DeleteByQuery("(tree:art) AND (title:a)".to_string()),
                BackendOp::DeleteByQuery("(tree:art) AND (title:b)".to_string()),
                BackendOp::Commit { soft: false },
            ]
        );
    }

    #[tokio::test]
    async fn test_index_now_clears_subdocs_and_commits() {
        let (backend, index) = scoped();
        let uid = index.index_now(&Article("7")).await.unwrap();
        assert_eq!(uid, "art-7");
        assert_eq!(
            backend.ops(),
            vec![
                BackendOp::DeleteByQuery("(tree:art) AND (uid:art-7_*)".to_string()),
                BackendOp::Add(vec!["art-7".to_string()]),
                BackendOp::Commit { soft: false },
            ]
        );
        assert!(!index.session().dirty());
    }

    #[tokio::test]
    async fn test_find_uses_scope() {
        let (backend, index) = scoped();
        index.index(&Article("7")).await.unwrap();
        let found = index.find("7").await.unwrap().unwrap();
        assert_eq!(found.uid(), Some("art-7"));
        assert!(backend
            .ops()
            .contains(&BackendOp::Select("(tree:art) AND (uid:art-7)".to_string())));
    }

    #[tokio::test]
    async fn test_remove_orphaned_subdocs() {
        let (backend, index) = scoped();
        backend.seed(
            Document::new()
                .with_field("uid", "art-7")
                .with_field(VERSION_FIELD, 1234),
        );
        index.remove_orphaned_subdocs("7").await.unwrap();
        assert!(backend.ops().contains(&BackendOp::DeleteByQuery(
            "(tree:art) AND (uid:art-7) AND (NOT _version_:1234)".to_string()
        )));
    }

    #[tokio::test]
    async fn test_remove_orphaned_subdocs_without_version() {
        let (backend, index) = scoped();
        backend.seed(Document::new().with_field("uid", "art-7"));
        index.remove_orphaned_subdocs("7").await.unwrap();
        assert!(!backend
            .ops()
            .iter()
            .any(|op| matches!(op, BackendOp::DeleteByQuery(_))));
    }

    #[tokio::test]
    async fn test_oldest_document_query() {
        let (backend, index) = scoped();
        index.oldest_document().await.unwrap();
        assert_eq!(
            backend.ops(),
            vec![BackendOp::Select("(tree:art) AND (tree:art)".to_string())]
        );
    }
}

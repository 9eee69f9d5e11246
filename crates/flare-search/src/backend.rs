//! Search backend abstraction.
//!
//! The coalescer and the session only talk to the backend through
//! [`SearchBackend`]; [`crate::SolrClient`] is the production implementation
//! and [`crate::MockBackend`] backs the tests.

use async_trait::async_trait;
use flare_types::Document;
use serde::{Deserialize, Serialize};

use crate::error::SearchError;

/// Default page size for paginated queries.
pub const DEFAULT_PER_PAGE: u64 = 20;

/// Query modifiers passed through to the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchOptions {
    /// e.g. `_timestamp_ asc`
    pub sort: Option<String>,
    pub rows: Option<u64>,
    pub start: Option<u64>,
    /// Field list; empty returns every stored field
    #[serde(default)]
    pub fields: Vec<String>,
}

impl SearchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    pub fn rows(mut self, rows: u64) -> Self {
        self.rows = Some(rows);
        self
    }

    pub fn start(mut self, start: u64) -> Self {
        self.start = Some(start);
        self
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Window for a 1-based page. Page 0 is treated as page 1; offsets past
    /// `u64::MAX` clamp there.
    pub fn for_page(mut self, page: u64, per_page: u64) -> Self {
        let page = page.max(1);
        self.start = Some((page - 1).saturating_mul(per_page));
        self.rows = Some(per_page);
        self
    }
}

/// Raw result of a select.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub num_found: u64,
    pub docs: Vec<Document>,
}

/// One page of search results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub page: u64,
    pub per_page: u64,
    pub total_entries: u64,
    pub docs: Vec<Document>,
}

impl Page {
    pub fn from_response(page: u64, per_page: u64, response: QueryResponse) -> Self {
        Self {
            page: page.max(1),
            per_page,
            total_entries: response.num_found,
            docs: response.docs,
        }
    }

    pub fn total_pages(&self) -> u64 {
        if self.per_page == 0 {
            return 0;
        }
        self.total_entries.div_ceil(self.per_page)
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

/// Operations the indexing pipeline needs from a search engine.
///
/// Implementations must be safe to share across worker tasks.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Add or replace documents, keyed by their uid.
    async fn add(&self, documents: &[Document]) -> Result<(), SearchError>;

    /// Delete documents by uid. No scoping is applied.
    async fn delete_by_id(&self, uids: &[String]) -> Result<(), SearchError>;

    async fn delete_by_query(&self, query: &str) -> Result<(), SearchError>;

    /// Make pending changes visible.
    async fn commit(&self, soft: bool) -> Result<(), SearchError>;

    async fn optimize(&self) -> Result<(), SearchError>;

    async fn select(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<QueryResponse, SearchError>;

    /// Select a 1-based page of results.
    async fn paginate(
        &self,
        query: &str,
        page: u64,
        per_page: u64,
        options: &SearchOptions,
    ) -> Result<Page, SearchError> {
        let options = options.clone().for_page(page, per_page);
        let response = self.select(query, &options).await?;
        Ok(Page::from_response(page, per_page, response))
    }

    /// Backend name for logging.
    fn name(&self) -> &str {
        "search"
    }
}

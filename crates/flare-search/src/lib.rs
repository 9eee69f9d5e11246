//! # flare-search
//!
//! Search backend access for flare.
//!
//! - [`SearchBackend`]: add/delete/commit/select operations, implemented by
//!   [`SolrClient`] over separate read and write connections
//! - [`scope`]: composes per-type scope filters with query fragments
//! - [`DocumentAdapter`]: renders [`flare_types::Indexable`] records and derives uids
//! - [`DirtyTracker`]: uncommitted add/delete counters
//! - [`Session`]: the shared handle combining the above
//! - [`TypeIndex`]: scoped, uid-addressed operations for one entity type
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use flare_search::{Session, TypeIndex};
//! use flare_types::Settings;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Settings::load(None)?;
//! let session = Arc::new(Session::from_settings(&settings)?);
//! let articles = TypeIndex::new(session.clone(), "Article");
//! articles.remove(&["42"]).await?;
//! session.commit_if_dirty(false).await?;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod backend;
pub mod dirty;
pub mod error;
pub mod mock;
pub mod scope;
pub mod session;
pub mod solr;
pub mod type_index;

pub use adapter::{AfterIndexHook, DocumentAdapter, IndexProfile};
pub use backend::{Page, QueryResponse, SearchBackend, SearchOptions, DEFAULT_PER_PAGE};
pub use dirty::{DirtyCounts, DirtyTracker};
pub use error::{IndexError, SearchError};
pub use mock::{BackendOp, MockBackend, MockFailure};
pub use scope::ScopeFilter;
pub use session::Session;
pub use solr::{SolrClient, SolrClientConfig};
pub use type_index::TypeIndex;

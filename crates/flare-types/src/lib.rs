//! # flare-types
//!
//! Shared domain types for the flare indexing coalescer.
//!
//! This crate defines the data structures passed between the search client,
//! the scheduler and the operator CLI:
//! - [`Subject`] and [`Priority`]: identity and urgency of an index request
//! - [`IndexRequest`]: a queued unit of indexing work and its lifecycle state
//! - [`Document`] and [`Indexable`]: the backend-ready representation of a record
//! - [`Settings`]: layered configuration
//!
//! ## Usage
//!
//! ```rust
//! use flare_types::{Priority, Subject};
//!
//! let subject = Subject::new("Article", "42");
//! assert_eq!(subject.to_string(), "Article#42");
//! assert!(Priority::HIGH.is_more_urgent_than(Priority::MEDIUM));
//! ```

pub mod config;
pub mod document;
pub mod error;
pub mod request;
pub mod subject;

pub use config::{
    IndexerSettings, Settings, SolrSettings, ThrottleSettings, TypeSettings, VerifyMode,
};
pub use document::{Document, Indexable, UID_FIELD};
pub use error::{DocumentBuildError, FlareError};
pub use request::{IndexRequest, RequestKey, RequestState};
pub use subject::{Priority, Subject};

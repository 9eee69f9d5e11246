//! Error types for backend access and indexing.

use flare_types::DocumentBuildError;
use thiserror::Error;

/// Errors raised by a search backend connection.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Connection refused, DNS failure, timeout
    #[error("Search backend unavailable: {0}")]
    Unavailable(String),

    /// The backend answered with a non-success status
    #[error("Search backend rejected request (HTTP {status}): {body}")]
    Request { status: u16, body: String },

    /// The backend answered successfully but the body could not be decoded
    #[error("Invalid backend response: {0}")]
    InvalidResponse(String),

    /// Client could not be constructed from configuration
    #[error("Invalid backend configuration: {0}")]
    Config(String),
}

impl SearchError {
    /// Network-level failures that are safe to retry later.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, SearchError::Unavailable(_))
    }
}

impl From<reqwest::Error> for SearchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() || err.is_request() {
            SearchError::Unavailable(err.to_string())
        } else if err.is_decode() {
            SearchError::InvalidResponse(err.to_string())
        } else if let Some(status) = err.status() {
            SearchError::Request {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            SearchError::Unavailable(err.to_string())
        }
    }
}

/// Errors surfaced by indexing operations.
///
/// Callers of the immediate path receive these directly; the coalescer
/// records them on the failed request.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Bad or missing data on a single subject
    #[error("Document build failed: {0}")]
    DocumentBuild(#[from] DocumentBuildError),

    /// Network-level failure; counters are untouched and a retry is safe
    #[error("Search backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The backend rejected the operation
    #[error("Search backend rejected request (HTTP {status}): {body}")]
    BackendRequest { status: u16, body: String },

    /// The backend reply could not be understood
    #[error("Invalid backend response: {0}")]
    BackendResponse(String),

    /// Another worker already claimed the request
    #[error("Request already claimed: {0}")]
    ClaimConflict(String),

    /// The job store failed
    #[error("Job store error: {0}")]
    Store(String),
}

impl IndexError {
    /// Whether a retry of the identical operation can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IndexError::BackendUnavailable(_) | IndexError::Store(_))
    }
}

impl From<SearchError> for IndexError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::Unavailable(msg) => IndexError::BackendUnavailable(msg),
            SearchError::Request { status, body } => IndexError::BackendRequest { status, body },
            SearchError::InvalidResponse(msg) => IndexError::BackendResponse(msg),
            SearchError::Config(msg) => IndexError::BackendUnavailable(msg),
        }
    }
}

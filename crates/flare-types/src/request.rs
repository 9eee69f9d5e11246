//! Queued index requests.
//!
//! An [`IndexRequest`] is owned by the job store. At most one request per
//! [`RequestKey`] is `Pending` at any time; later enqueues for the same key
//! merge into it instead of creating a duplicate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::subject::{Priority, Subject};

/// Lifecycle state of an index request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    /// Waiting to be claimed by a worker
    Pending,
    /// Claimed by a worker; no longer mergeable
    Executing,
    /// Executed successfully
    Done,
    /// Execution failed; retry policy belongs to the job store
    Failed,
}

impl RequestState {
    /// Done and Failed are terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, RequestState::Done | RequestState::Failed)
    }
}

/// Dedupe key: a subject within a named lane.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestKey {
    pub lane: String,
    pub subject: Subject,
}

impl RequestKey {
    pub fn new(lane: impl Into<String>, subject: Subject) -> Self {
        Self {
            lane: lane.into(),
            subject,
        }
    }
}

/// A queued unit of indexing work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRequest {
    /// Unique request id (ULID, sortable by creation time)
    pub id: Ulid,

    /// Lane (named sub-queue) the request belongs to
    pub lane: String,

    /// Record to index
    pub subject: Subject,

    /// Most urgent priority requested so far
    pub priority: Priority,

    /// When the request was first created; merges never change it
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub enqueued_at: DateTime<Utc>,

    /// Current lifecycle state
    pub state: RequestState,

    /// Error message of the failed execution, if any
    #[serde(default)]
    pub last_error: Option<String>,
}

impl IndexRequest {
    /// Create a new pending request.
    pub fn pending(lane: impl Into<String>, subject: Subject, priority: Priority) -> Self {
        Self {
            id: Ulid::new(),
            lane: lane.into(),
            subject,
            priority,
            enqueued_at: Utc::now(),
            state: RequestState::Pending,
            last_error: None,
        }
    }

    /// The dedupe key of this request.
    pub fn key(&self) -> RequestKey {
        RequestKey::new(self.lane.clone(), self.subject.clone())
    }

    pub fn is_pending(&self) -> bool {
        self.state == RequestState::Pending
    }

    /// Queue ordering: most urgent first, then oldest.
    pub fn runs_before(&self, other: &IndexRequest) -> bool {
        (self.priority, self.enqueued_at, self.id) < (other.priority, other.enqueued_at, other.id)
    }

    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

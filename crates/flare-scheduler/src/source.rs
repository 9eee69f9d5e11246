//! System-of-record lookup.

use async_trait::async_trait;
use flare_types::{DocumentBuildError, Indexable, Subject};

/// Resolves a subject to its live record at execution time.
///
/// `Ok(None)` means the record no longer exists and its document should be
/// removed from the index.
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn load(&self, subject: &Subject) -> Result<Option<Box<dyn Indexable>>, DocumentBuildError>;
}

//! Document adapter.
//!
//! Turns an [`Indexable`] record into a backend [`Document`] and derives the
//! stable unique id (`uid`) for a subject from its per-type profile.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use flare_types::{Document, DocumentBuildError, Indexable, Settings, Subject, TypeSettings, UID_FIELD};

use crate::scope::{self, ScopeFilter};

/// Callback run after a record of a type has been indexed.
pub type AfterIndexHook = Arc<dyn Fn(&dyn Indexable) + Send + Sync>;

/// Index configuration for one entity type.
#[derive(Clone, Default)]
pub struct IndexProfile {
    pub type_name: String,
    pub uid_prefix: Option<String>,
    pub scope: ScopeFilter,
    after_index: Option<AfterIndexHook>,
}

impl fmt::Debug for IndexProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexProfile")
            .field("type_name", &self.type_name)
            .field("uid_prefix", &self.uid_prefix)
            .field("scope", &self.scope)
            .field("after_index", &self.after_index.is_some())
            .finish()
    }
}

impl IndexProfile {
    /// Unscoped profile without a uid prefix.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ..Default::default()
        }
    }

    pub fn from_settings(type_name: impl Into<String>, settings: &TypeSettings) -> Self {
        Self {
            type_name: type_name.into(),
            uid_prefix: settings.uid_prefix.clone(),
            scope: ScopeFilter::new(settings.scope_fragments()),
            after_index: None,
        }
    }

    pub fn with_uid_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.uid_prefix = Some(prefix.into());
        self
    }

    pub fn with_scope(mut self, scope: impl Into<ScopeFilter>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn with_after_index<F>(mut self, hook: F) -> Self
    where
        F: Fn(&dyn Indexable) + Send + Sync + 'static,
    {
        self.after_index = Some(Arc::new(hook));
        self
    }

    /// `id` when the prefix is blank, `prefix-id` otherwise.
    pub fn uid(&self, id: &str) -> String {
        match self.uid_prefix.as_deref().map(str::trim) {
            Some(prefix) if !prefix.is_empty() => format!("{}-{}", prefix, id),
            _ => id.to_string(),
        }
    }

    /// `uid:<uid>`
    pub fn uid_query(&self, id: &str) -> String {
        scope::uid_clause(&self.uid(id))
    }

    pub(crate) fn run_after_index(&self, record: &dyn Indexable) {
        if let Some(hook) = &self.after_index {
            hook(record);
        }
    }
}

/// Renders records into documents using the registered type profiles.
///
/// Deterministic and side-effect free.
#[derive(Debug, Clone, Default)]
pub struct DocumentAdapter {
    profiles: HashMap<String, IndexProfile>,
    default_prefix: Option<String>,
}

impl DocumentAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build profiles for every type named in the settings.
    pub fn from_settings(settings: &Settings) -> Self {
        let profiles = settings
            .types
            .keys()
            .map(|name| {
                let profile = IndexProfile::from_settings(name.clone(), &settings.type_settings(name));
                (name.clone(), profile)
            })
            .collect();
        Self {
            profiles,
            default_prefix: settings.uid_prefix.clone(),
        }
    }

    /// Register (or replace) the profile for a type.
    pub fn register(&mut self, profile: IndexProfile) {
        self.profiles.insert(profile.type_name.clone(), profile);
    }

    /// Profile for a type; unregistered types get an unscoped profile carrying
    /// the default prefix.
    pub fn profile(&self, type_name: &str) -> IndexProfile {
        self.lookup(type_name).cloned().unwrap_or_else(|| IndexProfile {
            type_name: type_name.to_string(),
            uid_prefix: self.default_prefix.clone(),
            ..Default::default()
        })
    }

    pub fn uid(&self, subject_type: &str, subject_id: &str) -> String {
        match self.lookup(subject_type) {
            Some(profile) => profile.uid(subject_id),
            None => self.profile(subject_type).uid(subject_id),
        }
    }

    // Type names coming from environment config are lowercased.
    fn lookup(&self, type_name: &str) -> Option<&IndexProfile> {
        self.profiles.get(type_name).or_else(|| {
            self.profiles
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(type_name))
                .map(|(_, profile)| profile)
        })
    }

    pub fn subject_uid(&self, subject: &Subject) -> String {
        self.uid(&subject.type_name, &subject.id)
    }

    /// Render a record and stamp its uid.
    pub fn render(&self, record: &dyn Indexable) -> Result<Document, DocumentBuildError> {
        let subject = record.subject();
        if subject.id.trim().is_empty() {
            return Err(DocumentBuildError::missing(&subject, "id"));
        }
        let mut document = record.render_document()?;
        document.set(UID_FIELD, self.subject_uid(&subject));
        Ok(document)
    }
}

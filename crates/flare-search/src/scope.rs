//! Scope builder.
//!
//! Combines a per-type scope filter with ad-hoc query fragments into a single
//! backend query string.

use serde::{Deserialize, Serialize};

/// Ordered query fragments ANDed onto every query for a type.
///
/// An empty filter means the type operates index-wide.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeFilter {
    fragments: Vec<String>,
}

impl ScopeFilter {
    pub fn new(fragments: Vec<String>) -> Self {
        Self { fragments }
    }

    /// No scoping.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Scope `extra_query` to this filter. See [`build`].
    pub fn apply(&self, extra_query: &str) -> String {
        build(&self.fragments, extra_query)
    }

    /// The query removing the given uids within this (non-empty) scope.
    /// See [`delete_by_uids_query`].
    pub fn delete_query(&self, uids: &[String]) -> String {
        delete_by_uids_query(&self.fragments, uids)
    }
}

impl From<Vec<String>> for ScopeFilter {
    fn from(fragments: Vec<String>) -> Self {
        Self::new(fragments)
    }
}

/// Combine scope fragments with a query.
///
/// Returns `extra_query` unchanged when there are no fragments, otherwise
/// `(f1) AND (f2) AND ... AND (extra_query)`.
pub fn build<S: AsRef<str>>(scope_fragments: &[S], extra_query: &str) -> String {
    if scope_fragments.is_empty() {
        return extra_query.to_string();
    }
    let mut parts: Vec<String> = scope_fragments
        .iter()
        .map(|f| format!("({})", f.as_ref()))
        .collect();
    parts.push(format!("({})", extra_query));
    parts.join(" AND ")
}

/// `uid:<uid>`
pub fn uid_clause(uid: &str) -> String {
    format!("uid:{}", uid)
}

/// Scoped delete query for a set of uids.
///
/// A single uid yields `(scope) AND (uid:id)`; several yield one disjunction,
/// `(scope) AND (uid:id1 OR uid:id2 OR ...)`, so the backend parses one
/// clause group rather than one query per id.
pub fn delete_by_uids_query<S: AsRef<str>>(scope_fragments: &[S], uids: &[String]) -> String {
    match uids {
        [single] => build(scope_fragments, &uid_clause(single)),
        many => {
            let disjunction = many
                .iter()
                .map(|uid| uid_clause(uid))
                .collect::<Vec<_>>()
                .join(" OR ");
            build(scope_fragments, &disjunction)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_build_without_scope_is_identity() {
        let empty: [&str; 0] = [];
        assert_eq!(build(&empty, "uid:5"), "uid:5");
    }

    #[test]
    fn test_build_with_scope() {
        assert_eq!(build(&["tree:foo"], "uid:5"), "(tree:foo) AND (uid:5)");
        assert_eq!(
            build(&["tree:foo", "tenant:7"], "title:bar"),
            "(tree:foo) AND (tenant:7) AND (title:bar)"
        );
    }

    #[test]
    fn test_delete_single_uid() {
        let uids = vec!["art-1".to_string()];
        assert_eq!(
            delete_by_uids_query(&["tree:art"], &uids),
            "(tree:art) AND (uid:art-1)"
        );
    }

    #[test]
    fn test_delete_multiple_uids() {
        let uids = vec!["art-1".to_string(), "art-2".to_string(), "art-3".to_string()];
        assert_eq!(
            delete_by_uids_query(&["tree:art"], &uids),
            "(tree:art) AND (uid:art-1 OR uid:art-2 OR uid:art-3)"
        );
    }

    #[test]
    fn test_scope_filter_wrappers() {
        let scope = ScopeFilter::new(vec!["tree:art".to_string()]);
        assert!(!scope.is_empty());
        assert_eq!(scope.apply("*:*"), "(tree:art) AND (*:*)");
        assert_eq!(
            scope.delete_query(&["a".to_string(), "b".to_string()]),
            "(tree:art) AND (uid:a OR uid:b)"
        );
        assert!(ScopeFilter::none().is_empty());
        assert_eq!(ScopeFilter::none().apply("q"), "q");
    }
}

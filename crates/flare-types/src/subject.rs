//! Subject identity and request priority.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The (type, id) pair identifying a record to be indexed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Subject {
    /// Entity type name, e.g. "Article"
    pub type_name: String,
    /// Primary key of the record within its type
    pub id: String,
}

impl Subject {
    /// Create a new subject.
    pub fn new(type_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.type_name, self.id)
    }
}

/// Urgency of an index request. Lower values are more urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(pub i32);

impl Priority {
    pub const HIGH: Priority = Priority(0);
    pub const MEDIUM: Priority = Priority(3);
    pub const LOW: Priority = Priority(6);

    /// True when `self` should run before `other`.
    pub fn is_more_urgent_than(self, other: Priority) -> bool {
        self.0 < other.0
    }

    /// The more urgent of two priorities.
    pub fn most_urgent(self, other: Priority) -> Priority {
        if other.is_more_urgent_than(self) {
            other
        } else {
            self
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::MEDIUM
    }
}

impl From<i32> for Priority {
    fn from(value: i32) -> Self {
        Priority(value)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_display() {
        let subject = Subject::new("Article", "42");
        assert_eq!(subject.to_string(), "Article#42");
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::HIGH.is_more_urgent_than(Priority::MEDIUM));
        assert!(Priority::MEDIUM.is_more_urgent_than(Priority::LOW));
        assert!(!Priority::LOW.is_more_urgent_than(Priority::LOW));
        assert!(Priority::HIGH < Priority::LOW);
    }

    #[test]
    fn test_most_urgent() {
        assert_eq!(Priority::LOW.most_urgent(Priority::HIGH), Priority::HIGH);
        assert_eq!(Priority::HIGH.most_urgent(Priority::LOW), Priority::HIGH);
        assert_eq!(Priority(-2).most_urgent(Priority::HIGH), Priority(-2));
    }

    #[test]
    fn test_priority_serializes_as_integer() {
        let json = serde_json::to_string(&Priority::MEDIUM).unwrap();
        assert_eq!(json, "3");
        let back: Priority = serde_json::from_str("6").unwrap();
        assert_eq!(back, Priority::LOW);
    }
}

//! Error types shared across the flare crates.

use thiserror::Error;

/// Unified error type for configuration and setup.
#[derive(Debug, Error)]
pub enum FlareError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid input error
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// A record could not be rendered into a backend document.
///
/// This only ever aborts the execution for a single subject.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DocumentBuildError {
    /// A field the index requires is missing on the record
    #[error("{subject}: missing required field '{field}'")]
    MissingField { subject: String, field: String },

    /// A field is present but cannot be represented
    #[error("{subject}: invalid field '{field}': {reason}")]
    InvalidField {
        subject: String,
        field: String,
        reason: String,
    },

    /// The record could not be loaded from the system of record
    #[error("{subject}: record could not be loaded: {reason}")]
    Load { subject: String, reason: String },
}

impl DocumentBuildError {
    /// Convenience constructor for a missing field.
    pub fn missing(subject: impl ToString, field: impl Into<String>) -> Self {
        DocumentBuildError::MissingField {
            subject: subject.to_string(),
            field: field.into(),
        }
    }

    /// Convenience constructor for a load failure.
    pub fn load(subject: impl ToString, reason: impl Into<String>) -> Self {
        DocumentBuildError::Load {
            subject: subject.to_string(),
            reason: reason.into(),
        }
    }
}

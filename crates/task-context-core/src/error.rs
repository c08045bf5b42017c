//! Error taxonomy for engine operations.
//!
//! Validation failures are raised before any write. A failing store call
//! surfaces as [`EngineError::Store`]; the surrounding transaction is then
//! dropped uncommitted, which rolls back every partial change.

use thiserror::Error;

/// Errors returned by hierarchy, dependency, resource, and context operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A referenced task, parent, or resource does not exist.
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    /// A unique value (task code) is already taken.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The request is well-formed but not allowed in the current state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// The request carries a malformed or out-of-range value.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The backing store failed.
    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),

    /// The answer-generation collaborator failed.
    #[error("answer generation failed: {0}")]
    Answer(#[source] anyhow::Error),
}

impl EngineError {
    pub fn task_not_found(key: impl ToString) -> Self {
        Self::NotFound {
            kind: "task",
            key: key.to_string(),
        }
    }

    pub fn resource_not_found(key: impl ToString) -> Self {
        Self::NotFound {
            kind: "resource",
            key: key.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result alias used across the core crate.
pub type Result<T> = std::result::Result<T, EngineError>;

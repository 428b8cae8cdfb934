//! Error taxonomy for the persistence subsystem.
//!
//! Every failure is returned to the immediate caller with enough
//! structure (operation, key/id, version) to build a diagnostic
//! message and pick a response status. Nothing is logged or swallowed
//! at this layer.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by the store backends and the managers built on them.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached at connect time. Fatal to
    /// startup; surfaced immediately.
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),

    /// A single backend operation failed. Carries the operation name
    /// and the key it was applied to. Not retried internally; retry
    /// policy belongs to the caller.
    #[error("storage operation {op} failed for key {key:?}: {message}")]
    Backend {
        op: &'static str,
        key: String,
        message: String,
    },

    /// A stored value could not be deserialized.
    #[error("corrupt value at key {key:?}")]
    Corruption {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// No live session with the given id.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// No live plan record with the given id.
    #[error("plan not found: {0}")]
    PlanNotFound(String),

    /// The plan record exists but has no such version.
    #[error("plan {plan_id} has no version {version}")]
    VersionNotFound { plan_id: String, version: u32 },

    /// A plan record with this id already exists.
    #[error("plan already exists: {0}")]
    PlanExists(String),
}

impl StoreError {
    /// Build a [`StoreError::Backend`] from any displayable cause.
    pub fn backend(op: &'static str, key: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::Backend {
            op,
            key: key.into(),
            message: cause.to_string(),
        }
    }

    /// Build a [`StoreError::Corruption`] for a key.
    pub fn corruption(key: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Corruption {
            key: key.into(),
            source,
        }
    }
}

//! Error taxonomy for catalog version mutation.
//!
//! Remote failures are classified into the four outcomes callers act on:
//! the resource is gone, the write lost an optimistic-concurrency race,
//! validation reached a failed terminal state, or the transport/API broke.
//! The remaining variants are local precondition failures.

use crate::model::{RevisionTag, ValidationState};

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CatalogError>;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Revision conflict on {locator}: expected revision {expected} is stale")]
    Conflict {
        locator: String,
        expected: RevisionTag,
    },

    #[error("Validation ended in state {state}: {message}")]
    ValidationFailed {
        state: ValidationState,
        message: String,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Catalog API error: HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Invalid version locator: {0}")]
    InvalidLocator(String),

    #[error("Refusing to submit an empty patch for {0}")]
    EmptyPatch(String),

    #[error("Catalog returned {0} without a revision tag")]
    MissingRevision(String),

    #[error("Validation of {locator} did not finish within {waited_secs}s")]
    DeadlineExceeded { locator: String, waited_secs: u64 },

    #[error("Validation polling of {0} was cancelled")]
    Cancelled(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CatalogError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// True when the upstream resource no longer exists.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// True when a write carried a stale revision tag.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Only conflicts are retryable, and only by restarting the whole
    /// read-modify-write cycle.
    pub fn is_retryable(&self) -> bool {
        self.is_conflict()
    }
}

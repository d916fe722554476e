//! The shared error taxonomy.
//!
//! All layers return this one enum: the lifecycle contract surfaces it
//! directly to the request layer, and the reconciler uses `NotFound` from
//! individual store steps to detect stale references.

use thiserror::Error;

use crate::types::{Collection, RecordId};

/// Result type alias for tasksync operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for tasksync operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The primary record of an operation does not resolve.
    #[error("no {collection} record with id '{id}'")]
    NotFound {
        collection: Collection,
        id: RecordId,
    },

    /// A supplied assignment target is well-formed but does not exist.
    #[error("assigned user '{id}' does not exist")]
    InvalidReference { id: RecordId },

    /// Duplicate email on user create/update.
    #[error("a user with email '{email}' already exists")]
    Conflict { email: String },

    /// Missing or empty required field.
    #[error("validation failed: {reason}")]
    ValidationFailed { reason: String },

    /// A reconciliation sub-step found its target already gone. Swallowed
    /// per sub-step and recorded in the sync outcome, never surfaced as a
    /// request failure.
    #[error("{collection} record '{id}' disappeared during reconciliation")]
    StaleReference {
        collection: Collection,
        id: RecordId,
    },

    /// Store-internal failure (serialization, backend I/O).
    #[error("store operation '{operation}' failed: {reason}")]
    Backend { operation: String, reason: String },
}

impl Error {
    /// Create a not found error.
    pub fn not_found(collection: Collection, id: RecordId) -> Self {
        Self::NotFound { collection, id }
    }

    /// Create an invalid reference error.
    pub fn invalid_reference(id: RecordId) -> Self {
        Self::InvalidReference { id }
    }

    /// Create a duplicate email conflict.
    pub fn conflict(email: impl Into<String>) -> Self {
        Self::Conflict {
            email: email.into(),
        }
    }

    /// Create a validation error.
    pub fn validation_failed(reason: impl Into<String>) -> Self {
        Self::ValidationFailed {
            reason: reason.into(),
        }
    }

    /// Create a stale reference error.
    pub fn stale_reference(collection: Collection, id: RecordId) -> Self {
        Self::StaleReference { collection, id }
    }

    /// Create a backend error.
    pub fn backend(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Backend {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error means a record id failed to resolve.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

//! User records and their typed inputs.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{Collection, Record, RecordId};

/// A user document as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(rename = "_id")]
    pub id: RecordId,
    pub name: String,
    /// Unique across users (best-effort check-then-insert guard).
    pub email: String,
    /// Ids of the incomplete tasks assigned to this user.
    #[serde(rename = "pendingTasks", default)]
    pub pending_tasks: BTreeSet<RecordId>,
    #[serde(rename = "dateCreated")]
    pub date_created: DateTime<Utc>,
}

impl Record for UserRecord {
    const COLLECTION: Collection = Collection::Users;

    fn id(&self) -> RecordId {
        self.id
    }
}

/// Typed input for user creation.
#[derive(Debug, Clone)]
pub struct UserDraft {
    /// Display name. Required, non-empty.
    pub name: String,
    /// Email. Required, non-empty, unique across users.
    pub email: String,
}

impl UserDraft {
    /// Create a draft with the required fields.
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// Check required fields.
    ///
    /// # Errors
    ///
    /// Returns `ValidationFailed` when the name or email is empty.
    pub fn validate(&self) -> Result<()> {
        validate_core_fields(&self.name, &self.email)
    }
}

/// Shared required-field check for user create and update.
///
/// # Errors
///
/// Returns `ValidationFailed` when the name or email is empty.
pub fn validate_core_fields(name: &str, email: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::validation_failed("name is required"));
    }
    if email.trim().is_empty() {
        return Err(Error::validation_failed("email is required"));
    }
    Ok(())
}

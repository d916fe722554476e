//! Task records and their typed inputs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{Collection, Record, RecordId};

/// Cached assignee name carried by tasks that have no assignee.
pub const UNASSIGNED: &str = "unassigned";

/// A task document as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    #[serde(rename = "_id")]
    pub id: RecordId,
    pub name: String,
    pub deadline: DateTime<Utc>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub completed: bool,
    /// `None` means unassigned; stored as the empty string.
    #[serde(rename = "assignedUser", with = "user_ref", default)]
    pub assigned_user: Option<RecordId>,
    /// Cached display name of the assignee as of this task's last write.
    /// May lag a user rename until the task is next touched.
    #[serde(rename = "assignedUserName", default = "default_user_name")]
    pub assigned_user_name: String,
    #[serde(rename = "dateCreated")]
    pub date_created: DateTime<Utc>,
}

fn default_user_name() -> String {
    UNASSIGNED.to_string()
}

impl Record for TaskRecord {
    const COLLECTION: Collection = Collection::Tasks;

    fn id(&self) -> RecordId {
        self.id
    }
}

/// Typed input for task creation.
#[derive(Debug, Clone)]
pub struct TaskDraft {
    /// Task name. Required, non-empty.
    pub name: String,
    /// Deadline. Required.
    pub deadline: DateTime<Utc>,
    /// Description, defaults empty.
    pub description: String,
    /// Completion flag, defaults false.
    pub completed: bool,
    /// Assignment target, if any.
    pub assigned_user: Option<RecordId>,
    /// Caller-supplied cached assignee name. Resolved from the user record
    /// when absent.
    pub assigned_user_name: Option<String>,
}

impl TaskDraft {
    /// Create a draft with the required fields.
    pub fn new(name: impl Into<String>, deadline: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            deadline,
            description: String::new(),
            completed: false,
            assigned_user: None,
            assigned_user_name: None,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the completion flag.
    pub fn with_completed(mut self, completed: bool) -> Self {
        self.completed = completed;
        self
    }

    /// Set the assignment target.
    pub fn with_assigned_user(mut self, user_id: RecordId) -> Self {
        self.assigned_user = Some(user_id);
        self
    }

    /// Supply the cached assignee name instead of resolving it.
    pub fn with_assigned_user_name(mut self, name: impl Into<String>) -> Self {
        self.assigned_user_name = Some(name.into());
        self
    }

    /// Check required fields.
    ///
    /// # Errors
    ///
    /// Returns `ValidationFailed` when the name is empty.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation_failed("name is required"));
        }
        Ok(())
    }
}

/// Typed input for a full task update (PUT semantics: every mutable field
/// is replaced).
#[derive(Debug, Clone)]
pub struct TaskUpdate {
    pub name: String,
    pub deadline: DateTime<Utc>,
    pub description: String,
    pub completed: bool,
    pub assigned_user: Option<RecordId>,
}

impl TaskUpdate {
    /// Create an update with the required fields.
    pub fn new(name: impl Into<String>, deadline: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            deadline,
            description: String::new(),
            completed: false,
            assigned_user: None,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the completion flag.
    pub fn with_completed(mut self, completed: bool) -> Self {
        self.completed = completed;
        self
    }

    /// Set the assignment target.
    pub fn with_assigned_user(mut self, user_id: RecordId) -> Self {
        self.assigned_user = Some(user_id);
        self
    }

    /// Clear the assignment target.
    pub fn unassigned(mut self) -> Self {
        self.assigned_user = None;
        self
    }

    /// Check required fields.
    ///
    /// # Errors
    ///
    /// Returns `ValidationFailed` when the name is empty.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation_failed("name is required"));
        }
        Ok(())
    }
}

/// Serde adapter for the `assignedUser` wire shape: the empty string (or a
/// missing/null field) means unassigned.
mod user_ref {
    use std::str::FromStr;

    use serde::{Deserialize, Deserializer, Serializer};

    use crate::types::RecordId;

    pub fn serialize<S: Serializer>(
        value: &Option<RecordId>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(id) => serializer.serialize_str(&id.to_string()),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<RecordId>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw.as_deref() {
            None | Some("") => Ok(None),
            Some(s) => RecordId::from_str(s)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}

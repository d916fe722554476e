//! Identifiers, collections, and the document bridge.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use ulid::Ulid;

use crate::error::{Error, Result};

/// The document form a store backend works with.
pub type Document = serde_json::Value;

/// Unique identifier for a stored record.
///
/// Opaque to callers; assigned by the store on insert and immutable after.
/// Serializes as the 26-character ULID string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(Ulid);

impl RecordId {
    /// Create a new random record ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Create from a ULID.
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    /// Get the inner ULID.
    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RecordId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ulid::from_string(s).map(Self)
    }
}

/// The two entity collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Collection {
    /// Task records.
    Tasks,
    /// User records.
    Users,
}

impl Collection {
    /// Collection name as stored.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Tasks => "tasks",
            Self::Users => "users",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Document field names shared across layers.
pub mod fields {
    pub const ID: &str = "_id";
    pub const NAME: &str = "name";
    pub const EMAIL: &str = "email";
    pub const DEADLINE: &str = "deadline";
    pub const DESCRIPTION: &str = "description";
    pub const COMPLETED: &str = "completed";
    pub const ASSIGNED_USER: &str = "assignedUser";
    pub const ASSIGNED_USER_NAME: &str = "assignedUserName";
    pub const PENDING_TASKS: &str = "pendingTasks";
    pub const DATE_CREATED: &str = "dateCreated";
}

/// Bridge between typed records and the document form a backend stores.
pub trait Record: Serialize + DeserializeOwned + Send + Sync {
    /// Collection this record lives in.
    const COLLECTION: Collection;

    /// The record's identifier.
    fn id(&self) -> RecordId;

    /// Convert to the stored document form.
    fn to_document(&self) -> Result<Document> {
        serde_json::to_value(self).map_err(|e| Error::backend("serialize", e.to_string()))
    }

    /// Decode from the stored document form.
    fn from_document(doc: Document) -> Result<Self> {
        serde_json::from_value(doc).map_err(|e| Error::backend("deserialize", e.to_string()))
    }
}

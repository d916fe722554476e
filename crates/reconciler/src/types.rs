//! Action and outcome types for assignment reconciliation.

use serde::{Deserialize, Serialize};

use tasksync_core::RecordId;
use tasksync_store::FieldSet;

/// One per-document atomic step of a reconciliation plan.
///
/// Every variant maps onto exactly one idempotent store call, so replaying
/// a whole plan after an interruption lands in the same final state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SyncAction {
    /// Add task ids to a user's pending set.
    AddPending {
        user_id: RecordId,
        task_ids: Vec<RecordId>,
    },
    /// Remove task ids from a user's pending set.
    PullPending {
        user_id: RecordId,
        task_ids: Vec<RecordId>,
    },
    /// Set fields on a task document.
    WriteTaskFields { task_id: RecordId, fields: FieldSet },
}

impl SyncAction {
    /// Get a description of the action.
    pub fn description(&self) -> String {
        match self {
            Self::AddPending { user_id, task_ids } => {
                format!("add {} task(s) to pending set of user {user_id}", task_ids.len())
            }
            Self::PullPending { user_id, task_ids } => {
                format!(
                    "pull {} task(s) from pending set of user {user_id}",
                    task_ids.len()
                )
            }
            Self::WriteTaskFields { task_id, fields } => {
                format!("write {} field(s) on task {task_id}", fields.len())
            }
        }
    }
}

/// Result of applying a reconciliation plan.
#[derive(Debug, Clone, Default)]
pub struct SyncOutcome {
    /// Steps that reached their target.
    pub applied: Vec<SyncAction>,
    /// Steps skipped because their target was already gone, with the
    /// reason. Logged, recorded here, never surfaced as a request failure.
    pub skipped: Vec<(SyncAction, String)>,
}

impl SyncOutcome {
    /// Create an empty outcome.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether every planned step reached its target.
    pub fn converged(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Desired end state for one task's assignment, paired with what the task
/// document held before.
#[derive(Debug, Clone)]
pub struct AssignmentChange {
    pub task_id: RecordId,
    /// Assignee on the task document before this operation.
    pub previous_user: Option<RecordId>,
    /// Completion flag before this operation.
    pub previous_completed: bool,
    /// Desired assignee.
    pub new_user: Option<RecordId>,
    /// Desired completion flag.
    pub new_completed: bool,
    /// Display name to cache on the task for the desired assignee
    /// (`UNASSIGNED` when there is none).
    pub new_user_name: String,
    /// Further task fields persisted together with the assignment fields.
    pub extra_fields: FieldSet,
}

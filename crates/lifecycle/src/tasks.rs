//! Task lifecycle operations.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use tasksync_core::{
    fields, Collection, Document, Error, RecordId, Result, TaskDraft, TaskRecord, TaskUpdate,
    UserRecord, UNASSIGNED,
};
use tasksync_reconciler::{AssignmentChange, AssignmentReconciler};
use tasksync_store::{EntityStore, EntityStoreExt, FieldSet, Filter, FindQuery};

/// Task create/update/delete orchestration plus pass-through reads.
///
/// Loads current state, validates typed input, and delegates every
/// cross-entity effect to the reconciler. Constructed with an injected
/// store handle.
pub struct TaskLifecycleOps {
    store: Arc<dyn EntityStore>,
    reconciler: AssignmentReconciler,
}

/// Insert shape for a new task; the store assigns `_id`.
#[derive(Serialize)]
struct NewTaskDocument<'a> {
    name: &'a str,
    deadline: DateTime<Utc>,
    description: &'a str,
    completed: bool,
    #[serde(rename = "assignedUser")]
    assigned_user: String,
    #[serde(rename = "assignedUserName")]
    assigned_user_name: &'a str,
    #[serde(rename = "dateCreated")]
    date_created: DateTime<Utc>,
}

impl TaskLifecycleOps {
    /// Create the ops layer over a store handle.
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        let reconciler = AssignmentReconciler::new(store.clone());
        Self { store, reconciler }
    }

    /// Create a task.
    ///
    /// When the draft names an assignee, that user must exist
    /// (`InvalidReference` otherwise) and its display name is cached on the
    /// task unless the draft already carries one. An incomplete assigned
    /// task lands in the assignee's pending set via the reconciler's
    /// add-path.
    ///
    /// # Errors
    ///
    /// `ValidationFailed`, `InvalidReference`; backend failures propagate.
    pub async fn create(&self, draft: TaskDraft) -> Result<TaskRecord> {
        draft.validate()?;

        let assigned_user_name = match draft.assigned_user {
            Some(user_id) => {
                let user = self.resolve_assignee(user_id).await?;
                draft.assigned_user_name.clone().unwrap_or(user.name)
            }
            // The cache only ever names an actual assignee.
            None => UNASSIGNED.to_string(),
        };

        let document = serde_json::to_value(NewTaskDocument {
            name: &draft.name,
            deadline: draft.deadline,
            description: &draft.description,
            completed: draft.completed,
            assigned_user: draft
                .assigned_user
                .map(|u| u.to_string())
                .unwrap_or_default(),
            assigned_user_name: &assigned_user_name,
            date_created: Utc::now(),
        })
        .map_err(|e| Error::backend("serialize", e.to_string()))?;

        let task: TaskRecord = self.store.insert_record(document).await?;
        info!(task_id = %task.id, assigned = ?task.assigned_user, "Task created");

        if task.assigned_user.is_some() && !task.completed {
            let change = AssignmentChange {
                task_id: task.id,
                previous_user: None,
                previous_completed: false,
                new_user: task.assigned_user,
                new_completed: task.completed,
                new_user_name: task.assigned_user_name.clone(),
                extra_fields: FieldSet::new(),
            };
            self.reconciler.reconcile_task_assignment(change).await?;
        }
        Ok(task)
    }

    /// Update a task (full replace of its mutable fields).
    ///
    /// Resolving the assignee refreshes the cached display name, so a user
    /// rename catches up whenever the task is next touched. The whole write
    /// is delegated to the reconciler, which keeps the task document write
    /// as the last step of the plan.
    ///
    /// # Errors
    ///
    /// `NotFound`, `ValidationFailed`, `InvalidReference`; backend failures
    /// propagate.
    pub async fn update(&self, task_id: RecordId, update: TaskUpdate) -> Result<TaskRecord> {
        update.validate()?;
        let previous: TaskRecord = self.store.get_record(task_id).await?;

        let new_user_name = match update.assigned_user {
            Some(user_id) => self.resolve_assignee(user_id).await?.name,
            None => UNASSIGNED.to_string(),
        };

        let extra_fields = FieldSet::new()
            .set(fields::NAME, json!(update.name))
            .set(fields::DEADLINE, json!(update.deadline))
            .set(fields::DESCRIPTION, json!(update.description));

        let change = AssignmentChange {
            task_id,
            previous_user: previous.assigned_user,
            previous_completed: previous.completed,
            new_user: update.assigned_user,
            new_completed: update.completed,
            new_user_name,
            extra_fields,
        };
        self.reconciler.reconcile_task_assignment(change).await?;

        // The task is the primary entity: if it vanished mid-plan, the
        // caller gets NotFound even though the memberships converged.
        self.store.get_record(task_id).await
    }

    /// Delete a task, pulling it from its assignee's pending set first.
    ///
    /// Deleting a task that is already gone reports `NotFound`.
    ///
    /// # Errors
    ///
    /// `NotFound`; backend failures propagate.
    pub async fn delete(&self, task_id: RecordId) -> Result<TaskRecord> {
        let task: TaskRecord = self.store.get_record(task_id).await?;
        self.reconciler.detach_task(&task).await?;
        let deleted = self.store.delete_record::<TaskRecord>(task_id).await?;
        info!(task_id = %task_id, "Task deleted");
        Ok(deleted)
    }

    /// Point read.
    ///
    /// # Errors
    ///
    /// `NotFound`; backend failures propagate.
    pub async fn get(&self, task_id: RecordId) -> Result<TaskRecord> {
        self.store.get_record(task_id).await
    }

    /// Filtered scan. Returns raw documents so projections pass through.
    ///
    /// # Errors
    ///
    /// Backend failures propagate.
    pub async fn list(&self, query: FindQuery) -> Result<Vec<Document>> {
        self.store.find(Collection::Tasks, query).await
    }

    /// Count tasks matching a filter.
    ///
    /// # Errors
    ///
    /// Backend failures propagate.
    pub async fn count(&self, filter: Filter) -> Result<u64> {
        self.store.count(Collection::Tasks, filter).await
    }

    async fn resolve_assignee(&self, user_id: RecordId) -> Result<UserRecord> {
        self.store.get_record(user_id).await.map_err(|e| {
            if e.is_not_found() {
                Error::invalid_reference(user_id)
            } else {
                e
            }
        })
    }
}

//! Reconciler implementation.

use std::collections::BTreeSet;
use std::sync::Arc;

use itertools::{Either, Itertools};
use serde_json::json;
use tracing::{debug, info, warn};

use tasksync_core::{
    fields, Collection, Error, RecordId, Result, TaskRecord, UserRecord, UNASSIGNED,
};
use tasksync_store::{EntityStore, EntityStoreExt, FieldSet, Filter, FindQuery};

use crate::types::{AssignmentChange, SyncAction, SyncOutcome};

/// Restores the task/user invariant after an assignment change, using only
/// per-document atomic steps.
///
/// There is no transaction below this type. A plan is a sequence of
/// idempotent steps applied in order; a crash partway through leaves the
/// task document naming its old assignee, and
/// [`rebuild_pending_tasks`](Self::rebuild_pending_tasks) recovers the
/// memberships from the tasks collection, which is the source of truth.
pub struct AssignmentReconciler {
    store: Arc<dyn EntityStore>,
}

impl AssignmentReconciler {
    /// Create a reconciler over a store handle.
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// Compute the plan for one task's assignment change.
    ///
    /// Membership steps come first and the task write last, so an
    /// interrupted plan leaves the task document authoritative for a later
    /// rebuild.
    pub fn plan_task_assignment(change: &AssignmentChange) -> Vec<SyncAction> {
        let mut actions = Vec::new();

        // 1. Leaving a previous assignee: drop the membership there.
        if let Some(previous) = change.previous_user {
            if change.new_user != Some(previous) {
                actions.push(SyncAction::PullPending {
                    user_id: previous,
                    task_ids: vec![change.task_id],
                });
            }
        }

        // 2. Membership on the new assignee. A completed task is pulled
        // even if it was already assigned there, so a task marked done is
        // never left pending.
        if let Some(new_user) = change.new_user {
            if change.new_completed {
                actions.push(SyncAction::PullPending {
                    user_id: new_user,
                    task_ids: vec![change.task_id],
                });
            } else {
                actions.push(SyncAction::AddPending {
                    user_id: new_user,
                    task_ids: vec![change.task_id],
                });
            }
        }

        // 3. The task document write, last.
        let task_fields =
            merge_assignment(change.extra_fields.clone(), change.new_user, &change.new_user_name)
                .set(fields::COMPLETED, json!(change.new_completed));
        actions.push(SyncAction::WriteTaskFields {
            task_id: change.task_id,
            fields: task_fields,
        });

        actions
    }

    /// Reconcile one task's assignment end to end.
    ///
    /// # Errors
    ///
    /// Propagates backend failures. A step whose target is already gone is
    /// skipped and recorded in the outcome instead of failing.
    pub async fn reconcile_task_assignment(
        &self,
        change: AssignmentChange,
    ) -> Result<SyncOutcome> {
        debug!(
            task_id = %change.task_id,
            previous = ?change.previous_user,
            new = ?change.new_user,
            completed = change.new_completed,
            "Reconciling task assignment"
        );
        let actions = Self::plan_task_assignment(&change);
        self.apply(actions).await
    }

    /// Replace a user's pending set wholesale.
    ///
    /// Best effort: the task lookups and the writes that follow are not one
    /// atomic unit. A concurrent writer to the same tasks wins on the task
    /// document, and a later rebuild squares the memberships.
    ///
    /// # Errors
    ///
    /// `NotFound` when the user does not exist; backend failures propagate.
    pub async fn reconcile_pending_set(
        &self,
        user_id: RecordId,
        desired: &BTreeSet<RecordId>,
    ) -> Result<SyncOutcome> {
        let user: UserRecord = self.store.get_record(user_id).await?;
        let current = &user.pending_tasks;

        let to_remove: Vec<RecordId> = current.difference(desired).copied().collect();
        let to_add: Vec<RecordId> = desired.difference(current).copied().collect();
        debug!(
            user_id = %user_id,
            add = to_add.len(),
            remove = to_remove.len(),
            "Replacing pending set"
        );

        let mut actions = Vec::new();
        if !to_remove.is_empty() {
            actions.push(SyncAction::PullPending {
                user_id,
                task_ids: to_remove.clone(),
            });
        }

        // Unassign removed tasks only while they still point at this user;
        // a task concurrently reassigned elsewhere keeps its new owner.
        for task_id in &to_remove {
            match self.store.get_record::<TaskRecord>(*task_id).await {
                Ok(task) if task.assigned_user == Some(user_id) => {
                    actions.push(SyncAction::WriteTaskFields {
                        task_id: *task_id,
                        fields: merge_assignment(FieldSet::new(), None, UNASSIGNED),
                    });
                }
                Ok(_) => {}
                // Already gone: the membership pull above drops the id.
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }

        // Look up the adds. A task that does not exist cannot be adopted;
        // record the write that was not planned as a skipped step.
        let mut adopted: Vec<TaskRecord> = Vec::new();
        let mut unresolved: Vec<(SyncAction, String)> = Vec::new();
        for task_id in &to_add {
            match self.store.get_record::<TaskRecord>(*task_id).await {
                Ok(task) => adopted.push(task),
                Err(e) if e.is_not_found() => {
                    warn!(task_id = %task_id, "Desired pending task does not exist, skipping");
                    unresolved.push((
                        SyncAction::WriteTaskFields {
                            task_id: *task_id,
                            fields: merge_assignment(FieldSet::new(), Some(user_id), &user.name),
                        },
                        Error::stale_reference(Collection::Tasks, *task_id).to_string(),
                    ));
                }
                Err(e) => return Err(e),
            }
        }

        // Pull adopted tasks out of their previous owners' pending sets.
        let by_previous_owner = adopted
            .iter()
            .filter_map(|task| {
                task.assigned_user
                    .filter(|owner| *owner != user_id)
                    .map(|owner| (owner, task.id))
            })
            .into_group_map();
        for (owner, task_ids) in by_previous_owner {
            actions.push(SyncAction::PullPending {
                user_id: owner,
                task_ids,
            });
        }

        // Reassign every adopted task to this user.
        for task in &adopted {
            actions.push(SyncAction::WriteTaskFields {
                task_id: task.id,
                fields: merge_assignment(FieldSet::new(), Some(user_id), &user.name),
            });
        }

        // Membership last: incomplete adopted tasks join the pending set,
        // completed ones are pulled in case a stale id lingers.
        let (open, done): (Vec<RecordId>, Vec<RecordId>) =
            adopted.iter().partition_map(|task| {
                if task.completed {
                    Either::Right(task.id)
                } else {
                    Either::Left(task.id)
                }
            });
        if !open.is_empty() {
            actions.push(SyncAction::AddPending {
                user_id,
                task_ids: open,
            });
        }
        if !done.is_empty() {
            actions.push(SyncAction::PullPending {
                user_id,
                task_ids: done,
            });
        }

        let mut outcome = self.apply(actions).await?;
        outcome.skipped.extend(unresolved);
        Ok(outcome)
    }

    /// Drop a task's membership from its assignee's pending set. Cascade
    /// step for task deletion.
    ///
    /// # Errors
    ///
    /// Backend failures propagate; a vanished assignee is a recorded skip.
    pub async fn detach_task(&self, task: &TaskRecord) -> Result<SyncOutcome> {
        let Some(user_id) = task.assigned_user else {
            return Ok(SyncOutcome::new());
        };
        self.apply(vec![SyncAction::PullPending {
            user_id,
            task_ids: vec![task.id],
        }])
        .await
    }

    /// Clear the assignment of every task currently referencing a user.
    /// Cascade step for user deletion.
    ///
    /// # Errors
    ///
    /// Backend failures propagate; tasks deleted concurrently are recorded
    /// skips.
    pub async fn unassign_all(&self, user_id: RecordId) -> Result<SyncOutcome> {
        let tasks: Vec<TaskRecord> = self
            .store
            .find_records(FindQuery::new().with_filter(
                Filter::new().eq(fields::ASSIGNED_USER, user_id.to_string()),
            ))
            .await?;
        info!(user_id = %user_id, tasks = tasks.len(), "Unassigning all tasks of user");
        let actions = tasks
            .iter()
            .map(|task| SyncAction::WriteTaskFields {
                task_id: task.id,
                fields: merge_assignment(FieldSet::new(), None, UNASSIGNED),
            })
            .collect();
        self.apply(actions).await
    }

    /// Recompute a user's pending set from the tasks collection.
    ///
    /// The authoritative recovery: whatever interrupted plans came before,
    /// tasks with `assignedUser = user, completed = false` are the truth
    /// and the membership set is overwritten to match. Cached assignee
    /// names on tasks are left as they are.
    ///
    /// # Errors
    ///
    /// `NotFound` when the user does not exist; backend failures propagate.
    pub async fn rebuild_pending_tasks(&self, user_id: RecordId) -> Result<UserRecord> {
        let tasks: Vec<TaskRecord> = self
            .store
            .find_records(
                FindQuery::new().with_filter(
                    Filter::new()
                        .eq(fields::ASSIGNED_USER, user_id.to_string())
                        .eq(fields::COMPLETED, false),
                ),
            )
            .await?;
        let pending: BTreeSet<RecordId> = tasks.iter().map(|task| task.id).collect();
        info!(user_id = %user_id, pending = pending.len(), "Rebuilding pending set from tasks");
        self.store
            .update_record(
                user_id,
                FieldSet::new().set(fields::PENDING_TASKS, json!(pending)),
            )
            .await
    }

    /// Rebuild every user's pending set, paging through the users
    /// collection.
    ///
    /// # Errors
    ///
    /// Backend failures propagate; users deleted mid-audit are skipped.
    pub async fn rebuild_all(&self, config: &AuditConfig) -> Result<AuditReport> {
        let mut report = AuditReport::default();
        let mut skip = 0;
        loop {
            let page: Vec<UserRecord> = self
                .store
                .find_records(FindQuery::new().with_skip(skip).with_limit(config.page_size))
                .await?;
            let page_len = page.len() as u64;
            for user in page {
                report.users_scanned += 1;
                let before = user.pending_tasks.clone();
                match self.rebuild_pending_tasks(user.id).await {
                    Ok(rebuilt) if rebuilt.pending_tasks != before => {
                        report.users_repaired += 1;
                    }
                    Ok(_) => {}
                    Err(e) if e.is_not_found() => {
                        warn!(user_id = %user.id, "User vanished during audit");
                    }
                    Err(e) => return Err(e),
                }
            }
            if page_len < config.page_size {
                break;
            }
            skip += config.page_size;
        }
        info!(
            scanned = report.users_scanned,
            repaired = report.users_repaired,
            "Audit complete"
        );
        Ok(report)
    }

    /// Apply a plan step by step, skipping steps whose target is gone.
    ///
    /// # Errors
    ///
    /// Backend failures propagate and stop the plan; stale references do
    /// not.
    pub async fn apply(&self, actions: Vec<SyncAction>) -> Result<SyncOutcome> {
        let mut outcome = SyncOutcome::new();
        for action in actions {
            debug!(step = %action.description(), "Applying sync step");
            match self.execute(&action).await {
                Ok(()) => outcome.applied.push(action),
                Err(e) if e.is_not_found() => {
                    let stale = stale_error_for(&action);
                    warn!(step = %action.description(), error = %stale, "Sync step target gone, skipping");
                    outcome.skipped.push((action, stale.to_string()));
                }
                Err(e) => return Err(e),
            }
        }
        if !outcome.converged() {
            info!(
                applied = outcome.applied.len(),
                skipped = outcome.skipped.len(),
                "Reconciliation finished with skipped steps"
            );
        }
        Ok(outcome)
    }

    async fn execute(&self, action: &SyncAction) -> Result<()> {
        match action {
            SyncAction::AddPending { user_id, task_ids } => {
                self.store
                    .add_to_set(Collection::Users, *user_id, fields::PENDING_TASKS, task_ids)
                    .await
            }
            SyncAction::PullPending { user_id, task_ids } => {
                self.store
                    .pull_from_set(Collection::Users, *user_id, fields::PENDING_TASKS, task_ids)
                    .await
            }
            SyncAction::WriteTaskFields { task_id, fields } => self
                .store
                .update_fields(Collection::Tasks, *task_id, fields.clone())
                .await
                .map(|_| ()),
        }
    }
}

/// Configuration for full-store audits.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Users fetched per page while scanning.
    pub page_size: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self { page_size: 100 }
    }
}

/// Summary of a full-store audit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditReport {
    /// Users examined.
    pub users_scanned: usize,
    /// Users whose pending set did not match the tasks collection.
    pub users_repaired: usize,
}

/// Set the assignment fields on top of an existing field set.
fn merge_assignment(fields_to_write: FieldSet, user: Option<RecordId>, user_name: &str) -> FieldSet {
    fields_to_write
        .set(
            fields::ASSIGNED_USER,
            json!(user.map(|u| u.to_string()).unwrap_or_default()),
        )
        .set(fields::ASSIGNED_USER_NAME, json!(user_name))
}

fn stale_error_for(action: &SyncAction) -> Error {
    match action {
        SyncAction::AddPending { user_id, .. } | SyncAction::PullPending { user_id, .. } => {
            Error::stale_reference(Collection::Users, *user_id)
        }
        SyncAction::WriteTaskFields { task_id, .. } => {
            Error::stale_reference(Collection::Tasks, *task_id)
        }
    }
}

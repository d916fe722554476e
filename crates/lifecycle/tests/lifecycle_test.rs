//! Integration tests for the task and user lifecycle operations against the
//! in-memory store.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;

use tasksync_core::{
    Collection, Error, RecordId, Result, TaskDraft, TaskRecord, TaskUpdate, UserDraft, UserRecord,
    UNASSIGNED,
};
use tasksync_lifecycle::{TaskLifecycleOps, UserLifecycleOps};
use tasksync_store::{EntityStore, EntityStoreExt, Filter, FindQuery, MemoryStore, Projection};

struct Fixture {
    store: Arc<MemoryStore>,
    tasks: TaskLifecycleOps,
    users: UserLifecycleOps,
}

fn fixture() -> Fixture {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    let store = MemoryStore::new_arc();
    Fixture {
        tasks: TaskLifecycleOps::new(store.clone()),
        users: UserLifecycleOps::new(store.clone()),
        store,
    }
}

async fn pending_of(store: &MemoryStore, user_id: RecordId) -> BTreeSet<RecordId> {
    store
        .get_record::<UserRecord>(user_id)
        .await
        .map(|u| u.pending_tasks)
        .unwrap_or_default()
}

#[tokio::test]
async fn should_create_assigned_task_and_track_it_pending() -> Result<()> {
    let fx = fixture();
    let ada = fx.users.create(UserDraft::new("Ada", "ada@example.com")).await?;

    let task = fx
        .tasks
        .create(TaskDraft::new("write report", Utc::now()).with_assigned_user(ada.id))
        .await?;

    assert_eq!(task.assigned_user, Some(ada.id));
    assert_eq!(task.assigned_user_name, "Ada");
    assert!(pending_of(&fx.store, ada.id).await.contains(&task.id));
    Ok(())
}

#[tokio::test]
async fn should_not_track_completed_task_on_create() -> Result<()> {
    let fx = fixture();
    let ada = fx.users.create(UserDraft::new("Ada", "ada@example.com")).await?;

    let task = fx
        .tasks
        .create(
            TaskDraft::new("already done", Utc::now())
                .with_assigned_user(ada.id)
                .with_completed(true),
        )
        .await?;

    assert_eq!(task.assigned_user, Some(ada.id));
    assert!(pending_of(&fx.store, ada.id).await.is_empty());
    Ok(())
}

#[tokio::test]
async fn should_reject_create_with_unknown_assignee() -> Result<()> {
    let fx = fixture();
    let ghost = RecordId::new();

    let result = fx
        .tasks
        .create(TaskDraft::new("t", Utc::now()).with_assigned_user(ghost))
        .await;

    assert_eq!(result, Err(Error::invalid_reference(ghost)));
    assert_eq!(fx.tasks.count(Filter::new()).await?, 0, "no record left behind");
    Ok(())
}

#[tokio::test]
async fn should_reject_invalid_draft_before_mutation() -> Result<()> {
    let fx = fixture();
    let result = fx.tasks.create(TaskDraft::new(" ", Utc::now())).await;
    assert!(matches!(result, Err(Error::ValidationFailed { .. })));
    assert_eq!(fx.tasks.count(Filter::new()).await?, 0);
    Ok(())
}

#[tokio::test]
async fn should_move_task_between_users_on_update() -> Result<()> {
    let fx = fixture();
    let alice = fx.users.create(UserDraft::new("Alice", "alice@example.com")).await?;
    let bob = fx.users.create(UserDraft::new("Bob", "bob@example.com")).await?;
    let task = fx
        .tasks
        .create(TaskDraft::new("t", Utc::now()).with_assigned_user(alice.id))
        .await?;

    let updated = fx
        .tasks
        .update(
            task.id,
            TaskUpdate::new("t", task.deadline).with_assigned_user(bob.id),
        )
        .await?;

    assert_eq!(updated.assigned_user, Some(bob.id));
    assert_eq!(updated.assigned_user_name, "Bob");
    assert!(!pending_of(&fx.store, alice.id).await.contains(&task.id));
    assert!(pending_of(&fx.store, bob.id).await.contains(&task.id));
    Ok(())
}

#[tokio::test]
async fn should_drop_membership_when_task_completes() -> Result<()> {
    let fx = fixture();
    let ada = fx.users.create(UserDraft::new("Ada", "ada@example.com")).await?;
    let task = fx
        .tasks
        .create(TaskDraft::new("t", Utc::now()).with_assigned_user(ada.id))
        .await?;

    let updated = fx
        .tasks
        .update(
            task.id,
            TaskUpdate::new("t", task.deadline)
                .with_assigned_user(ada.id)
                .with_completed(true),
        )
        .await?;

    assert!(updated.completed);
    assert!(!pending_of(&fx.store, ada.id).await.contains(&task.id));
    Ok(())
}

#[tokio::test]
async fn should_unassign_task_on_update_without_assignee() -> Result<()> {
    let fx = fixture();
    let ada = fx.users.create(UserDraft::new("Ada", "ada@example.com")).await?;
    let task = fx
        .tasks
        .create(TaskDraft::new("t", Utc::now()).with_assigned_user(ada.id))
        .await?;

    let updated = fx
        .tasks
        .update(task.id, TaskUpdate::new("t", task.deadline).unassigned())
        .await?;

    assert_eq!(updated.assigned_user, None);
    assert_eq!(updated.assigned_user_name, UNASSIGNED);
    assert!(pending_of(&fx.store, ada.id).await.is_empty());
    Ok(())
}

#[tokio::test]
async fn should_report_not_found_for_update_of_missing_task() -> Result<()> {
    let fx = fixture();
    let result = fx
        .tasks
        .update(RecordId::new(), TaskUpdate::new("t", Utc::now()))
        .await;
    assert!(matches!(result, Err(ref e) if e.is_not_found()));
    Ok(())
}

#[tokio::test]
async fn should_cascade_task_deletion_to_pending_set() -> Result<()> {
    let fx = fixture();
    let ada = fx.users.create(UserDraft::new("Ada", "ada@example.com")).await?;
    let task = fx
        .tasks
        .create(TaskDraft::new("t", Utc::now()).with_assigned_user(ada.id))
        .await?;

    fx.tasks.delete(task.id).await?;

    assert!(pending_of(&fx.store, ada.id).await.is_empty());
    // Deleting again is NotFound, not a silent success.
    assert!(matches!(fx.tasks.delete(task.id).await, Err(ref e) if e.is_not_found()));
    Ok(())
}

#[tokio::test]
async fn should_cascade_user_deletion_to_tasks() -> Result<()> {
    let fx = fixture();
    let ada = fx.users.create(UserDraft::new("Ada", "ada@example.com")).await?;
    let t1 = fx
        .tasks
        .create(TaskDraft::new("t1", Utc::now()).with_assigned_user(ada.id))
        .await?;
    let t2 = fx
        .tasks
        .create(TaskDraft::new("t2", Utc::now()).with_assigned_user(ada.id))
        .await?;

    fx.users.delete(ada.id).await?;

    for task_id in [t1.id, t2.id] {
        let task: TaskRecord = fx.store.get_record(task_id).await?;
        assert_eq!(task.assigned_user, None);
        assert_eq!(task.assigned_user_name, UNASSIGNED);
    }
    assert!(matches!(fx.users.get(ada.id).await, Err(ref e) if e.is_not_found()));
    Ok(())
}

#[tokio::test]
async fn should_reject_duplicate_email_on_create() -> Result<()> {
    let fx = fixture();
    fx.users.create(UserDraft::new("Ada", "ada@example.com")).await?;

    let result = fx.users.create(UserDraft::new("Imposter", "ada@example.com")).await;

    assert_eq!(result, Err(Error::conflict("ada@example.com")));
    assert_eq!(fx.users.count(Filter::new()).await?, 1, "no record left behind");
    Ok(())
}

#[tokio::test]
async fn should_reject_duplicate_email_on_update_but_allow_own() -> Result<()> {
    let fx = fixture();
    let ada = fx.users.create(UserDraft::new("Ada", "ada@example.com")).await?;
    fx.users.create(UserDraft::new("Bob", "bob@example.com")).await?;

    let result = fx
        .users
        .update_core_fields(ada.id, "Ada", "bob@example.com")
        .await;
    assert!(matches!(result, Err(Error::Conflict { .. })));

    // Keeping one's own email is not a conflict.
    let updated = fx
        .users
        .update_core_fields(ada.id, "Ada Lovelace", "ada@example.com")
        .await?;
    assert_eq!(updated.name, "Ada Lovelace");
    Ok(())
}

#[tokio::test]
async fn should_lag_cached_name_until_task_is_touched() -> Result<()> {
    let fx = fixture();
    let ada = fx.users.create(UserDraft::new("Ada", "ada@example.com")).await?;
    let task = fx
        .tasks
        .create(TaskDraft::new("t", Utc::now()).with_assigned_user(ada.id))
        .await?;

    fx.users
        .update_core_fields(ada.id, "Countess Lovelace", "ada@example.com")
        .await?;

    // The cache lags the rename.
    let stale: TaskRecord = fx.store.get_record(task.id).await?;
    assert_eq!(stale.assigned_user_name, "Ada");

    // Touching the task refreshes it.
    let touched = fx
        .tasks
        .update(
            task.id,
            TaskUpdate::new("t", task.deadline).with_assigned_user(ada.id),
        )
        .await?;
    assert_eq!(touched.assigned_user_name, "Countess Lovelace");
    Ok(())
}

#[tokio::test]
async fn should_replace_user_wholesale() -> Result<()> {
    let fx = fixture();
    let ada = fx.users.create(UserDraft::new("Ada", "ada@example.com")).await?;
    let bob = fx.users.create(UserDraft::new("Bob", "bob@example.com")).await?;
    let kept = fx
        .tasks
        .create(TaskDraft::new("kept", Utc::now()).with_assigned_user(ada.id))
        .await?;
    let released = fx
        .tasks
        .create(TaskDraft::new("released", Utc::now()).with_assigned_user(ada.id))
        .await?;
    let adopted = fx
        .tasks
        .create(TaskDraft::new("adopted", Utc::now()).with_assigned_user(bob.id))
        .await?;

    let replaced = fx
        .users
        .replace(
            ada.id,
            "Ada Lovelace",
            "lovelace@example.com",
            &BTreeSet::from([kept.id, adopted.id]),
        )
        .await?;

    assert_eq!(replaced.name, "Ada Lovelace");
    assert_eq!(replaced.email, "lovelace@example.com");
    assert_eq!(replaced.pending_tasks, BTreeSet::from([kept.id, adopted.id]));

    // The adopted task caches the user's new name.
    let adopted_now: TaskRecord = fx.store.get_record(adopted.id).await?;
    assert_eq!(adopted_now.assigned_user, Some(ada.id));
    assert_eq!(adopted_now.assigned_user_name, "Ada Lovelace");
    assert!(!pending_of(&fx.store, bob.id).await.contains(&adopted.id));

    let released_now: TaskRecord = fx.store.get_record(released.id).await?;
    assert_eq!(released_now.assigned_user, None);
    Ok(())
}

#[tokio::test]
async fn should_report_not_found_for_pending_replace_of_missing_user() -> Result<()> {
    let fx = fixture();
    let result = fx
        .users
        .replace_pending_tasks(RecordId::new(), &BTreeSet::new())
        .await;
    assert!(matches!(result, Err(ref e) if e.is_not_found()));
    Ok(())
}

#[tokio::test]
async fn should_list_with_filter_and_projection() -> Result<()> {
    let fx = fixture();
    let ada = fx.users.create(UserDraft::new("Ada", "ada@example.com")).await?;
    fx.tasks
        .create(TaskDraft::new("open", Utc::now()).with_assigned_user(ada.id))
        .await?;
    fx.tasks
        .create(TaskDraft::new("done", Utc::now()).with_completed(true))
        .await?;

    let open = fx
        .tasks
        .list(
            FindQuery::new()
                .with_filter(Filter::new().eq("completed", false))
                .with_projection(Projection::Include(vec!["name".to_string()])),
        )
        .await?;

    assert_eq!(open.len(), 1);
    assert_eq!(open[0]["name"], "open");
    assert!(open[0].get("deadline").is_none(), "projection applied");

    assert_eq!(fx.tasks.count(Filter::new().eq("completed", true)).await?, 1);
    Ok(())
}

#[tokio::test]
async fn should_keep_caller_supplied_cached_name_on_create() -> Result<()> {
    let fx = fixture();
    let ada = fx.users.create(UserDraft::new("Ada", "ada@example.com")).await?;

    let task = fx
        .tasks
        .create(
            TaskDraft::new("t", Utc::now())
                .with_assigned_user(ada.id)
                .with_assigned_user_name("A. Lovelace"),
        )
        .await?;

    assert_eq!(task.assigned_user_name, "A. Lovelace");
    assert!(pending_of(&fx.store, ada.id).await.contains(&task.id));
    Ok(())
}

#[tokio::test]
async fn should_hold_invariant_through_mixed_sequence() -> Result<()> {
    let fx = fixture();
    let alice = fx.users.create(UserDraft::new("Alice", "alice@example.com")).await?;
    let bob = fx.users.create(UserDraft::new("Bob", "bob@example.com")).await?;

    let t1 = fx
        .tasks
        .create(TaskDraft::new("t1", Utc::now()).with_assigned_user(alice.id))
        .await?;
    let t2 = fx
        .tasks
        .create(TaskDraft::new("t2", Utc::now()).with_assigned_user(alice.id))
        .await?;
    fx.tasks
        .update(
            t1.id,
            TaskUpdate::new("t1", t1.deadline).with_assigned_user(bob.id),
        )
        .await?;
    fx.tasks
        .update(
            t2.id,
            TaskUpdate::new("t2", t2.deadline)
                .with_assigned_user(alice.id)
                .with_completed(true),
        )
        .await?;
    fx.users
        .replace_pending_tasks(bob.id, &BTreeSet::from([t1.id, t2.id]))
        .await?;
    fx.tasks.delete(t1.id).await?;

    assert_invariant(&fx.store).await;
    Ok(())
}

/// The core invariant in executable form: memberships mirror incomplete
/// assigned tasks exactly, in both directions.
async fn assert_invariant(store: &MemoryStore) {
    let tasks: Vec<TaskRecord> = store.find_records(FindQuery::new()).await.unwrap();
    let users: Vec<UserRecord> = store.find_records(FindQuery::new()).await.unwrap();

    for task in &tasks {
        match (task.assigned_user, task.completed) {
            (Some(user_id), false) => {
                let owner = users.iter().find(|u| u.id == user_id);
                assert!(
                    owner.is_some_and(|u| u.pending_tasks.contains(&task.id)),
                    "incomplete assigned task {} missing from its owner's pending set",
                    task.id
                );
            }
            _ => {
                assert!(
                    users.iter().all(|u| !u.pending_tasks.contains(&task.id)),
                    "task {} must not appear in any pending set",
                    task.id
                );
            }
        }
        if task.assigned_user.is_none() {
            assert_eq!(task.assigned_user_name, UNASSIGNED);
        }
    }

    for user in &users {
        for task_id in &user.pending_tasks {
            let task = tasks.iter().find(|t| t.id == *task_id);
            assert!(
                task.is_some_and(|t| t.assigned_user == Some(user.id) && !t.completed),
                "pending id {} of user {} does not name an incomplete task assigned to them",
                task_id,
                user.id
            );
        }
    }
}

#[tokio::test]
async fn should_rebuild_after_simulated_partial_failure() -> Result<()> {
    let fx = fixture();
    let ada = fx.users.create(UserDraft::new("Ada", "ada@example.com")).await?;
    let task = fx
        .tasks
        .create(TaskDraft::new("t", Utc::now()).with_assigned_user(ada.id))
        .await?;

    // Simulate an interrupted plan: membership pull happened, the task
    // write did not. The task document stays the source of truth.
    fx.store
        .pull_from_set(
            Collection::Users,
            ada.id,
            tasksync_core::fields::PENDING_TASKS,
            &[task.id],
        )
        .await?;

    let rebuilt = fx.users.rebuild_pending_tasks(ada.id).await?;
    assert_eq!(rebuilt.pending_tasks, BTreeSet::from([task.id]));
    assert_invariant(&fx.store).await;
    Ok(())
}

//! User lifecycle operations.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use tasksync_core::{
    fields, validate_core_fields, Collection, Document, Error, RecordId, Result, UserDraft,
    UserRecord,
};
use tasksync_reconciler::{AssignmentReconciler, AuditConfig, AuditReport};
use tasksync_store::{EntityStore, EntityStoreExt, FieldSet, Filter, FindQuery};

/// User create/update/delete orchestration plus pass-through reads.
///
/// Constructed with an injected store handle; the pending set is only ever
/// mutated through the reconciler.
pub struct UserLifecycleOps {
    store: Arc<dyn EntityStore>,
    reconciler: AssignmentReconciler,
}

/// Insert shape for a new user; the store assigns `_id`.
#[derive(Serialize)]
struct NewUserDocument<'a> {
    name: &'a str,
    email: &'a str,
    #[serde(rename = "pendingTasks")]
    pending_tasks: [RecordId; 0],
    #[serde(rename = "dateCreated")]
    date_created: DateTime<Utc>,
}

impl UserLifecycleOps {
    /// Create the ops layer over a store handle.
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        let reconciler = AssignmentReconciler::new(store.clone());
        Self { store, reconciler }
    }

    /// Create a user with an empty pending set.
    ///
    /// The duplicate-email check is check-then-insert: two concurrent
    /// creates with the same email can both pass it. That window is part of
    /// the contract; a backend with a native unique index should treat this
    /// check as an optimization only.
    ///
    /// # Errors
    ///
    /// `ValidationFailed`, `Conflict`; backend failures propagate.
    pub async fn create(&self, draft: UserDraft) -> Result<UserRecord> {
        draft.validate()?;
        self.ensure_email_free(&draft.email, None).await?;

        let document = serde_json::to_value(NewUserDocument {
            name: &draft.name,
            email: &draft.email,
            pending_tasks: [],
            date_created: Utc::now(),
        })
        .map_err(|e| Error::backend("serialize", e.to_string()))?;

        let user: UserRecord = self.store.insert_record(document).await?;
        info!(user_id = %user.id, "User created");
        Ok(user)
    }

    /// Update name and email.
    ///
    /// Tasks keep their previously cached `assignedUserName` until each one
    /// is next touched; the lag is contractual, not repaired here.
    ///
    /// # Errors
    ///
    /// `NotFound`, `ValidationFailed`, `Conflict`; backend failures
    /// propagate.
    pub async fn update_core_fields(
        &self,
        user_id: RecordId,
        name: &str,
        email: &str,
    ) -> Result<UserRecord> {
        validate_core_fields(name, email)?;
        let _current: UserRecord = self.store.get_record(user_id).await?;
        self.ensure_email_free(email, Some(user_id)).await?;

        let updated = self
            .store
            .update_record(
                user_id,
                FieldSet::new()
                    .set(fields::NAME, json!(name))
                    .set(fields::EMAIL, json!(email)),
            )
            .await?;
        info!(user_id = %user_id, "User core fields updated");
        Ok(updated)
    }

    /// Replace the pending set wholesale. The reconciler releases tasks
    /// that drop out, adopts tasks that come in (pulling them from their
    /// previous owners), and keeps completed tasks out of the set.
    ///
    /// # Errors
    ///
    /// `NotFound`; backend failures propagate.
    pub async fn replace_pending_tasks(
        &self,
        user_id: RecordId,
        desired: &BTreeSet<RecordId>,
    ) -> Result<UserRecord> {
        self.reconciler.reconcile_pending_set(user_id, desired).await?;
        self.store.get_record(user_id).await
    }

    /// Full user replace: name, email, and pending set.
    ///
    /// Core fields go first so tasks adopted by the pending-set replacement
    /// cache the new display name.
    ///
    /// # Errors
    ///
    /// `NotFound`, `ValidationFailed`, `Conflict`; backend failures
    /// propagate.
    pub async fn replace(
        &self,
        user_id: RecordId,
        name: &str,
        email: &str,
        pending: &BTreeSet<RecordId>,
    ) -> Result<UserRecord> {
        self.update_core_fields(user_id, name, email).await?;
        self.replace_pending_tasks(user_id, pending).await
    }

    /// Delete a user, unassigning every task that references it.
    ///
    /// # Errors
    ///
    /// `NotFound`; backend failures propagate.
    pub async fn delete(&self, user_id: RecordId) -> Result<UserRecord> {
        let _user: UserRecord = self.store.get_record(user_id).await?;
        self.reconciler.unassign_all(user_id).await?;
        let deleted = self.store.delete_record::<UserRecord>(user_id).await?;
        info!(user_id = %user_id, "User deleted");
        Ok(deleted)
    }

    /// Recompute the pending set from the tasks collection (audit hook).
    ///
    /// # Errors
    ///
    /// `NotFound`; backend failures propagate.
    pub async fn rebuild_pending_tasks(&self, user_id: RecordId) -> Result<UserRecord> {
        self.reconciler.rebuild_pending_tasks(user_id).await
    }

    /// Audit every user's pending set against the tasks collection.
    ///
    /// # Errors
    ///
    /// Backend failures propagate.
    pub async fn audit(&self, config: &AuditConfig) -> Result<AuditReport> {
        self.reconciler.rebuild_all(config).await
    }

    /// Point read.
    ///
    /// # Errors
    ///
    /// `NotFound`; backend failures propagate.
    pub async fn get(&self, user_id: RecordId) -> Result<UserRecord> {
        self.store.get_record(user_id).await
    }

    /// Filtered scan. Returns raw documents so projections pass through.
    ///
    /// # Errors
    ///
    /// Backend failures propagate.
    pub async fn list(&self, query: FindQuery) -> Result<Vec<Document>> {
        self.store.find(Collection::Users, query).await
    }

    /// Count users matching a filter.
    ///
    /// # Errors
    ///
    /// Backend failures propagate.
    pub async fn count(&self, filter: Filter) -> Result<u64> {
        self.store.count(Collection::Users, filter).await
    }

    async fn ensure_email_free(&self, email: &str, excluding: Option<RecordId>) -> Result<()> {
        let mut filter = Filter::new().eq(fields::EMAIL, email);
        if let Some(id) = excluding {
            filter = filter.ne(fields::ID, id.to_string());
        }
        if self.store.count(Collection::Users, filter).await? > 0 {
            return Err(Error::conflict(email));
        }
        Ok(())
    }
}

//! Referential-integrity reconciliation between tasks and users.
//!
//! Two denormalized views have to agree: a task's `assignedUser` (plus its
//! cached `assignedUserName`) and the assignee's `pendingTasks` set. The
//! store offers no multi-document transaction, so every cross-entity effect
//! here is a plan of idempotent per-document steps:
//!
//! - **Plan**: diff the previous and desired assignment into [`SyncAction`]s
//! - **Apply**: run each step; a step whose target is already gone is
//!   skipped and recorded, not an error
//! - **Recover**: rebuild a user's pending set from the tasks collection,
//!   which is the source of truth
//!
//! Replaying a whole plan after an interruption converges to the same final
//! state, because each step is itself an idempotent set or field write.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod reconciler;
pub mod types;

pub use reconciler::{AssignmentReconciler, AuditConfig, AuditReport};
pub use types::{AssignmentChange, SyncAction, SyncOutcome};

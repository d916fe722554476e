//! Lifecycle orchestration for tasks and users.
//!
//! Thin coordinators over the store and the reconciler: load current state,
//! validate typed input, hand every cross-entity effect to the reconciler,
//! and return the resulting record or a typed failure. This is the contract
//! the (out-of-scope) request layer calls; raw-input parsing and the wire
//! envelope live there, not here.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod tasks;
pub mod users;

pub use tasks::TaskLifecycleOps;
pub use users::UserLifecycleOps;

//! Document store contract and reference backends for tasksync.
//!
//! The reconciliation core consumes a narrow persistence interface: point
//! lookups, filtered scans, inserts, and three per-document atomic updates
//! (field set, add-to-set, pull-from-set). This crate defines that contract
//! ([`EntityStore`]), the query/update value types it takes, an in-memory
//! reference backend ([`MemoryStore`]), and a tracing decorator
//! ([`TracingStore`]).
//!
//! No call spans more than one document; cross-document consistency is the
//! reconciler's job, built entirely from these idempotent primitives.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod memory;
pub mod query;
pub mod store;

pub use memory::MemoryStore;
pub use query::{FieldSet, Filter, FindQuery, Projection, Sort, SortOrder};
pub use store::{EntityStore, EntityStoreExt, TracingStore};

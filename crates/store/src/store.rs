//! The store contract consumed by the reconciliation core.

use async_trait::async_trait;

use tasksync_core::{Collection, Document, Record, RecordId, Result};

use crate::query::{FieldSet, Filter, FindQuery};

/// Keyed document store with per-document atomic updates.
///
/// Backends guarantee atomicity of each individual call on its single
/// target document. Nothing in this contract spans two documents, and the
/// core never assumes a cross-document transaction exists.
///
/// `add_to_set` and `pull_from_set` are idempotent: repeating a call leaves
/// the document unchanged. The reconciler leans on this to make replayed
/// reconciliation sequences converge.
///
/// Uniqueness (user email) is not enforced at this layer; callers pre-check
/// and accept the residual check-then-act race.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Point lookup.
    async fn get(&self, collection: Collection, id: RecordId) -> Result<Document>;

    /// Filtered scan with optional projection, sort, skip, and limit.
    async fn find(&self, collection: Collection, query: FindQuery) -> Result<Vec<Document>>;

    /// Insert a document, assigning `_id` when absent. Returns the stored
    /// document.
    async fn insert(&self, collection: Collection, document: Document) -> Result<Document>;

    /// Atomically set fields on one document. Returns the updated document.
    async fn update_fields(
        &self,
        collection: Collection,
        id: RecordId,
        fields: FieldSet,
    ) -> Result<Document>;

    /// Atomically add values to an array field, skipping values already
    /// present.
    async fn add_to_set(
        &self,
        collection: Collection,
        id: RecordId,
        field: &str,
        values: &[RecordId],
    ) -> Result<()>;

    /// Atomically remove values from an array field. Values already absent
    /// are a no-op, not an error.
    async fn pull_from_set(
        &self,
        collection: Collection,
        id: RecordId,
        field: &str,
        values: &[RecordId],
    ) -> Result<()>;

    /// Delete a document. Returns the deleted document.
    async fn delete(&self, collection: Collection, id: RecordId) -> Result<Document>;

    /// Count documents matching a filter.
    async fn count(&self, collection: Collection, filter: Filter) -> Result<u64>;
}

/// Typed wrappers over the document-level contract.
#[async_trait]
pub trait EntityStoreExt: EntityStore {
    /// Point lookup decoded into a record type.
    async fn get_record<R: Record + 'static>(&self, id: RecordId) -> Result<R> {
        let doc = self.get(R::COLLECTION, id).await?;
        R::from_document(doc)
    }

    /// Filtered scan decoded into record types. Queries that project fields
    /// away should use [`EntityStore::find`] directly.
    async fn find_records<R: Record + 'static>(&self, query: FindQuery) -> Result<Vec<R>> {
        let docs = self.find(R::COLLECTION, query).await?;
        docs.into_iter().map(R::from_document).collect()
    }

    /// Insert decoded into a record type.
    async fn insert_record<R: Record + 'static>(&self, document: Document) -> Result<R> {
        let doc = self.insert(R::COLLECTION, document).await?;
        R::from_document(doc)
    }

    /// Field update decoded into a record type.
    async fn update_record<R: Record + 'static>(
        &self,
        id: RecordId,
        fields: FieldSet,
    ) -> Result<R> {
        let doc = self.update_fields(R::COLLECTION, id, fields).await?;
        R::from_document(doc)
    }

    /// Delete decoded into a record type.
    async fn delete_record<R: Record + 'static>(&self, id: RecordId) -> Result<R> {
        let doc = self.delete(R::COLLECTION, id).await?;
        R::from_document(doc)
    }
}

impl<S: EntityStore + ?Sized> EntityStoreExt for S {}

/// A wrapper that adds tracing to a store.
pub struct TracingStore<S: EntityStore> {
    inner: S,
}

impl<S: EntityStore> TracingStore<S> {
    /// Create a new tracing store.
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S: EntityStore> EntityStore for TracingStore<S> {
    async fn get(&self, collection: Collection, id: RecordId) -> Result<Document> {
        tracing::debug!(collection = %collection, id = %id, "get");
        self.inner.get(collection, id).await
    }

    async fn find(&self, collection: Collection, query: FindQuery) -> Result<Vec<Document>> {
        tracing::debug!(collection = %collection, query = ?query, "find");
        let result = self.inner.find(collection, query).await;
        if let Ok(ref docs) = result {
            tracing::trace!(count = docs.len(), "find returned");
        }
        result
    }

    async fn insert(&self, collection: Collection, document: Document) -> Result<Document> {
        tracing::debug!(collection = %collection, "insert");
        self.inner.insert(collection, document).await
    }

    async fn update_fields(
        &self,
        collection: Collection,
        id: RecordId,
        fields: FieldSet,
    ) -> Result<Document> {
        tracing::debug!(collection = %collection, id = %id, fields = fields.len(), "update_fields");
        self.inner.update_fields(collection, id, fields).await
    }

    async fn add_to_set(
        &self,
        collection: Collection,
        id: RecordId,
        field: &str,
        values: &[RecordId],
    ) -> Result<()> {
        tracing::debug!(collection = %collection, id = %id, field, count = values.len(), "add_to_set");
        self.inner.add_to_set(collection, id, field, values).await
    }

    async fn pull_from_set(
        &self,
        collection: Collection,
        id: RecordId,
        field: &str,
        values: &[RecordId],
    ) -> Result<()> {
        tracing::debug!(collection = %collection, id = %id, field, count = values.len(), "pull_from_set");
        self.inner.pull_from_set(collection, id, field, values).await
    }

    async fn delete(&self, collection: Collection, id: RecordId) -> Result<Document> {
        tracing::debug!(collection = %collection, id = %id, "delete");
        self.inner.delete(collection, id).await
    }

    async fn count(&self, collection: Collection, filter: Filter) -> Result<u64> {
        tracing::debug!(collection = %collection, "count");
        self.inner.count(collection, filter).await
    }
}

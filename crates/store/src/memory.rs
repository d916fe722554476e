//! In-memory reference backend.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use tasksync_core::{fields, Collection, Document, Error, RecordId, Result};

use crate::query::{FieldSet, Filter, FindQuery};
use crate::store::EntityStore;

/// In-memory document store.
///
/// Every call holds one lock guard for its whole duration, which realizes
/// the per-document atomicity the contract requires. Doubles as the test
/// backend.
///
/// Scans return documents in id order unless a sort is given, so skip and
/// limit paginate deterministically.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<Collection, HashMap<RecordId, Document>>>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new empty store wrapped in an Arc.
    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn get(&self, collection: Collection, id: RecordId) -> Result<Document> {
        let collections = self.collections.read().await;
        collections
            .get(&collection)
            .and_then(|docs| docs.get(&id))
            .cloned()
            .ok_or_else(|| Error::not_found(collection, id))
    }

    async fn find(&self, collection: Collection, query: FindQuery) -> Result<Vec<Document>> {
        let collections = self.collections.read().await;
        let mut matched: Vec<(RecordId, &Document)> = collections
            .get(&collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, doc)| query.filter.matches(doc))
                    .map(|(id, doc)| (*id, doc))
                    .collect()
            })
            .unwrap_or_default();
        matched.sort_by_key(|(id, _)| *id);

        let mut docs: Vec<Document> = matched.into_iter().map(|(_, doc)| doc.clone()).collect();
        if let Some(sort) = &query.sort {
            docs.sort_by(|a, b| sort.compare(a, b));
        }

        let skip = query
            .skip
            .map(|n| usize::try_from(n).unwrap_or(usize::MAX))
            .unwrap_or(0);
        let limit = query
            .limit
            .map(|n| usize::try_from(n).unwrap_or(usize::MAX))
            .unwrap_or(usize::MAX);
        let page = docs.into_iter().skip(skip).take(limit);

        Ok(match &query.projection {
            Some(projection) => page.map(|doc| projection.apply(&doc)).collect(),
            None => page.collect(),
        })
    }

    async fn insert(&self, collection: Collection, document: Document) -> Result<Document> {
        let mut document = document;
        let id = match document.get(fields::ID).and_then(Value::as_str) {
            Some(s) if !s.is_empty() => s
                .parse::<RecordId>()
                .map_err(|e| Error::backend("insert", format!("invalid _id: {e}")))?,
            _ => RecordId::new(),
        };
        let Value::Object(map) = &mut document else {
            return Err(Error::backend("insert", "document must be an object"));
        };
        map.insert(fields::ID.to_string(), Value::String(id.to_string()));

        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection).or_default();
        if docs.contains_key(&id) {
            return Err(Error::backend("insert", format!("duplicate id '{id}'")));
        }
        docs.insert(id, document.clone());
        Ok(document)
    }

    async fn update_fields(
        &self,
        collection: Collection,
        id: RecordId,
        fields_to_set: FieldSet,
    ) -> Result<Document> {
        let mut collections = self.collections.write().await;
        let doc = collections
            .get_mut(&collection)
            .and_then(|docs| docs.get_mut(&id))
            .ok_or_else(|| Error::not_found(collection, id))?;
        let Value::Object(map) = doc else {
            return Err(Error::backend("update_fields", "document must be an object"));
        };
        for (field, value) in fields_to_set.entries() {
            if field == fields::ID {
                return Err(Error::backend("update_fields", "_id is immutable"));
            }
            map.insert(field.clone(), value.clone());
        }
        Ok(doc.clone())
    }

    async fn add_to_set(
        &self,
        collection: Collection,
        id: RecordId,
        field: &str,
        values: &[RecordId],
    ) -> Result<()> {
        let mut collections = self.collections.write().await;
        let doc = collections
            .get_mut(&collection)
            .and_then(|docs| docs.get_mut(&id))
            .ok_or_else(|| Error::not_found(collection, id))?;
        let Value::Object(map) = doc else {
            return Err(Error::backend("add_to_set", "document must be an object"));
        };
        let entry = map
            .entry(field.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        let Value::Array(items) = entry else {
            return Err(Error::backend(
                "add_to_set",
                format!("field '{field}' is not an array"),
            ));
        };
        for value in values.iter().map(|v| Value::String(v.to_string())) {
            if !items.contains(&value) {
                items.push(value);
            }
        }
        Ok(())
    }

    async fn pull_from_set(
        &self,
        collection: Collection,
        id: RecordId,
        field: &str,
        values: &[RecordId],
    ) -> Result<()> {
        let mut collections = self.collections.write().await;
        let doc = collections
            .get_mut(&collection)
            .and_then(|docs| docs.get_mut(&id))
            .ok_or_else(|| Error::not_found(collection, id))?;
        let Value::Object(map) = doc else {
            return Err(Error::backend("pull_from_set", "document must be an object"));
        };
        let Some(entry) = map.get_mut(field) else {
            return Ok(());
        };
        let Value::Array(items) = entry else {
            return Err(Error::backend(
                "pull_from_set",
                format!("field '{field}' is not an array"),
            ));
        };
        let values: Vec<Value> = values.iter().map(|v| Value::String(v.to_string())).collect();
        items.retain(|item| !values.contains(item));
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: RecordId) -> Result<Document> {
        let mut collections = self.collections.write().await;
        collections
            .get_mut(&collection)
            .and_then(|docs| docs.remove(&id))
            .ok_or_else(|| Error::not_found(collection, id))
    }

    async fn count(&self, collection: Collection, filter: Filter) -> Result<u64> {
        let collections = self.collections.read().await;
        let matched = collections
            .get(&collection)
            .map(|docs| docs.values().filter(|doc| filter.matches(doc)).count())
            .unwrap_or(0);
        u64::try_from(matched).map_err(|e| Error::backend("count", e.to_string()))
    }
}

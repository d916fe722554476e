//! Query and update value types for the store contract.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field filter: equality matches plus not-equal guards.
///
/// A missing document field compares as JSON null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    eq: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    ne: BTreeMap<String, Value>,
}

impl Filter {
    /// Create an empty filter (matches everything).
    pub fn new() -> Self {
        Self::default()
    }

    /// Require a field to equal a value.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.eq.insert(field.into(), value.into());
        self
    }

    /// Require a field to differ from a value.
    pub fn ne(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ne.insert(field.into(), value.into());
        self
    }

    /// Whether this filter matches everything.
    pub fn is_empty(&self) -> bool {
        self.eq.is_empty() && self.ne.is_empty()
    }

    /// Check a document against this filter.
    pub fn matches(&self, doc: &Value) -> bool {
        let null = Value::Null;
        self.eq
            .iter()
            .all(|(field, value)| doc.get(field).unwrap_or(&null) == value)
            && self
                .ne
                .iter()
                .all(|(field, value)| doc.get(field).unwrap_or(&null) != value)
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Multi-key sort specification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sort {
    keys: Vec<(String, SortOrder)>,
}

impl Sort {
    /// Sort by a single field.
    pub fn by(field: impl Into<String>, order: SortOrder) -> Self {
        Self {
            keys: vec![(field.into(), order)],
        }
    }

    /// Add a secondary sort key.
    pub fn then(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.keys.push((field.into(), order));
        self
    }

    /// Compare two documents under this sort.
    pub(crate) fn compare(&self, a: &Value, b: &Value) -> Ordering {
        let null = Value::Null;
        for (field, order) in &self.keys {
            let left = a.get(field).unwrap_or(&null);
            let right = b.get(field).unwrap_or(&null);
            let ordering = match order {
                SortOrder::Asc => value_cmp(left, right),
                SortOrder::Desc => value_cmp(right, left),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

/// Total order over JSON values: by type rank first, then by value within
/// comparable types.
fn value_cmp(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Field selection for scans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Projection {
    /// Keep only the listed fields (plus `_id`).
    Include(Vec<String>),
    /// Drop the listed fields.
    Exclude(Vec<String>),
}

impl Projection {
    /// Apply to a document.
    pub(crate) fn apply(&self, doc: &Value) -> Value {
        let Value::Object(map) = doc else {
            return doc.clone();
        };
        match self {
            Self::Include(fields) => {
                let kept = map
                    .iter()
                    .filter(|(key, _)| {
                        key.as_str() == tasksync_core::fields::ID
                            || fields.iter().any(|f| f == key.as_str())
                    })
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                Value::Object(kept)
            }
            Self::Exclude(fields) => {
                let kept = map
                    .iter()
                    .filter(|(key, _)| !fields.iter().any(|f| f == key.as_str()))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                Value::Object(kept)
            }
        }
    }
}

/// A filtered scan: filter plus optional projection, sort, skip, and limit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindQuery {
    #[serde(default)]
    pub filter: Filter,
    pub projection: Option<Projection>,
    pub sort: Option<Sort>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

impl FindQuery {
    /// Create an unconstrained scan.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the filter.
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    /// Set the projection.
    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    /// Set the sort.
    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Skip the first `n` results.
    pub fn with_skip(mut self, n: u64) -> Self {
        self.skip = Some(n);
        self
    }

    /// Cap the number of results.
    pub fn with_limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }
}

/// Fields to set atomically on one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldSet(BTreeMap<String, Value>);

impl FieldSet {
    /// Create an empty field set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field.
    pub fn set(mut self, field: impl Into<String>, value: Value) -> Self {
        self.0.insert(field.into(), value);
        self
    }

    /// Iterate over the fields.
    pub fn entries(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Whether any field is set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of fields set.
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

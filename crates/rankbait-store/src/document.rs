//! Document, query and patch types shared by every [`DocumentStore`]
//! implementation.
//!
//! [`DocumentStore`]: crate::remote::DocumentStore

use std::cmp::Ordering;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::Result;

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// A stored JSON object together with its id inside the collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

impl Document {
    pub fn new(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    pub fn from_model<T: Serialize>(id: impl Into<String>, model: &T) -> Result<Self> {
        Ok(Self::new(id, serde_json::to_value(model)?))
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(T::deserialize(&self.data)?)
    }

    /// Resolve a dotted field path (`nicknames.<group>`) inside the document.
    pub fn field(&self, path: &str) -> Option<&Value> {
        lookup(&self.data, path)
    }
}

/// A full result set delivered by a live subscription.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    pub documents: Vec<Document>,
}

impl Snapshot {
    /// Decode every document, skipping the ones that do not fit `T`.
    pub fn decode_all<T: DeserializeOwned>(&self) -> Vec<T> {
        decode_documents(&self.documents)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Decode documents into models; malformed ones are logged and dropped.
pub fn decode_documents<T: DeserializeOwned>(documents: &[Document]) -> Vec<T> {
    documents
        .iter()
        .filter_map(|doc| match doc.decode::<T>() {
            Ok(model) => Some(model),
            Err(e) => {
                tracing::debug!(id = %doc.id, error = %e, "Skipping malformed document");
                None
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Field equals the value.
    Eq(String, Value),
    /// Field is an array containing the value.
    ArrayContains(String, Value),
}

impl Filter {
    pub fn matches(&self, data: &Value) -> bool {
        match self {
            Filter::Eq(path, expected) => lookup(data, path) == Some(expected),
            Filter::ArrayContains(path, expected) => lookup(data, path)
                .and_then(Value::as_array)
                .is_some_and(|items| items.contains(expected)),
        }
    }
}

/// Equality-filtered query with optional descending order and limit.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order_by_desc: Option<String>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq(field.to_string(), value.into()));
        self
    }

    pub fn where_array_contains(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters
            .push(Filter::ArrayContains(field.to_string(), value.into()));
        self
    }

    pub fn order_by_desc(mut self, field: &str) -> Self {
        self.order_by_desc = Some(field.to_string());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, data: &Value) -> bool {
        self.filters.iter().all(|f| f.matches(data))
    }

    /// Filter, order and truncate a set of documents the way a remote store
    /// evaluates this query.
    pub fn apply<'a, I>(&self, documents: I) -> Vec<Document>
    where
        I: IntoIterator<Item = (&'a String, &'a Value)>,
    {
        let mut matched: Vec<Document> = documents
            .into_iter()
            .filter(|(_, data)| self.matches(data))
            .map(|(id, data)| Document::new(id.clone(), data.clone()))
            .collect();

        if let Some(field) = &self.order_by_desc {
            matched.sort_by(|a, b| {
                compare_values(lookup(&b.data, field), lookup(&a.data, field))
                    .then_with(|| a.id.cmp(&b.id))
            });
        }

        if let Some(limit) = self.limit {
            matched.truncate(limit);
        }

        matched
    }
}

// ---------------------------------------------------------------------------
// Patch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    Set(Value),
    /// Remove the key entirely.
    Delete,
}

/// A partial update: dotted field paths mapped to new values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Patch {
    pub updates: Vec<(String, FieldUpdate)>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, path: &str, value: impl Into<Value>) -> Self {
        self.updates
            .push((path.to_string(), FieldUpdate::Set(value.into())));
        self
    }

    pub fn delete(mut self, path: &str) -> Self {
        self.updates.push((path.to_string(), FieldUpdate::Delete));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// Apply every update in order. Intermediate objects are created for
    /// `Set`; deleting a missing key is a no-op.
    pub fn apply_to(&self, data: &mut Value) {
        for (path, update) in &self.updates {
            match update {
                FieldUpdate::Set(value) => set_path(data, path, value.clone()),
                FieldUpdate::Delete => delete_path(data, path),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn lookup<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(data, |current, key| current.get(key))
}

fn set_path(data: &mut Value, path: &str, value: Value) {
    let keys: Vec<&str> = path.split('.').collect();
    let Some((leaf, parents)) = keys.split_last() else {
        return;
    };

    let mut current = data;
    for key in parents {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        if !current[*key].is_object() {
            current[*key] = Value::Object(Map::new());
        }
        current = &mut current[*key];
    }
    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    current[*leaf] = value;
}

fn delete_path(data: &mut Value, path: &str) {
    let (parent, leaf) = match path.rsplit_once('.') {
        Some((parent, leaf)) => (parent, leaf),
        None => ("", path),
    };
    let target = if parent.is_empty() {
        Some(data)
    } else {
        parent
            .split('.')
            .try_fold(data, |current, key| current.get_mut(key))
    };
    if let Some(Value::Object(map)) = target {
        map.remove(leaf);
    }
}

/// Order JSON scalars: numbers numerically, strings lexically, missing last.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

//! Document store abstraction
//!
//! A narrow interface over a transactional document database. Documents are
//! JSON objects addressed by [`DocPath`]. Writes go through [`WriteBatch`]es
//! of at most [`DocumentStore::batch_limit`] operations, each committed
//! atomically. The only read-modify-write primitive is
//! [`DocumentStore::read_modify_write`], which fails with
//! [`Error::Conflict`] when another writer got there first; callers wrap it
//! in [`retry::run_transaction`].
//!
//! Two backends ship: [`memory::MemoryStore`] (tests, local runs) and
//! `sqlite::SqliteStore` (sqlx feature).

pub mod batch;
pub mod memory;
pub mod recent;
pub mod retry;
#[cfg(feature = "sqlx")]
pub mod sqlite;

use crate::fields::BATCH_LIMIT;
use crate::paths::DocPath;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub use batch::BatchWriter;
pub use memory::MemoryStore;
pub use retry::run_transaction;
#[cfg(feature = "sqlx")]
pub use sqlite::SqliteStore;

/// A stored JSON object
pub type Document = Map<String, Value>;

/// Closure applied inside a read-modify-write transaction
pub type UpdateFn<'a> = &'a (dyn Fn(Option<Document>) -> Result<Document> + Send + Sync);

// ========================================
// Write Operations
// ========================================

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Replace the whole document
    Set { path: DocPath, data: Document },
    /// Merge-write plus atomic increments, creating the document if absent.
    ///
    /// `merge` is deep-merged (nested objects merge, other values replace);
    /// `increments` are keyed by dotted field paths (`byPhase.regular.points`)
    /// and add to the stored number, treating a missing or non-numeric
    /// field as 0.
    Update {
        path: DocPath,
        merge: Document,
        increments: BTreeMap<String, i64>,
    },
    Delete { path: DocPath },
}

impl WriteOp {
    pub fn set(path: DocPath, data: Document) -> Self {
        WriteOp::Set { path, data }
    }

    pub fn merge(path: DocPath, merge: Document) -> Self {
        WriteOp::Update {
            path,
            merge,
            increments: BTreeMap::new(),
        }
    }

    pub fn increment(path: DocPath, increments: BTreeMap<String, i64>) -> Self {
        WriteOp::Update {
            path,
            merge: Document::new(),
            increments,
        }
    }

    pub fn delete(path: DocPath) -> Self {
        WriteOp::Delete { path }
    }

    pub fn path(&self) -> &DocPath {
        match self {
            WriteOp::Set { path, .. } | WriteOp::Update { path, .. } | WriteOp::Delete { path } => {
                path
            }
        }
    }
}

/// Operations committed together, all or nothing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: WriteOp) {
        self.ops.push(op);
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

/// Apply one write to the current state of its document.
///
/// Shared by every backend so they agree on merge and increment semantics.
/// Returns `None` when the document should not exist afterwards.
pub fn apply_write(current: Option<Document>, op: &WriteOp) -> Option<Document> {
    match op {
        WriteOp::Set { data, .. } => Some(data.clone()),
        WriteOp::Delete { .. } => None,
        WriteOp::Update {
            merge, increments, ..
        } => {
            let mut doc = current.unwrap_or_default();
            deep_merge(&mut doc, merge);
            for (field_path, delta) in increments {
                increment_field(&mut doc, field_path, *delta);
            }
            Some(doc)
        }
    }
}

fn deep_merge(target: &mut Document, patch: &Document) {
    for (key, value) in patch {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(nested)) => deep_merge(existing, nested),
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

fn increment_field(doc: &mut Document, field_path: &str, delta: i64) {
    let mut segments: Vec<&str> = field_path.split('.').collect();
    let Some(leaf) = segments.pop() else {
        return;
    };

    let mut node = doc;
    for segment in segments {
        let entry = node
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        node = match entry {
            Value::Object(map) => map,
            _ => return,
        };
    }

    let next = match node.get(leaf) {
        Some(Value::Number(n)) if n.is_i64() => Value::from(n.as_i64().unwrap_or(0).saturating_add(delta)),
        Some(Value::Number(n)) => Value::from(n.as_f64().unwrap_or(0.0) + delta as f64),
        _ => Value::from(delta),
    };
    node.insert(leaf.to_string(), next);
}

// ========================================
// Typed (de)serialization
// ========================================

pub fn to_document<T: Serialize>(value: &T) -> Result<Document> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(Error::Internal(format!(
            "expected a JSON object document, got {}",
            other
        ))),
    }
}

pub fn from_document<T: DeserializeOwned>(doc: Document) -> Result<T> {
    Ok(serde_json::from_value(Value::Object(doc))?)
}

// ========================================
// Store Trait
// ========================================

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, path: &DocPath) -> Result<Option<Document>>;

    /// Direct children of a collection as `(doc_id, document)`, ordered by id
    async fn list(&self, collection: &str) -> Result<Vec<(String, Document)>>;

    /// Commit a batch atomically.
    ///
    /// Batches larger than [`batch_limit`](Self::batch_limit) are rejected
    /// with [`Error::InvalidInput`] before anything is written.
    async fn commit(&self, batch: WriteBatch) -> Result<()>;

    /// One optimistic transaction attempt on a single document.
    ///
    /// Reads the document, applies `update`, and writes the result only if
    /// nobody wrote the document in between; otherwise returns
    /// [`Error::Conflict`] without writing.
    async fn read_modify_write(&self, path: &DocPath, update: UpdateFn<'_>) -> Result<Document>;

    /// Maximum operations per committed batch
    fn batch_limit(&self) -> usize {
        BATCH_LIMIT
    }

    /// Atomic increment of numeric fields (dotted paths allowed)
    async fn increment(&self, path: &DocPath, increments: BTreeMap<String, i64>) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::increment(path.clone(), increments));
        self.commit(batch).await
    }

    /// Write `data`, preserving fields not present in it
    async fn set_merge(&self, path: &DocPath, data: Document) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::merge(path.clone(), data));
        self.commit(batch).await
    }

    /// Overwrite the document with `data`
    async fn set(&self, path: &DocPath, data: Document) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::set(path.clone(), data));
        self.commit(batch).await
    }
}

pub(crate) fn check_batch_size(batch: &WriteBatch, limit: usize) -> Result<()> {
    if batch.len() > limit {
        return Err(Error::InvalidInput(format!(
            "batch of {} operations exceeds the limit of {}",
            batch.len(),
            limit
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    fn incs(pairs: &[(&str, i64)]) -> BTreeMap<String, i64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_increment_creates_missing_fields() {
        let op = WriteOp::increment(
            DocPath::new("c/d"),
            incs(&[("points", 4), ("byPhase.regular.points", 4)]),
        );
        let out = apply_write(None, &op).unwrap();
        assert_eq!(Value::Object(out), json!({"points": 4, "byPhase": {"regular": {"points": 4}}}));
    }

    #[test]
    fn test_increment_adds_and_replaces_non_numbers() {
        let current = doc(json!({"points": 10, "assists": "n/a", "byPhase": 3}));
        let op = WriteOp::increment(
            DocPath::new("c/d"),
            incs(&[("points", -3), ("assists", 2), ("byPhase.playoff.points", 1)]),
        );
        let out = apply_write(Some(current), &op).unwrap();
        assert_eq!(
            Value::Object(out),
            json!({"points": 7, "assists": 2, "byPhase": {"playoff": {"points": 1}}})
        );
    }

    #[test]
    fn test_increment_saturates() {
        let current = doc(json!({"points": i64::MAX}));
        let op = WriteOp::increment(DocPath::new("c/d"), incs(&[("points", 5)]));
        let out = apply_write(Some(current), &op).unwrap();
        assert_eq!(out["points"], json!(i64::MAX));
    }

    #[test]
    fn test_merge_preserves_unmentioned_fields() {
        let current = doc(json!({
            "homeScore": 80,
            "status": "scheduled",
            "meta": {"venue": "Arena", "attendance": 900}
        }));
        let op = WriteOp::merge(
            DocPath::new("c/d"),
            doc(json!({"status": "finished", "meta": {"attendance": 1200}})),
        );
        let out = apply_write(Some(current), &op).unwrap();
        assert_eq!(
            Value::Object(out),
            json!({
                "homeScore": 80,
                "status": "finished",
                "meta": {"venue": "Arena", "attendance": 1200}
            })
        );
    }

    #[test]
    fn test_set_and_delete() {
        let current = doc(json!({"a": 1}));
        let set = WriteOp::set(DocPath::new("c/d"), doc(json!({"b": 2})));
        assert_eq!(
            apply_write(Some(current.clone()), &set).map(Value::Object),
            Some(json!({"b": 2}))
        );
        assert_eq!(apply_write(Some(current), &WriteOp::delete(DocPath::new("c/d"))), None);
    }
}

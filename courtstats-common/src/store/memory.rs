//! In-memory document store

use super::{apply_write, check_batch_size, Document, DocumentStore, UpdateFn, WriteBatch};
use crate::fields::BATCH_LIMIT;
use crate::paths::DocPath;
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct Entry {
    doc: Document,
    version: u64,
}

#[derive(Debug, Default)]
struct Inner {
    docs: BTreeMap<String, Entry>,
    /// Store-wide write counter; every write stamps a fresh version
    clock: u64,
}

impl Inner {
    fn write(&mut self, path: &str, doc: Option<Document>) {
        self.clock += 1;
        match doc {
            Some(doc) => {
                self.docs.insert(
                    path.to_string(),
                    Entry {
                        doc,
                        version: self.clock,
                    },
                );
            }
            None => {
                self.docs.remove(path);
            }
        }
    }
}

/// Ordered map of path → versioned document behind an async RwLock
#[derive(Debug)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    batch_limit: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            batch_limit: BATCH_LIMIT,
        }
    }

    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit.max(1);
        self
    }

    /// Number of stored documents
    pub async fn len(&self) -> usize {
        self.inner.read().await.docs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Every stored path, sorted
    pub async fn paths(&self) -> Vec<String> {
        self.inner.read().await.docs.keys().cloned().collect()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &DocPath) -> Result<Option<Document>> {
        let inner = self.inner.read().await;
        Ok(inner.docs.get(path.as_str()).map(|e| e.doc.clone()))
    }

    async fn list(&self, collection: &str) -> Result<Vec<(String, Document)>> {
        let prefix = format!("{}/", collection);
        let inner = self.inner.read().await;
        Ok(inner
            .docs
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .filter_map(|(path, entry)| {
                let id = &path[prefix.len()..];
                (!id.contains('/')).then(|| (id.to_string(), entry.doc.clone()))
            })
            .collect())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        check_batch_size(&batch, self.batch_limit)?;

        // Holding the write lock for the whole batch makes it atomic
        let mut inner = self.inner.write().await;
        for op in batch.ops() {
            let path = op.path().as_str();
            let current = inner.docs.get(path).map(|e| e.doc.clone());
            let next = apply_write(current, op);
            inner.write(path, next);
        }
        Ok(())
    }

    async fn read_modify_write(&self, path: &DocPath, update: UpdateFn<'_>) -> Result<Document> {
        let (current, read_version) = {
            let inner = self.inner.read().await;
            match inner.docs.get(path.as_str()) {
                Some(e) => (Some(e.doc.clone()), Some(e.version)),
                None => (None, None),
            }
        };

        let next = update(current)?;

        let mut inner = self.inner.write().await;
        let now_version = inner.docs.get(path.as_str()).map(|e| e.version);
        if now_version != read_version {
            return Err(Error::Conflict(path.to_string()));
        }
        inner.write(path.as_str(), Some(next.clone()));
        Ok(next)
    }

    fn batch_limit(&self) -> usize {
        self.batch_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_interleaved_write_is_a_conflict() {
        let store = MemoryStore::new();
        let path = DocPath::team_aggregate("s1", "t1");

        // Another writer lands between this attempt's read and its write
        let racing = |current: Option<Document>| -> Result<Document> {
            let mut other = Document::new();
            other.insert("winner".into(), json!("other"));
            if let Ok(mut inner) = store.inner.try_write() {
                inner.write(path.as_str(), Some(other));
            }
            let mut mine = current.unwrap_or_default();
            mine.insert("winner".into(), json!("mine"));
            Ok(mine)
        };

        let result = store.read_modify_write(&path, &racing).await;
        assert!(matches!(result, Err(Error::Conflict(_))));
        let stored = store.get(&path).await.unwrap().unwrap();
        assert_eq!(stored["winner"], "other");
    }

    #[tokio::test]
    async fn test_list_ignores_nested_and_sibling_collections() {
        let store = MemoryStore::new();
        store.set(&DocPath::new("a/1"), Document::new()).await.unwrap();
        store.set(&DocPath::new("a/1/b/2"), Document::new()).await.unwrap();
        store.set(&DocPath::new("ab/3"), Document::new()).await.unwrap();

        let ids: Vec<String> = store.list("a").await.unwrap().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["1"]);
        assert_eq!(store.len().await, 3);
    }
}

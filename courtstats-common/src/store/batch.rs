//! Bounded batch composition
//!
//! Queues write operations into batches of at most `limit` operations,
//! starting a new batch whenever the current one is full. The caller
//! commits the whole list at once.

use super::{Document, DocumentStore, WriteBatch, WriteOp};
use crate::paths::DocPath;
use crate::Result;
use futures::future::try_join_all;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug)]
pub struct BatchWriter {
    limit: usize,
    current: WriteBatch,
    sealed: Vec<WriteBatch>,
}

impl BatchWriter {
    /// `limit` is clamped to at least 1
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            current: WriteBatch::new(),
            sealed: Vec::new(),
        }
    }

    pub fn push(&mut self, op: WriteOp) {
        if self.current.len() >= self.limit {
            let full = std::mem::take(&mut self.current);
            self.sealed.push(full);
        }
        self.current.push(op);
    }

    pub fn set(&mut self, path: DocPath, data: Document) {
        self.push(WriteOp::set(path, data));
    }

    pub fn merge(&mut self, path: DocPath, data: Document) {
        self.push(WriteOp::merge(path, data));
    }

    pub fn update(&mut self, path: DocPath, merge: Document, increments: BTreeMap<String, i64>) {
        self.push(WriteOp::Update {
            path,
            merge,
            increments,
        });
    }

    pub fn delete(&mut self, path: DocPath) {
        self.push(WriteOp::delete(path));
    }

    /// Total queued operations across all batches
    pub fn op_count(&self) -> usize {
        self.sealed.iter().map(WriteBatch::len).sum::<usize>() + self.current.len()
    }

    pub fn into_batches(mut self) -> Vec<WriteBatch> {
        if !self.current.is_empty() {
            self.sealed.push(self.current);
        }
        self.sealed
    }

    /// Commit every batch in parallel.
    ///
    /// Fails on the first batch error. Batches that already committed stay
    /// committed.
    pub async fn commit_all(self, store: &dyn DocumentStore) -> Result<usize> {
        let ops = self.op_count();
        let batches = self.into_batches();
        debug!(batches = batches.len(), ops, "Committing write batches");
        try_join_all(batches.into_iter().map(|batch| store.commit(batch))).await?;
        Ok(ops)
    }
}

//! Deterministic in-memory remote collection.
//!
//! # Responsibility
//! - Provide a fully in-process `RemoteCollection` for offline operation
//!   and tests, with the same optimistic-concurrency and change-feed
//!   semantics a hosted document store exposes.
//!
//! # Invariants
//! - Revisions start at 1 and increase by 1 per accepted write.
//! - Change-feed tokens are the decimal global change counter; a document
//!   appears in the feed once per accepted write position (latest state).

use crate::model::expense::{ExpenseId, ExpenseRecord};
use crate::sync::remote::{RemoteCollection, RemoteDocument, RemoteError, RemotePage, RemoteResult};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

#[derive(Debug, Default)]
struct MemoryRemoteInner {
    /// Latest state per document, with the global change position of its
    /// most recent accepted write.
    documents: BTreeMap<ExpenseId, (RemoteDocument, u64)>,
    change_counter: u64,
    /// Failures injected by tests, consumed one per operation.
    injected_failures: VecDeque<RemoteError>,
}

/// In-memory remote document collection.
pub struct MemoryRemote {
    inner: Mutex<MemoryRemoteInner>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryRemoteInner::default()),
        }
    }

    /// Queues a failure to be returned by the next remote operation.
    pub fn inject_failure(&self, error: RemoteError) {
        self.lock().injected_failures.push_back(error);
    }

    /// Returns the current remote state of one document.
    pub fn document(&self, id: ExpenseId) -> Option<RemoteDocument> {
        self.lock().documents.get(&id).map(|(doc, _)| doc.clone())
    }

    pub fn document_count(&self) -> usize {
        self.lock().documents.len()
    }

    /// Applies a write directly, bypassing optimistic concurrency.
    ///
    /// Test helper modeling another device's already-synced edit.
    pub fn force_put(&self, record: ExpenseRecord) -> i64 {
        let mut inner = self.lock();
        let next_revision = inner
            .documents
            .get(&record.id)
            .map_or(1, |(doc, _)| doc.revision + 1);
        inner.change_counter += 1;
        let position = inner.change_counter;

        let mut record = record;
        record.revision = next_revision;
        inner.documents.insert(
            record.id,
            (
                RemoteDocument {
                    record,
                    revision: next_revision,
                },
                position,
            ),
        );
        next_revision
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryRemoteInner> {
        // Lock poisoning only happens if a panic occurred mid-operation;
        // recover the data rather than cascading the panic.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteCollection for MemoryRemote {
    fn put_document(&self, record: &ExpenseRecord, base_revision: i64) -> RemoteResult<i64> {
        let mut inner = self.lock();
        if let Some(error) = inner.injected_failures.pop_front() {
            return Err(error);
        }

        let current = inner.documents.get(&record.id).map(|(doc, _)| doc.clone());
        let next_revision = match &current {
            None if base_revision == 0 => 1,
            None => return Err(RemoteError::Conflict { current: None }),
            Some(doc) if doc.revision == base_revision => doc.revision + 1,
            Some(doc) => {
                return Err(RemoteError::Conflict {
                    current: Some(doc.clone()),
                })
            }
        };

        inner.change_counter += 1;
        let position = inner.change_counter;

        let mut stored = record.clone();
        stored.revision = next_revision;
        inner.documents.insert(
            record.id,
            (
                RemoteDocument {
                    record: stored,
                    revision: next_revision,
                },
                position,
            ),
        );

        Ok(next_revision)
    }

    fn fetch_since(
        &self,
        owner: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> RemoteResult<RemotePage> {
        let mut inner = self.lock();
        if let Some(error) = inner.injected_failures.pop_front() {
            return Err(error);
        }

        let since = match cursor {
            None => 0,
            Some(token) => token.parse::<u64>().map_err(|_| {
                RemoteError::Rejected(format!("malformed change-feed token `{token}`"))
            })?,
        };

        let mut changed: Vec<(u64, RemoteDocument)> = inner
            .documents
            .values()
            .filter(|(doc, position)| doc.record.owner == owner && *position > since)
            .map(|(doc, position)| (*position, doc.clone()))
            .collect();
        changed.sort_by_key(|(position, _)| *position);

        let has_more = changed.len() > limit as usize;
        changed.truncate(limit as usize);

        let next_cursor = changed
            .last()
            .map(|(position, _)| position.to_string());
        let documents = changed.into_iter().map(|(_, doc)| doc).collect();

        Ok(RemotePage {
            documents,
            next_cursor,
            has_more,
        })
    }
}

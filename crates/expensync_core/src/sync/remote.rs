//! Remote collection contract.
//!
//! # Responsibility
//! - Define the document-store surface the sync engine reconciles against:
//!   optimistic-concurrency writes and cursor-based change feeds.
//!
//! # Invariants
//! - Revisions are assigned by the remote and only ever increase per
//!   document.
//! - Version tokens are opaque to the engine; they are stored and echoed
//!   back, never interpreted.

use crate::model::expense::ExpenseRecord;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RemoteResult<T> = Result<T, RemoteError>;

/// One document as held by the remote collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDocument {
    pub record: ExpenseRecord,
    /// Server-assigned revision of this document.
    pub revision: i64,
}

/// One page of the remote change feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePage {
    /// Changed documents in feed order.
    pub documents: Vec<RemoteDocument>,
    /// Token covering everything up to and including this page.
    pub next_cursor: Option<String>,
    /// Whether another page is immediately available.
    pub has_more: bool,
}

/// Remote failure envelope.
///
/// `Transient` suspends the cycle for retry with backoff; `Rejected`
/// quarantines the offending entry; `Conflict` routes into conflict
/// resolution and is never surfaced to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Optimistic concurrency miss: the remote holds a different revision.
    /// `current` is `None` when the document does not exist remotely.
    Conflict { current: Option<RemoteDocument> },
    /// Retryable failure (network, throttling, remote unavailability).
    Transient(String),
    /// Permanent per-document rejection (malformed payload, policy).
    Rejected(String),
}

impl RemoteError {
    /// Whether the failed operation is safe and worthwhile to retry as-is.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl Display for RemoteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Conflict { current: Some(doc) } => write!(
                f,
                "remote revision conflict: document {} is at revision {}",
                doc.record.id, doc.revision
            ),
            Self::Conflict { current: None } => {
                write!(f, "remote revision conflict: document absent")
            }
            Self::Transient(message) => write!(f, "transient remote failure: {message}"),
            Self::Rejected(message) => write!(f, "remote rejected document: {message}"),
        }
    }
}

impl Error for RemoteError {}

/// Remote document collection keyed by expense record id.
///
/// Implementations map this onto a backend-as-a-service document store;
/// `MemoryRemote` provides a deterministic in-process implementation.
pub trait RemoteCollection {
    /// Writes one document using optimistic concurrency.
    ///
    /// `base_revision` is the revision the caller believes the remote holds
    /// (0 for a document that should not exist yet). Returns the newly
    /// assigned revision on success, `RemoteError::Conflict` on a revision
    /// mismatch.
    fn put_document(&self, record: &ExpenseRecord, base_revision: i64) -> RemoteResult<i64>;

    /// Fetches documents owned by `owner` changed since `cursor`, oldest
    /// first, at most `limit` per page.
    fn fetch_since(
        &self,
        owner: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> RemoteResult<RemotePage>;
}

impl<T: RemoteCollection + ?Sized> RemoteCollection for &T {
    fn put_document(&self, record: &ExpenseRecord, base_revision: i64) -> RemoteResult<i64> {
        (**self).put_document(record, base_revision)
    }

    fn fetch_since(
        &self,
        owner: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> RemoteResult<RemotePage> {
        (**self).fetch_since(owner, cursor, limit)
    }
}

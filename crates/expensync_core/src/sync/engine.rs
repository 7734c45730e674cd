//! Sync engine: journal-to-remote reconciliation cycles.
//!
//! # Responsibility
//! - Push pending journal entries to the remote in sequence order with
//!   optimistic concurrency.
//! - Pull remote changes since the persisted cursor and apply them locally.
//! - Resolve conflicts deterministically and report what was applied.
//!
//! # Conflict policy
//! - Last-writer-wins on `updated_at`.
//! - Ties break by lexicographic `device_id` ordering (greater wins).
//! - A tombstone always wins over a concurrent non-delete edit.
//!
//! # Invariants
//! - At most one cycle runs at a time per engine.
//! - The cursor advances only after push and pull both succeeded for the
//!   processed batch.
//! - Cancellation is honored between batches and between phases, never
//!   mid-batch; a cancelled cycle leaves the cursor unadvanced.
//! - A single entry's permanent rejection quarantines that entry without
//!   stalling the rest of the batch.

use crate::model::expense::ExpenseRecord;
use crate::repo::cursor_repo::{SqliteSyncCursorStore, SyncCursorStore};
use crate::repo::expense_repo::{ExpenseStore, SqliteExpenseStore};
use crate::repo::journal_repo::{ChangeJournal, JournalEntry, SqliteChangeJournal};
use crate::repo::RepoError;
use crate::session::UserSession;
use crate::sync::remote::{RemoteCollection, RemoteDocument, RemoteError};
use log::{info, warn};
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

const DEFAULT_PUSH_BATCH: u32 = 50;
const DEFAULT_PULL_BATCH: u32 = 100;
/// Conflict re-push attempts before giving up on a contended document.
const MAX_PUSH_ATTEMPTS: u32 = 3;

pub type SyncResult<T> = Result<T, SyncError>;

/// Sync-cycle failure.
#[derive(Debug)]
pub enum SyncError {
    Repo(RepoError),
    Remote(RemoteError),
    /// Another cycle is already running on this engine.
    CycleInFlight,
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(err) => write!(f, "{err}"),
            Self::Remote(err) => write!(f, "{err}"),
            Self::CycleInFlight => write!(f, "a sync cycle is already in flight"),
        }
    }
}

impl Error for SyncError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::Remote(err) => Some(err),
            Self::CycleInFlight => None,
        }
    }
}

impl From<RepoError> for SyncError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl SyncError {
    /// Whether retrying the whole cycle later can succeed without
    /// intervention.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Remote(err) if err.is_transient())
    }
}

/// Which side survives a concurrent edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictWinner {
    Local,
    Remote,
}

/// Resolves a conflict between the local and remote state of one record.
///
/// Deterministic: the outcome depends only on the two records, never on
/// processing order.
pub fn resolve_conflict(local: &ExpenseRecord, remote: &ExpenseRecord) -> ConflictWinner {
    match (local.is_deleted, remote.is_deleted) {
        (true, false) => ConflictWinner::Local,
        (false, true) => ConflictWinner::Remote,
        _ => {
            if local.updated_at != remote.updated_at {
                if local.updated_at > remote.updated_at {
                    ConflictWinner::Local
                } else {
                    ConflictWinner::Remote
                }
            } else if local.device_id > remote.device_id {
                ConflictWinner::Local
            } else {
                ConflictWinner::Remote
            }
        }
    }
}

/// One record change the engine applied to the local store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedChange {
    pub previous: Option<ExpenseRecord>,
    pub current: ExpenseRecord,
}

/// Outcome summary of one sync cycle.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub pushed: u32,
    pub pulled: u32,
    pub conflicts_resolved: u32,
    /// Sequence numbers quarantined during this cycle.
    pub quarantined: Vec<i64>,
    /// Acknowledged journal entries pruned at cycle end.
    pub pruned: usize,
    pub cursor_advanced: bool,
    pub cancelled: bool,
    /// Local-store changes applied by this cycle, for aggregation and
    /// subscriber notification by the caller.
    pub applied: Vec<AppliedChange>,
}

/// Cooperative cancellation handle shared with the engine.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Re-arms the flag so the next cycle can run after a cancellation.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Resets the in-flight gate when a cycle ends, however it ends.
struct CycleGate<'a>(&'a AtomicBool);

impl Drop for CycleGate<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Reconciles the change journal against a remote collection.
pub struct SyncEngine<'conn, R: RemoteCollection> {
    conn: &'conn Connection,
    remote: R,
    push_batch: u32,
    pull_batch: u32,
    in_flight: AtomicBool,
    cancel: CancelFlag,
}

impl<'conn, R: RemoteCollection> SyncEngine<'conn, R> {
    pub fn new(conn: &'conn Connection, remote: R) -> Self {
        Self {
            conn,
            remote,
            push_batch: DEFAULT_PUSH_BATCH,
            pull_batch: DEFAULT_PULL_BATCH,
            in_flight: AtomicBool::new(false),
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_batch_sizes(mut self, push_batch: u32, pull_batch: u32) -> Self {
        self.push_batch = push_batch.max(1);
        self.pull_batch = pull_batch.max(1);
        self
    }

    /// Returns a handle for cancelling the engine from another context.
    pub fn cancel_handle(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Runs one push/pull reconciliation cycle for the session user.
    ///
    /// # Errors
    /// - `CycleInFlight` when another cycle is running on this engine.
    /// - Transient remote failures abort the cycle for caller-side retry;
    ///   unacknowledged entries stay replayable.
    pub fn sync_cycle(&self, session: &UserSession) -> SyncResult<CycleReport> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SyncError::CycleInFlight);
        }
        let _gate = CycleGate(&self.in_flight);

        let started_at = Instant::now();
        info!(
            "event=sync_cycle module=sync status=start user={}",
            session.user_id
        );

        let result = self.run_cycle(session);
        match &result {
            Ok(report) => {
                let status = if report.cancelled { "cancelled" } else { "ok" };
                info!(
                    "event=sync_cycle module=sync status={status} user={} duration_ms={} pushed={} pulled={} conflicts={} quarantined={} pruned={}",
                    session.user_id,
                    started_at.elapsed().as_millis(),
                    report.pushed,
                    report.pulled,
                    report.conflicts_resolved,
                    report.quarantined.len(),
                    report.pruned,
                );
            }
            Err(err) => {
                warn!(
                    "event=sync_cycle module=sync status=error user={} duration_ms={} transient={} error={err}",
                    session.user_id,
                    started_at.elapsed().as_millis(),
                    err.is_transient(),
                );
            }
        }

        result
    }

    fn run_cycle(&self, session: &UserSession) -> SyncResult<CycleReport> {
        let store = SqliteExpenseStore::new(self.conn);
        let journal = SqliteChangeJournal::new(self.conn);
        let cursor = SqliteSyncCursorStore::new(self.conn);
        let mut report = CycleReport::default();

        self.push_phase(session, &store, &journal, &mut report)?;
        if self.cancel.is_cancelled() {
            report.cancelled = true;
            return Ok(report);
        }

        let advanced_token = self.pull_phase(session, &store, &journal, &cursor, &mut report)?;
        if report.cancelled {
            return Ok(report);
        }

        if let Some(token) = advanced_token {
            cursor.advance(&token)?;
            report.cursor_advanced = true;
        }

        report.pruned = journal.delete_acknowledged()?;
        Ok(report)
    }

    /// Drains unacknowledged journal entries in sequence order.
    fn push_phase(
        &self,
        session: &UserSession,
        store: &SqliteExpenseStore<'_>,
        journal: &SqliteChangeJournal<'_>,
        report: &mut CycleReport,
    ) -> SyncResult<()> {
        let mut last_seq = 0;
        loop {
            let entries = journal.unacknowledged_since(last_seq, self.push_batch)?;
            if entries.is_empty() {
                return Ok(());
            }

            for entry in &entries {
                if entry.payload.owner != session.user_id {
                    // Journaled under another session; leave it for that
                    // user's cycle.
                    warn!(
                        "event=sync_push module=sync status=skipped seq={} reason=owner_mismatch",
                        entry.seq
                    );
                    continue;
                }
                self.push_entry(store, journal, entry, report)?;
            }

            last_seq = entries.last().map_or(last_seq, |entry| entry.seq);
            if self.cancel.is_cancelled() {
                return Ok(());
            }
        }
    }

    fn push_entry(
        &self,
        store: &SqliteExpenseStore<'_>,
        journal: &SqliteChangeJournal<'_>,
        entry: &JournalEntry,
        report: &mut CycleReport,
    ) -> SyncResult<()> {
        journal.mark_in_flight(entry.seq)?;

        let mut base_revision = entry.base_revision;
        for _ in 0..MAX_PUSH_ATTEMPTS {
            match self.remote.put_document(&entry.payload, base_revision) {
                Ok(new_revision) => {
                    journal.mark_acknowledged(entry.seq)?;
                    self.confirm_local_revision(store, &entry.payload, new_revision)?;
                    report.pushed += 1;
                    return Ok(());
                }
                Err(RemoteError::Conflict { current }) => match current {
                    None => {
                        // Remote lost (or never saw) the document; re-offer
                        // it as a create.
                        base_revision = 0;
                    }
                    Some(doc) => {
                        report.conflicts_resolved += 1;
                        match resolve_conflict(&entry.payload, &doc.record) {
                            ConflictWinner::Local => {
                                base_revision = doc.revision;
                            }
                            ConflictWinner::Remote => {
                                journal.mark_acknowledged(entry.seq)?;
                                self.apply_remote_document(store, journal, &doc, report)?;
                                return Ok(());
                            }
                        }
                    }
                },
                Err(RemoteError::Rejected(reason)) => {
                    journal.quarantine(entry.seq, &reason)?;
                    warn!(
                        "event=sync_push module=sync status=quarantined seq={} record={} reason={reason}",
                        entry.seq, entry.record_id
                    );
                    report.quarantined.push(entry.seq);
                    return Ok(());
                }
                Err(err @ RemoteError::Transient(_)) => return Err(SyncError::Remote(err)),
            }
        }

        // Persistent contention on one document; surface as transient so the
        // runner retries the whole cycle with backoff.
        Err(SyncError::Remote(RemoteError::Transient(format!(
            "push contention on record {} after {MAX_PUSH_ATTEMPTS} attempts",
            entry.record_id
        ))))
    }

    /// Fetches and applies remote changes. Returns the token to persist, or
    /// `None` when the feed produced nothing new.
    fn pull_phase(
        &self,
        session: &UserSession,
        store: &SqliteExpenseStore<'_>,
        journal: &SqliteChangeJournal<'_>,
        cursor: &SqliteSyncCursorStore<'_>,
        report: &mut CycleReport,
    ) -> SyncResult<Option<String>> {
        let mut token = cursor.token()?;
        let mut newest_token = None;

        loop {
            let page = self
                .remote
                .fetch_since(&session.user_id, token.as_deref(), self.pull_batch)
                .map_err(SyncError::Remote)?;

            for doc in &page.documents {
                if doc.record.owner != session.user_id {
                    // The feed is owner-scoped, but ownership is verified
                    // again before anything touches the local store.
                    warn!(
                        "event=sync_pull module=sync status=skipped record={} reason=owner_mismatch",
                        doc.record.id
                    );
                    continue;
                }
                if self.apply_remote_document(store, journal, doc, report)? {
                    report.pulled += 1;
                }
            }

            if let Some(next) = page.next_cursor {
                token = Some(next.clone());
                newest_token = Some(next);
            }

            if !page.has_more {
                return Ok(newest_token);
            }
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                return Ok(None);
            }
        }
    }

    /// Applies one remote document to the local store; returns whether the
    /// store changed. Replaying an already-applied revision is a no-op.
    fn apply_remote_document(
        &self,
        store: &SqliteExpenseStore<'_>,
        journal: &SqliteChangeJournal<'_>,
        doc: &RemoteDocument,
        report: &mut CycleReport,
    ) -> SyncResult<bool> {
        let previous = store.get(doc.record.id, true)?;

        let mut incoming = doc.record.clone();
        incoming.revision = doc.revision;

        if let Some(local) = &previous {
            if local.revision >= doc.revision {
                return Ok(false);
            }
            if journal.pending_count_for(doc.record.id)? > 0 {
                // Local unpushed edit concurrent with this remote change.
                report.conflicts_resolved += 1;
                if resolve_conflict(local, &incoming) == ConflictWinner::Local {
                    // The local edit survives; its own push will overwrite
                    // the remote.
                    return Ok(false);
                }
            }
        }

        store.put(&incoming)?;
        report.applied.push(AppliedChange {
            previous,
            current: incoming,
        });
        Ok(true)
    }

    /// Records a remote-assigned revision on the local copy, unless a newer
    /// local edit (with its own journal entry) has already moved on.
    fn confirm_local_revision(
        &self,
        store: &SqliteExpenseStore<'_>,
        snapshot: &ExpenseRecord,
        new_revision: i64,
    ) -> SyncResult<()> {
        let Some(current) = store.get(snapshot.id, true)? else {
            return Ok(());
        };

        if current.updated_at == snapshot.updated_at && current.device_id == snapshot.device_id {
            let mut confirmed = current;
            confirmed.revision = new_revision;
            store.put(&confirmed)?;
        }
        Ok(())
    }
}

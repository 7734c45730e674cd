//! Change journal contracts and SQLite implementation.
//!
//! # Responsibility
//! - Append local mutations with strictly increasing sequence numbers.
//! - Track per-entry sync status through its forward-only lifecycle.
//!
//! # Invariants
//! - Sequence numbers are assigned by SQLite AUTOINCREMENT and are never
//!   reused, including across restarts.
//! - Status moves only forward: pending -> in_flight -> acknowledged, with
//!   `failed` as a quarantine branch off pending/in_flight.
//! - `append` persists before returning; durability precedes acknowledgment
//!   to the caller.

use crate::model::expense::{from_epoch_ms, to_epoch_ms, ChangeOp, ExpenseId, ExpenseRecord};
use crate::repo::{RepoError, RepoResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

const ENTRY_SELECT_SQL: &str = "SELECT
    seq,
    record_id,
    op,
    payload,
    base_revision,
    status,
    failure_reason,
    appended_at
FROM change_journal";

/// Sync lifecycle state of one journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// Appended locally, not yet offered to the remote.
    Pending,
    /// Offered to the remote; outcome unknown (safe to re-offer).
    InFlight,
    /// Remote confirmed the mutation; entry awaits pruning.
    Acknowledged,
    /// Permanently rejected and quarantined; requires caller action.
    Failed,
}

impl SyncStatus {
    pub(crate) fn as_db(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Acknowledged => "acknowledged",
            Self::Failed => "failed",
        }
    }

    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "in_flight" => Some(Self::InFlight),
            "acknowledged" => Some(Self::Acknowledged),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// One journaled local mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    /// Local sequence number, strictly increasing per device.
    pub seq: i64,
    pub record_id: ExpenseId,
    pub op: ChangeOp,
    /// Snapshot of the record at mutation time.
    pub payload: ExpenseRecord,
    /// Revision the mutation was made against; optimistic concurrency base.
    pub base_revision: i64,
    pub status: SyncStatus,
    /// Set only for quarantined entries.
    pub failure_reason: Option<String>,
    pub appended_at: DateTime<Utc>,
}

/// Append-only journal of local mutations pending sync.
pub trait ChangeJournal {
    /// Appends a mutation; returns the assigned sequence number.
    fn append(&self, op: ChangeOp, record: &ExpenseRecord) -> RepoResult<i64>;
    /// Returns unacknowledged entries (pending or in-flight) with
    /// `seq > since`, ordered by sequence, for replay.
    fn unacknowledged_since(&self, since: i64, limit: u32) -> RepoResult<Vec<JournalEntry>>;
    /// Marks one entry as offered to the remote.
    fn mark_in_flight(&self, seq: i64) -> RepoResult<()>;
    /// Marks one entry as remotely confirmed. Idempotent.
    fn mark_acknowledged(&self, seq: i64) -> RepoResult<()>;
    /// Quarantines one permanently rejected entry with a reason.
    fn quarantine(&self, seq: i64, reason: &str) -> RepoResult<()>;
    /// Returns a quarantined entry to pending for another attempt.
    fn requeue(&self, seq: i64) -> RepoResult<()>;
    /// Drops a quarantined entry the caller chose to abandon.
    fn discard(&self, seq: i64) -> RepoResult<()>;
    /// Prunes acknowledged entries; returns the number removed.
    fn delete_acknowledged(&self) -> RepoResult<usize>;
    /// Counts unacknowledged entries for one record ("pending sync" badge).
    fn pending_count_for(&self, record_id: ExpenseId) -> RepoResult<u32>;
    /// Lists quarantined entries for caller-side resolution.
    fn quarantined(&self) -> RepoResult<Vec<JournalEntry>>;
}

/// SQLite-backed change journal.
pub struct SqliteChangeJournal<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteChangeJournal<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn status_of(&self, seq: i64) -> RepoResult<Option<SyncStatus>> {
        let status_text: Option<String> = self
            .conn
            .query_row(
                "SELECT status FROM change_journal WHERE seq = ?1;",
                [seq],
                |row| row.get(0),
            )
            .optional()?;

        match status_text {
            None => Ok(None),
            Some(text) => SyncStatus::parse(&text)
                .map(Some)
                .ok_or_else(|| invalid_status(&text)),
        }
    }

    /// Runs a forward-only transition and maps a zero-row update onto the
    /// right semantic error.
    fn transition(
        &self,
        seq: i64,
        allowed_from: &[SyncStatus],
        to: SyncStatus,
        failure_reason: Option<&str>,
    ) -> RepoResult<()> {
        let placeholders = allowed_from
            .iter()
            .map(|status| format!("'{}'", status.as_db()))
            .collect::<Vec<_>>()
            .join(", ");

        let changed = self.conn.execute(
            &format!(
                "UPDATE change_journal
                 SET status = ?1, failure_reason = ?2
                 WHERE seq = ?3 AND status IN ({placeholders});"
            ),
            params![to.as_db(), failure_reason, seq],
        )?;

        if changed == 1 {
            return Ok(());
        }

        match self.status_of(seq)? {
            None => Err(RepoError::EntryNotFound(seq)),
            Some(current) => Err(RepoError::InvalidTransition {
                seq,
                from: current.as_db(),
                to: to.as_db(),
            }),
        }
    }
}

impl ChangeJournal for SqliteChangeJournal<'_> {
    fn append(&self, op: ChangeOp, record: &ExpenseRecord) -> RepoResult<i64> {
        record.validate()?;

        let payload = serde_json::to_string(record).map_err(|err| {
            RepoError::InvalidData(format!("failed to serialize journal payload: {err}"))
        })?;

        self.conn.execute(
            "INSERT INTO change_journal (
                record_id,
                op,
                payload,
                base_revision,
                status,
                appended_at
            ) VALUES (?1, ?2, ?3, ?4, 'pending', ?5);",
            params![
                record.id.to_string(),
                change_op_to_db(op),
                payload,
                record.revision,
                to_epoch_ms(Utc::now()),
            ],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    fn unacknowledged_since(&self, since: i64, limit: u32) -> RepoResult<Vec<JournalEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ENTRY_SELECT_SQL}
             WHERE seq > ?1 AND status IN ('pending', 'in_flight')
             ORDER BY seq ASC
             LIMIT ?2;"
        ))?;

        let mut rows = stmt.query(params![since, limit])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(parse_entry_row(row)?);
        }

        Ok(entries)
    }

    fn mark_in_flight(&self, seq: i64) -> RepoResult<()> {
        self.transition(
            seq,
            &[SyncStatus::Pending, SyncStatus::InFlight],
            SyncStatus::InFlight,
            None,
        )
    }

    fn mark_acknowledged(&self, seq: i64) -> RepoResult<()> {
        self.transition(
            seq,
            &[
                SyncStatus::Pending,
                SyncStatus::InFlight,
                SyncStatus::Acknowledged,
            ],
            SyncStatus::Acknowledged,
            None,
        )
    }

    fn quarantine(&self, seq: i64, reason: &str) -> RepoResult<()> {
        self.transition(
            seq,
            &[SyncStatus::Pending, SyncStatus::InFlight],
            SyncStatus::Failed,
            Some(reason),
        )
    }

    fn requeue(&self, seq: i64) -> RepoResult<()> {
        // The one sanctioned exception to forward-only: explicit caller
        // action returns a quarantined entry to the queue.
        self.transition(seq, &[SyncStatus::Failed], SyncStatus::Pending, None)
    }

    fn discard(&self, seq: i64) -> RepoResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM change_journal WHERE seq = ?1 AND status = 'failed';",
            [seq],
        )?;

        if changed == 1 {
            return Ok(());
        }

        match self.status_of(seq)? {
            None => Err(RepoError::EntryNotFound(seq)),
            Some(current) => Err(RepoError::InvalidTransition {
                seq,
                from: current.as_db(),
                to: "discarded",
            }),
        }
    }

    fn delete_acknowledged(&self) -> RepoResult<usize> {
        let removed = self.conn.execute(
            "DELETE FROM change_journal WHERE status = 'acknowledged';",
            [],
        )?;
        Ok(removed)
    }

    fn pending_count_for(&self, record_id: ExpenseId) -> RepoResult<u32> {
        let count: u32 = self.conn.query_row(
            "SELECT COUNT(*)
             FROM change_journal
             WHERE record_id = ?1 AND status IN ('pending', 'in_flight');",
            [record_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn quarantined(&self) -> RepoResult<Vec<JournalEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ENTRY_SELECT_SQL}
             WHERE status = 'failed'
             ORDER BY seq ASC;"
        ))?;

        let mut rows = stmt.query([])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(parse_entry_row(row)?);
        }

        Ok(entries)
    }
}

fn parse_entry_row(row: &Row<'_>) -> RepoResult<JournalEntry> {
    let record_id_text: String = row.get("record_id")?;
    let record_id = Uuid::parse_str(&record_id_text).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid uuid value `{record_id_text}` in change_journal.record_id"
        ))
    })?;

    let op_text: String = row.get("op")?;
    let op = parse_change_op(&op_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid op `{op_text}` in change_journal.op"))
    })?;

    let payload_text: String = row.get("payload")?;
    let payload: ExpenseRecord = serde_json::from_str(&payload_text).map_err(|err| {
        RepoError::InvalidData(format!(
            "failed to parse journal payload for seq {}: {err}",
            row.get::<_, i64>("seq").unwrap_or(-1)
        ))
    })?;

    let status_text: String = row.get("status")?;
    let status = SyncStatus::parse(&status_text).ok_or_else(|| invalid_status(&status_text))?;

    let appended_at_ms: i64 = row.get("appended_at")?;
    let appended_at = from_epoch_ms(appended_at_ms).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid timestamp `{appended_at_ms}` in change_journal.appended_at"
        ))
    })?;

    Ok(JournalEntry {
        seq: row.get("seq")?,
        record_id,
        op,
        payload,
        base_revision: row.get("base_revision")?,
        status,
        failure_reason: row.get("failure_reason")?,
        appended_at,
    })
}

fn change_op_to_db(op: ChangeOp) -> &'static str {
    match op {
        ChangeOp::Create => "create",
        ChangeOp::Update => "update",
        ChangeOp::Delete => "delete",
    }
}

fn parse_change_op(value: &str) -> Option<ChangeOp> {
    match value {
        "create" => Some(ChangeOp::Create),
        "update" => Some(ChangeOp::Update),
        "delete" => Some(ChangeOp::Delete),
        _ => None,
    }
}

fn invalid_status(value: &str) -> RepoError {
    RepoError::InvalidData(format!(
        "invalid status `{value}` in change_journal.status"
    ))
}

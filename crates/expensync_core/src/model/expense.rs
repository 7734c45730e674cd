//! Expense record domain model.
//!
//! # Responsibility
//! - Define the canonical record shared by the local store, the change
//!   journal and remote documents.
//! - Provide lifecycle helpers for tombstone semantics and local mutation
//!   stamping.
//!
//! # Invariants
//! - `id` is stable across devices and never reused for another record.
//! - `amount` is non-negative for every persisted record.
//! - `is_deleted` is the source of truth for tombstone state; tombstoned
//!   records are retained, never physically removed by this core.
//! - `revision` only ever advances; it mirrors the last remote-acknowledged
//!   revision (0 before the first sync).

use crate::model::money::Money;
use crate::session::UserSession;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for an expense record.
pub type ExpenseId = Uuid;

/// Mutation kind recorded in the change journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    Create,
    Update,
    Delete,
}

/// Canonical expense record.
///
/// The same shape flows through the local store, journal payload snapshots
/// and remote documents, so sync never needs a mapping layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseRecord {
    /// Stable global ID used for remote keying and journal references.
    pub id: ExpenseId,
    /// Non-negative amount in cents.
    pub amount: Money,
    /// Normalized (trimmed, lowercase) category tag.
    pub category: String,
    /// When the expense happened, UTC-normalized.
    pub occurred_at: DateTime<Utc>,
    /// Free-form note.
    pub note: String,
    /// Owning user id; sync never applies records across owners.
    pub owner: String,
    /// Last remote-acknowledged revision; 0 before first sync.
    pub revision: i64,
    /// When the record was last mutated; drives last-writer-wins.
    pub updated_at: DateTime<Utc>,
    /// Device that produced the last mutation; deterministic conflict
    /// tie-break key.
    pub device_id: String,
    /// Logical delete tombstone.
    pub is_deleted: bool,
}

/// Caller-facing input for creating an expense.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpenseDraft {
    pub amount: Money,
    pub category: String,
    pub occurred_at: DateTime<Utc>,
    pub note: String,
}

impl ExpenseRecord {
    /// Creates a new record for the session user with a generated ID.
    ///
    /// # Invariants
    /// - `revision` starts at 0 (never synced).
    /// - `is_deleted` starts as `false`.
    pub fn new(session: &UserSession, draft: ExpenseDraft, now: DateTime<Utc>) -> Self {
        Self::with_id(Uuid::new_v4(), session, draft, now)
    }

    /// Creates a record with a caller-provided stable ID.
    ///
    /// Used by import/sync paths where identity already exists externally.
    pub fn with_id(
        id: ExpenseId,
        session: &UserSession,
        draft: ExpenseDraft,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            amount: draft.amount,
            category: normalize_category(&draft.category),
            occurred_at: draft.occurred_at,
            note: draft.note,
            owner: session.user_id.clone(),
            revision: 0,
            updated_at: now,
            device_id: session.device_id.clone(),
            is_deleted: false,
        }
    }

    /// Validates record invariants before persistence.
    ///
    /// # Errors
    /// - `NegativeAmount` when `amount < 0`.
    /// - `EmptyCategory` when the category normalizes to an empty string.
    /// - `EmptyOwner` when the owner id is blank.
    pub fn validate(&self) -> Result<(), ExpenseValidationError> {
        if self.amount.is_negative() {
            return Err(ExpenseValidationError::NegativeAmount(self.amount));
        }
        if self.category.trim().is_empty() {
            return Err(ExpenseValidationError::EmptyCategory);
        }
        if self.owner.trim().is_empty() {
            return Err(ExpenseValidationError::EmptyOwner);
        }
        Ok(())
    }

    /// Stamps a local mutation made by `session` at `now`.
    ///
    /// Revision is left untouched: the remote assigns revisions, local edits
    /// only move `updated_at`/`device_id` which drive conflict resolution.
    pub fn stamp_mutation(&mut self, session: &UserSession, now: DateTime<Utc>) {
        self.updated_at = now;
        self.device_id = session.device_id.clone();
    }

    /// Marks this record as logically deleted.
    pub fn tombstone(&mut self, session: &UserSession, now: DateTime<Utc>) {
        self.is_deleted = true;
        self.stamp_mutation(session, now);
    }

    /// Returns whether this record should be visible to queries by default.
    pub fn is_active(&self) -> bool {
        !self.is_deleted
    }
}

/// Normalizes a category tag: trimmed, lowercased.
pub fn normalize_category(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Converts a UTC instant to the epoch-millisecond representation used by
/// every persisted timestamp column.
pub(crate) fn to_epoch_ms(instant: DateTime<Utc>) -> i64 {
    instant.timestamp_millis()
}

/// Converts a persisted epoch-millisecond value back to a UTC instant.
///
/// Returns `None` for values outside chrono's representable range.
pub(crate) fn from_epoch_ms(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

/// Validation failure for an expense record. Rejected locally; an invalid
/// record never reaches the journal or the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpenseValidationError {
    NegativeAmount(Money),
    EmptyCategory,
    EmptyOwner,
}

impl Display for ExpenseValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NegativeAmount(amount) => {
                write!(f, "expense amount must be non-negative, got {amount}")
            }
            Self::EmptyCategory => write!(f, "expense category must not be empty"),
            Self::EmptyOwner => write!(f, "expense owner must not be empty"),
        }
    }
}

impl Error for ExpenseValidationError {}

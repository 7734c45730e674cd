//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define data access contracts for the local store, the change journal
//!   and the sync cursor.
//! - Isolate SQLite query details from service/sync orchestration.
//!
//! # Invariants
//! - Repository writes enforce `ExpenseRecord::validate()` before SQL
//!   mutations.
//! - Repository APIs return semantic errors (`NotFound`,
//!   `InvalidTransition`) in addition to DB transport errors.

use crate::db::DbError;
use crate::model::expense::{ExpenseId, ExpenseValidationError};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod cursor_repo;
pub mod expense_repo;
pub mod journal_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Persistence and query error shared by the repository layer.
#[derive(Debug)]
pub enum RepoError {
    Validation(ExpenseValidationError),
    Db(DbError),
    /// Mutation targeted a record that does not exist.
    NotFound(ExpenseId),
    /// Mutation targeted a journal entry that does not exist.
    EntryNotFound(i64),
    /// Journal status transitions are forward-only; this one went backward.
    InvalidTransition {
        seq: i64,
        from: &'static str,
        to: &'static str,
    },
    /// Persisted state failed to parse or validate on read-back.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "expense record not found: {id}"),
            Self::EntryNotFound(seq) => write!(f, "journal entry not found: seq={seq}"),
            Self::InvalidTransition { seq, from, to } => write!(
                f,
                "journal entry seq={seq} cannot transition from `{from}` to `{to}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ExpenseValidationError> for RepoError {
    fn from(value: ExpenseValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

//! Sync cursor persistence.
//!
//! # Responsibility
//! - Persist the last acknowledged remote version token so restarts resume
//!   pulling instead of re-fetching everything.
//!
//! # Invariants
//! - The cursor is a single row, owned exclusively by the sync engine.
//! - The cursor only advances after a fully successful push/pull batch.

use crate::model::expense::to_epoch_ms;
use crate::repo::RepoResult;
use chrono::Utc;
use rusqlite::{params, Connection};

/// Persistence interface for the sync cursor.
pub trait SyncCursorStore {
    /// Returns the last acknowledged remote token, `None` before first sync.
    fn token(&self) -> RepoResult<Option<String>>;
    /// Advances the cursor to a newly acknowledged token.
    fn advance(&self, token: &str) -> RepoResult<()>;
    /// Clears the cursor, forcing the next pull to start from the beginning.
    fn reset(&self) -> RepoResult<()>;
}

/// SQLite-backed single-row cursor store.
pub struct SqliteSyncCursorStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSyncCursorStore<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl SyncCursorStore for SqliteSyncCursorStore<'_> {
    fn token(&self) -> RepoResult<Option<String>> {
        let token: Option<String> =
            self.conn
                .query_row("SELECT token FROM sync_cursor WHERE id = 1;", [], |row| {
                    row.get(0)
                })?;
        Ok(token)
    }

    fn advance(&self, token: &str) -> RepoResult<()> {
        self.conn.execute(
            "UPDATE sync_cursor SET token = ?1, updated_at = ?2 WHERE id = 1;",
            params![token, to_epoch_ms(Utc::now())],
        )?;
        Ok(())
    }

    fn reset(&self) -> RepoResult<()> {
        self.conn.execute(
            "UPDATE sync_cursor SET token = NULL, updated_at = ?1 WHERE id = 1;",
            params![to_epoch_ms(Utc::now())],
        )?;
        Ok(())
    }
}

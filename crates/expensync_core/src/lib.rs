//! Local-first expense tracking core.
//!
//! Durable on-device storage of expense records, an append-only change
//! journal of local mutations, a sync engine reconciling the journal
//! against a remote document collection, and an incrementally maintained
//! aggregation view. This crate is the single source of truth for
//! business invariants.

pub mod aggregate;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod notify;
pub mod repo;
pub mod service;
pub mod session;
pub mod sync;

pub use aggregate::{AggregationView, DayBucket, MonthBucket, TotalsFilter};
pub use config::{ConfigError, CoreConfig};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::expense::{
    ChangeOp, ExpenseDraft, ExpenseId, ExpenseRecord, ExpenseValidationError,
};
pub use model::money::{Money, MoneyParseError};
pub use notify::{ChangeEvent, ChangeHub, ChangeKind, Subscription, SubscriptionFilter};
pub use repo::cursor_repo::{SqliteSyncCursorStore, SyncCursorStore};
pub use repo::expense_repo::{
    ExpenseQuery, ExpenseSort, ExpenseStore, SortDirection, SqliteExpenseStore,
};
pub use repo::journal_repo::{ChangeJournal, JournalEntry, SqliteChangeJournal, SyncStatus};
pub use repo::{RepoError, RepoResult};
pub use service::expense_service::{AmendExpense, ExpenseService, ServiceError, ServiceResult};
pub use session::{SessionError, UserSession};
pub use sync::backoff::BackoffPolicy;
pub use sync::engine::{
    resolve_conflict, AppliedChange, CancelFlag, ConflictWinner, CycleReport, SyncEngine,
    SyncError, SyncResult,
};
pub use sync::memory::MemoryRemote;
pub use sync::remote::{
    RemoteCollection, RemoteDocument, RemoteError, RemotePage, RemoteResult,
};
pub use sync::runner::SyncRunner;

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

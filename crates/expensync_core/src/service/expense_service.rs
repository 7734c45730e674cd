//! Expense use-case service.
//!
//! # Responsibility
//! - Provide record/amend/remove/query entry points for callers.
//! - Journal every accepted mutation, keep the aggregation view current
//!   and publish change events.
//!
//! # Invariants
//! - Every read and write is scoped to the session user; one database can
//!   serve several users without leaking records between them.
//! - A mutation that fails validation never reaches the journal.
//! - Every accepted mutation appends exactly one journal entry.
//! - Writes serialize per record structurally: the service owns its
//!   repositories and `rusqlite::Connection` is not `Sync`.

use crate::aggregate::{AggregationView, DayBucket, TotalsFilter};
use crate::model::expense::{
    normalize_category, ChangeOp, ExpenseDraft, ExpenseId, ExpenseRecord, ExpenseValidationError,
};
use crate::model::money::Money;
use crate::notify::{ChangeEvent, ChangeHub, Subscription, SubscriptionFilter};
use crate::repo::expense_repo::{ExpenseQuery, ExpenseStore};
use crate::repo::journal_repo::{ChangeJournal, JournalEntry};
use crate::repo::RepoError;
use crate::session::UserSession;
use crate::sync::engine::CycleReport;
use chrono::{DateTime, Utc};
use log::info;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Use-case level error for expense operations.
#[derive(Debug)]
pub enum ServiceError {
    /// Rejected locally; nothing was persisted or journaled.
    Validation(ExpenseValidationError),
    /// Target record does not exist (or is tombstoned).
    NotFound(ExpenseId),
    /// The session user does not own the target record.
    NotOwner(ExpenseId),
    /// Persistence-layer failure.
    Repo(RepoError),
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "expense not found: {id}"),
            Self::NotOwner(id) => write!(f, "expense {id} belongs to another user"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Validation(err) => Self::Validation(err),
            other => Self::Repo(other),
        }
    }
}

/// Field-wise changes for an amend; `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct AmendExpense {
    pub amount: Option<Money>,
    pub category: Option<String>,
    pub occurred_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
}

/// Orchestrates the local store, change journal, aggregation view and
/// change subscriptions for one database.
pub struct ExpenseService<S: ExpenseStore, J: ChangeJournal> {
    store: S,
    journal: J,
    aggregation: AggregationView,
    hub: ChangeHub,
}

impl<S: ExpenseStore, J: ChangeJournal> ExpenseService<S, J> {
    /// Builds a service, rebuilding the aggregation view from the store.
    pub fn new(store: S, journal: J) -> ServiceResult<Self> {
        let mut aggregation = AggregationView::new();
        aggregation.rebuild(&store)?;
        Ok(Self {
            store,
            journal,
            aggregation,
            hub: ChangeHub::new(),
        })
    }

    /// Records a new expense for the session user.
    ///
    /// # Contract
    /// - Validation happens before any persistence; an invalid draft leaves
    ///   no trace.
    /// - Returns the stable id of the created record.
    pub fn record_expense(
        &mut self,
        session: &UserSession,
        draft: ExpenseDraft,
    ) -> ServiceResult<ExpenseId> {
        let record = ExpenseRecord::new(session, draft, Utc::now());
        record.validate().map_err(ServiceError::Validation)?;

        self.store.put(&record)?;
        let seq = self.journal.append(ChangeOp::Create, &record)?;
        self.apply_local_change(None, &record);

        info!(
            "event=expense_recorded module=service status=ok record={} seq={seq} category={}",
            record.id, record.category
        );
        Ok(record.id)
    }

    /// Amends an existing expense owned by the session user.
    pub fn amend_expense(
        &mut self,
        session: &UserSession,
        id: ExpenseId,
        changes: AmendExpense,
    ) -> ServiceResult<()> {
        let Some(previous) = self.store.get(id, false)? else {
            return Err(ServiceError::NotFound(id));
        };
        if previous.owner != session.user_id {
            return Err(ServiceError::NotOwner(id));
        }

        let mut record = previous.clone();
        if let Some(amount) = changes.amount {
            record.amount = amount;
        }
        if let Some(category) = changes.category {
            record.category = normalize_category(&category);
        }
        if let Some(occurred_at) = changes.occurred_at {
            record.occurred_at = occurred_at;
        }
        if let Some(note) = changes.note {
            record.note = note;
        }
        record.stamp_mutation(session, Utc::now());
        record.validate().map_err(ServiceError::Validation)?;

        self.store.put(&record)?;
        let seq = self.journal.append(ChangeOp::Update, &record)?;
        self.apply_local_change(Some(&previous), &record);

        info!(
            "event=expense_amended module=service status=ok record={id} seq={seq}"
        );
        Ok(())
    }

    /// Tombstones an expense owned by the session user.
    ///
    /// Removing an already-removed record is a no-op.
    pub fn remove_expense(&mut self, session: &UserSession, id: ExpenseId) -> ServiceResult<()> {
        let Some(previous) = self.store.get(id, true)? else {
            return Err(ServiceError::NotFound(id));
        };
        if previous.owner != session.user_id {
            return Err(ServiceError::NotOwner(id));
        }
        if previous.is_deleted {
            return Ok(());
        }

        let mut record = previous.clone();
        record.tombstone(session, Utc::now());

        self.store.put(&record)?;
        let seq = self.journal.append(ChangeOp::Delete, &record)?;
        self.apply_local_change(Some(&previous), &record);

        info!(
            "event=expense_removed module=service status=ok record={id} seq={seq}"
        );
        Ok(())
    }

    /// Looks up one active expense owned by the session user.
    ///
    /// Another user's record is indistinguishable from an absent one.
    pub fn expense(
        &self,
        session: &UserSession,
        id: ExpenseId,
    ) -> ServiceResult<Option<ExpenseRecord>> {
        let record = self.store.get(id, false)?;
        Ok(record.filter(|record| record.owner == session.user_id))
    }

    /// Lists the session user's expenses matching the query.
    ///
    /// The query's owner field is overridden by the session; reads are
    /// always scoped to the caller.
    pub fn expenses(
        &self,
        session: &UserSession,
        query: &ExpenseQuery,
    ) -> ServiceResult<Vec<ExpenseRecord>> {
        let mut scoped = query.clone();
        scoped.owner = Some(session.user_id.clone());
        Ok(self.store.query(&scoped)?)
    }

    /// Snapshot of the session user's totals per category, as of the last
    /// applied mutation.
    pub fn totals(&self, session: &UserSession, filter: &TotalsFilter) -> BTreeMap<String, Money> {
        self.aggregation.totals(&session.user_id, filter)
    }

    /// The session user's per-day sums, for day-granularity spending views.
    pub fn daily_totals(
        &self,
        session: &UserSession,
        filter: &TotalsFilter,
    ) -> BTreeMap<DayBucket, Money> {
        self.aggregation.daily_totals(&session.user_id, filter)
    }

    /// Unsynced mutation count for one record ("pending sync" indicator).
    pub fn pending_sync_count(&self, id: ExpenseId) -> ServiceResult<u32> {
        Ok(self.journal.pending_count_for(id)?)
    }

    /// Quarantined journal entries awaiting caller resolution.
    pub fn quarantined(&self) -> ServiceResult<Vec<JournalEntry>> {
        Ok(self.journal.quarantined()?)
    }

    /// Returns a quarantined entry to the sync queue.
    pub fn requeue_quarantined(&self, seq: i64) -> ServiceResult<()> {
        Ok(self.journal.requeue(seq)?)
    }

    /// Abandons a quarantined entry.
    pub fn discard_quarantined(&self, seq: i64) -> ServiceResult<()> {
        Ok(self.journal.discard(seq)?)
    }

    /// Registers a subscriber for change events.
    pub fn subscribe(&self, filter: SubscriptionFilter) -> Subscription {
        self.hub.subscribe(filter)
    }

    /// Folds a sync cycle's applied changes into the aggregation view and
    /// notifies subscribers. Call after every completed cycle.
    pub fn absorb_cycle_report(&mut self, report: &CycleReport) {
        for change in &report.applied {
            self.apply_local_change(change.previous.as_ref(), &change.current);
        }
    }

    fn apply_local_change(&mut self, previous: Option<&ExpenseRecord>, current: &ExpenseRecord) {
        self.aggregation.apply_change(previous, current);
        self.hub.publish(&ChangeEvent::for_change(previous, current));
    }
}

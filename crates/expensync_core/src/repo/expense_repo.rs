//! Local store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide keyed put/get/query access over the `expenses` table.
//! - Keep SQL details inside the core persistence boundary.
//!
//! # Invariants
//! - Write paths call `ExpenseRecord::validate()` before SQL mutations.
//! - Read paths reject invalid persisted state instead of masking it.
//! - Every write is atomic per record (single upsert statement).

use crate::model::expense::{from_epoch_ms, to_epoch_ms, ExpenseId, ExpenseRecord};
use crate::model::money::Money;
use crate::repo::{RepoError, RepoResult};
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use uuid::Uuid;

const EXPENSE_SELECT_SQL: &str = "SELECT
    id,
    amount_cents,
    category,
    occurred_at,
    note,
    owner,
    revision,
    updated_at,
    device_id,
    is_deleted
FROM expenses";

/// Column a listing is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpenseSort {
    #[default]
    OccurredAt,
    Amount,
    Category,
}

impl ExpenseSort {
    fn column(self) -> &'static str {
        match self {
            Self::OccurredAt => "occurred_at",
            Self::Amount => "amount_cents",
            Self::Category => "category",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}

impl SortDirection {
    fn keyword(self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

/// Query options for listing expenses.
///
/// The sort column is always followed by `id ASC` as a stable secondary
/// key; combined with `limit`/`offset` this makes iteration restartable at
/// any point. The default sorts newest first.
#[derive(Debug, Clone, Default)]
pub struct ExpenseQuery {
    /// Restrict to one owner's records; `None` returns every owner.
    pub owner: Option<String>,
    /// Exact (normalized) category matches; empty means every category.
    pub categories: Vec<String>,
    /// Inclusive lower bound on `occurred_at`.
    pub occurred_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `occurred_at`.
    pub occurred_to: Option<DateTime<Utc>>,
    /// Inclusive lower bound on `amount`.
    pub min_amount: Option<Money>,
    /// Inclusive upper bound on `amount`.
    pub max_amount: Option<Money>,
    /// Tombstones are hidden unless explicitly requested.
    pub include_deleted: bool,
    pub sort: ExpenseSort,
    pub direction: SortDirection,
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Storage interface for expense records.
pub trait ExpenseStore {
    /// Inserts or replaces a record by id.
    fn put(&self, record: &ExpenseRecord) -> RepoResult<()>;
    /// Looks up one record; absence is `Ok(None)`, not an error.
    fn get(&self, id: ExpenseId, include_deleted: bool) -> RepoResult<Option<ExpenseRecord>>;
    /// Lists records matching the query filter.
    fn query(&self, query: &ExpenseQuery) -> RepoResult<Vec<ExpenseRecord>>;
}

/// SQLite-backed expense store.
pub struct SqliteExpenseStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteExpenseStore<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl ExpenseStore for SqliteExpenseStore<'_> {
    fn put(&self, record: &ExpenseRecord) -> RepoResult<()> {
        record.validate()?;

        self.conn.execute(
            "INSERT INTO expenses (
                id,
                amount_cents,
                category,
                occurred_at,
                note,
                owner,
                revision,
                updated_at,
                device_id,
                is_deleted
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT (id) DO UPDATE SET
                amount_cents = excluded.amount_cents,
                category = excluded.category,
                occurred_at = excluded.occurred_at,
                note = excluded.note,
                owner = excluded.owner,
                revision = excluded.revision,
                updated_at = excluded.updated_at,
                device_id = excluded.device_id,
                is_deleted = excluded.is_deleted;",
            params![
                record.id.to_string(),
                record.amount.cents(),
                record.category.as_str(),
                to_epoch_ms(record.occurred_at),
                record.note.as_str(),
                record.owner.as_str(),
                record.revision,
                to_epoch_ms(record.updated_at),
                record.device_id.as_str(),
                bool_to_int(record.is_deleted),
            ],
        )?;

        Ok(())
    }

    fn get(&self, id: ExpenseId, include_deleted: bool) -> RepoResult<Option<ExpenseRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "{EXPENSE_SELECT_SQL}
             WHERE id = ?1
               AND (?2 = 1 OR is_deleted = 0);"
        ))?;

        let mut rows = stmt.query(params![id.to_string(), bool_to_int(include_deleted)])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_expense_row(row)?));
        }

        Ok(None)
    }

    fn query(&self, query: &ExpenseQuery) -> RepoResult<Vec<ExpenseRecord>> {
        let mut sql = format!("{EXPENSE_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if !query.include_deleted {
            sql.push_str(" AND is_deleted = 0");
        }

        if let Some(owner) = &query.owner {
            sql.push_str(" AND owner = ?");
            bind_values.push(Value::Text(owner.clone()));
        }

        if !query.categories.is_empty() {
            let placeholders = vec!["?"; query.categories.len()].join(", ");
            sql.push_str(&format!(" AND category IN ({placeholders})"));
            for category in &query.categories {
                bind_values.push(Value::Text(category.clone()));
            }
        }

        if let Some(from) = query.occurred_from {
            sql.push_str(" AND occurred_at >= ?");
            bind_values.push(Value::Integer(to_epoch_ms(from)));
        }

        if let Some(to) = query.occurred_to {
            sql.push_str(" AND occurred_at <= ?");
            bind_values.push(Value::Integer(to_epoch_ms(to)));
        }

        if let Some(min) = query.min_amount {
            sql.push_str(" AND amount_cents >= ?");
            bind_values.push(Value::Integer(min.cents()));
        }

        if let Some(max) = query.max_amount {
            sql.push_str(" AND amount_cents <= ?");
            bind_values.push(Value::Integer(max.cents()));
        }

        sql.push_str(&format!(
            " ORDER BY {} {}, id ASC",
            query.sort.column(),
            query.direction.keyword()
        ));

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(Value::Integer(i64::from(limit)));
            if query.offset > 0 {
                sql.push_str(" OFFSET ?");
                bind_values.push(Value::Integer(i64::from(query.offset)));
            }
        } else if query.offset > 0 {
            sql.push_str(" LIMIT -1 OFFSET ?");
            bind_values.push(Value::Integer(i64::from(query.offset)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut records = Vec::new();

        while let Some(row) = rows.next()? {
            records.push(parse_expense_row(row)?);
        }

        Ok(records)
    }
}

pub(crate) fn parse_expense_row(row: &Row<'_>) -> RepoResult<ExpenseRecord> {
    let id_text: String = row.get("id")?;
    let id = Uuid::parse_str(&id_text).map_err(|_| {
        RepoError::InvalidData(format!("invalid uuid value `{id_text}` in expenses.id"))
    })?;

    let occurred_at_ms: i64 = row.get("occurred_at")?;
    let occurred_at = from_epoch_ms(occurred_at_ms).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid timestamp `{occurred_at_ms}` in expenses.occurred_at"
        ))
    })?;

    let updated_at_ms: i64 = row.get("updated_at")?;
    let updated_at = from_epoch_ms(updated_at_ms).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid timestamp `{updated_at_ms}` in expenses.updated_at"
        ))
    })?;

    let is_deleted = match row.get::<_, i64>("is_deleted")? {
        0 => false,
        1 => true,
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid is_deleted value `{other}` in expenses.is_deleted"
            )));
        }
    };

    let record = ExpenseRecord {
        id,
        amount: Money::from_cents(row.get("amount_cents")?),
        category: row.get("category")?,
        occurred_at,
        note: row.get("note")?,
        owner: row.get("owner")?,
        revision: row.get("revision")?,
        updated_at,
        device_id: row.get("device_id")?,
        is_deleted,
    };
    record.validate()?;
    Ok(record)
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

//! Incremental totals per owner, category and time bucket.
//!
//! Each local-store mutation adjusts only the buckets it touches; a full
//! rescan happens only on `rebuild`. Totals are tracked at month and day
//! granularity so both summary and chart views read incrementally.

use crate::model::expense::ExpenseRecord;
use crate::model::money::Money;
use crate::repo::expense_repo::{ExpenseQuery, ExpenseStore};
use crate::repo::RepoResult;
use chrono::{DateTime, Datelike, Utc};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// Calendar month an expense falls into, UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthBucket {
    pub year: i32,
    pub month: u32,
}

impl MonthBucket {
    pub fn of(instant: DateTime<Utc>) -> Self {
        Self {
            year: instant.year(),
            month: instant.month(),
        }
    }
}

impl Display for MonthBucket {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Calendar day an expense falls into, UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DayBucket {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl DayBucket {
    pub fn of(instant: DateTime<Utc>) -> Self {
        Self {
            year: instant.year(),
            month: instant.month(),
            day: instant.day(),
        }
    }

    /// The month this day belongs to; month-range filters apply through it.
    pub fn month_bucket(self) -> MonthBucket {
        MonthBucket {
            year: self.year,
            month: self.month,
        }
    }
}

impl Display for DayBucket {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

/// Filter for totals snapshots.
#[derive(Debug, Clone, Default)]
pub struct TotalsFilter {
    /// Exact (normalized) category match.
    pub category: Option<String>,
    /// Inclusive lower month bound.
    pub from: Option<MonthBucket>,
    /// Inclusive upper month bound.
    pub to: Option<MonthBucket>,
}

impl TotalsFilter {
    fn matches(&self, category: &str, bucket: MonthBucket) -> bool {
        if let Some(wanted) = &self.category {
            if wanted != category {
                return false;
            }
        }
        if let Some(from) = self.from {
            if bucket < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if bucket > to {
                return false;
            }
        }
        true
    }
}

type MonthKey = (String, String, MonthBucket);
type DayKey = (String, String, DayBucket);

/// Running totals keyed by (owner, category, bucket).
///
/// Owner is part of every key: one database can hold several users'
/// records, and totals never mix across them.
#[derive(Debug, Default)]
pub struct AggregationView {
    month_buckets: BTreeMap<MonthKey, Money>,
    day_buckets: BTreeMap<DayKey, Money>,
}

impl AggregationView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one mutation incrementally: the record's previous state
    /// leaves its buckets, the current state enters its (possibly
    /// different) buckets. Tombstones only subtract.
    pub fn apply_change(&mut self, previous: Option<&ExpenseRecord>, current: &ExpenseRecord) {
        if let Some(prev) = previous {
            if prev.is_active() {
                self.adjust(prev, |total, amount| total.saturating_sub(amount));
            }
        }
        if current.is_active() {
            self.adjust(current, |total, amount| total.saturating_add(amount));
        }
    }

    /// Returns a snapshot mapping category to total for one owner's buckets
    /// matching the filter.
    pub fn totals(&self, owner: &str, filter: &TotalsFilter) -> BTreeMap<String, Money> {
        let mut snapshot: BTreeMap<String, Money> = BTreeMap::new();
        for ((bucket_owner, category, bucket), total) in &self.month_buckets {
            if bucket_owner != owner || !filter.matches(category, *bucket) {
                continue;
            }
            let entry = snapshot.entry(category.clone()).or_insert_with(Money::zero);
            *entry = entry.saturating_add(*total);
        }
        snapshot
    }

    /// Returns one owner's per-day sums matching the filter, oldest day
    /// first. Backs day-granularity spending charts.
    pub fn daily_totals(&self, owner: &str, filter: &TotalsFilter) -> BTreeMap<DayBucket, Money> {
        let mut snapshot: BTreeMap<DayBucket, Money> = BTreeMap::new();
        for ((bucket_owner, category, day), total) in &self.day_buckets {
            if bucket_owner != owner || !filter.matches(category, day.month_bucket()) {
                continue;
            }
            let entry = snapshot.entry(*day).or_insert_with(Money::zero);
            *entry = entry.saturating_add(*total);
        }
        snapshot
    }

    /// Returns the total for one (owner, category, month) cell.
    pub fn bucket_total(&self, owner: &str, category: &str, bucket: MonthBucket) -> Money {
        self.month_buckets
            .get(&(owner.to_string(), category.to_string(), bucket))
            .copied()
            .unwrap_or_else(Money::zero)
    }

    /// Returns the total for one (owner, category, day) cell.
    pub fn day_total(&self, owner: &str, category: &str, day: DayBucket) -> Money {
        self.day_buckets
            .get(&(owner.to_string(), category.to_string(), day))
            .copied()
            .unwrap_or_else(Money::zero)
    }

    /// Discards all state and recomputes from the store. Used at startup.
    pub fn rebuild<S: ExpenseStore>(&mut self, store: &S) -> RepoResult<()> {
        self.month_buckets.clear();
        self.day_buckets.clear();
        let records = store.query(&ExpenseQuery::default())?;
        for record in &records {
            self.apply_change(None, record);
        }
        Ok(())
    }

    fn adjust(&mut self, record: &ExpenseRecord, op: impl Fn(Money, Money) -> Money) {
        let month_key = (
            record.owner.clone(),
            record.category.clone(),
            MonthBucket::of(record.occurred_at),
        );
        Self::adjust_cell(&mut self.month_buckets, month_key, record.amount, &op);

        let day_key = (
            record.owner.clone(),
            record.category.clone(),
            DayBucket::of(record.occurred_at),
        );
        Self::adjust_cell(&mut self.day_buckets, day_key, record.amount, &op);
    }

    fn adjust_cell<K: Ord>(
        buckets: &mut BTreeMap<K, Money>,
        key: K,
        amount: Money,
        op: &impl Fn(Money, Money) -> Money,
    ) {
        let updated = op(
            buckets.get(&key).copied().unwrap_or_else(Money::zero),
            amount,
        );
        if updated.is_zero() {
            buckets.remove(&key);
        } else {
            buckets.insert(key, updated);
        }
    }
}

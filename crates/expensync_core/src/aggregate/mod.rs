//! Derived summary statistics over the local store.
//!
//! # Responsibility
//! - Maintain running totals per owner, category and time bucket (month
//!   and day), updated incrementally as mutations are applied.
//!
//! # Invariants
//! - Totals never mix records of different owners.
//! - Tombstoned records contribute nothing to any bucket.
//! - A snapshot is consistent as of the last applied mutation.

pub mod view;

pub use view::{AggregationView, DayBucket, MonthBucket, TotalsFilter};

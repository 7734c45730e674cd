//! Domain model for local-first expense tracking.
//!
//! # Responsibility
//! - Define canonical data structures shared by store, journal and sync.
//! - Keep one record shape so sync never needs a mapping layer.
//!
//! # Invariants
//! - Every record is identified by a stable `ExpenseId`.
//! - Deletion is represented by tombstones, not hard deletes.

pub mod expense;
pub mod money;

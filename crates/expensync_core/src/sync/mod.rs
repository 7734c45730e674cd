//! Bidirectional reconciliation between the change journal and a remote
//! document collection.
//!
//! # Responsibility
//! - Define the remote collection contract and its error envelope.
//! - Drive push/pull sync cycles with deterministic conflict resolution.
//!
//! # Invariants
//! - At most one sync cycle is in flight at a time.
//! - The sync cursor advances only after a fully successful push/pull batch.

pub mod backoff;
pub mod engine;
pub mod memory;
pub mod remote;
pub mod runner;

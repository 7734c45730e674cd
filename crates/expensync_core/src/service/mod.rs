//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate store, journal, aggregation and notifications into
//!   use-case level APIs.
//! - Keep UI layers decoupled from storage and sync details.

pub mod expense_service;

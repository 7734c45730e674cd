//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `expensync_core` linkage.
//! - Keep output deterministic for quick local sanity checks.

fn main() {
    // A tiny probe validating core crate wiring independently from any
    // embedding application shell.
    println!("expensync_core ping={}", expensync_core::ping());
    println!("expensync_core version={}", expensync_core::core_version());
    println!(
        "expensync_core schema_version={}",
        expensync_core::db::migrations::latest_version()
    );
}

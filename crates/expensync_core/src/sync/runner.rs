//! Caller-facing sync loop: cadence, retries, cancellation.
//!
//! # Responsibility
//! - Run sync cycles on an interval, retrying transient failures with
//!   exponential backoff.
//! - Honor the engine's cancel flag promptly between sleeps.
//!
//! # Invariants
//! - Only transient failures are retried; everything else is returned to
//!   the caller.
//! - Cancellation during a sleep aborts without starting another cycle.

use crate::session::UserSession;
use crate::sync::backoff::BackoffPolicy;
use crate::sync::engine::{CycleReport, SyncEngine, SyncError, SyncResult};
use crate::sync::remote::RemoteCollection;
use log::info;
use std::time::Duration;

const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Drives repeated sync cycles against one engine.
#[derive(Debug, Clone)]
pub struct SyncRunner {
    pub interval: Duration,
    pub backoff: BackoffPolicy,
    /// Transient-failure retries per cycle before giving up.
    pub max_retries: u32,
}

impl SyncRunner {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            backoff: BackoffPolicy::default(),
            max_retries: 5,
        }
    }

    /// Runs one cycle, retrying transient failures with backoff.
    pub fn run_cycle_with_retry<R: RemoteCollection>(
        &self,
        engine: &SyncEngine<'_, R>,
        session: &UserSession,
    ) -> SyncResult<CycleReport> {
        let cancel = engine.cancel_handle();
        let mut attempt = 0;

        loop {
            match engine.sync_cycle(session) {
                Ok(report) => return Ok(report),
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    let delay = self.backoff.delay_for(attempt);
                    attempt += 1;
                    info!(
                        "event=sync_retry module=sync status=scheduled attempt={attempt} delay_ms={}",
                        delay.as_millis()
                    );
                    if !sleep_unless_cancelled(delay, &cancel) {
                        return Err(err);
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Loops cycles on the configured interval until the engine's cancel
    /// flag is raised. Returns the first non-retryable error, or `Ok` on
    /// cancellation.
    pub fn run_until_cancelled<R: RemoteCollection>(
        &self,
        engine: &SyncEngine<'_, R>,
        session: &UserSession,
    ) -> SyncResult<()> {
        let cancel = engine.cancel_handle();

        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }

            let report = self.run_cycle_with_retry(engine, session)?;
            if report.cancelled {
                return Ok(());
            }

            if !sleep_unless_cancelled(self.interval, &cancel) {
                return Ok(());
            }
        }
    }
}

/// Sleeps in small slices so cancellation is honored promptly.
/// Returns `false` when the sleep was cut short by cancellation.
fn sleep_unless_cancelled(total: Duration, cancel: &crate::sync::engine::CancelFlag) -> bool {
    let mut remaining = total;
    while !remaining.is_zero() {
        if cancel.is_cancelled() {
            return false;
        }
        let slice = remaining.min(SLEEP_SLICE);
        std::thread::sleep(slice);
        remaining = remaining.saturating_sub(slice);
    }
    !cancel.is_cancelled()
}

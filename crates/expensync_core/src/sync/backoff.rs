//! Exponential backoff policy for transient remote failures.
//!
//! # Invariants
//! - Delays are deterministic: `base * multiplier^attempt`, capped.
//! - Attempt numbering starts at 0 (first retry waits `base`).

use std::time::Duration;

/// Deterministic exponential backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub multiplier: u32,
    pub cap: Duration,
}

impl BackoffPolicy {
    pub const fn new(base: Duration, multiplier: u32, cap: Duration) -> Self {
        Self {
            base,
            multiplier,
            cap,
        }
    }

    /// Returns the delay before retry number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self
            .multiplier
            .checked_pow(attempt)
            .map_or(u64::MAX, u64::from);
        let delay = self
            .base
            .as_millis()
            .saturating_mul(u128::from(factor))
            .min(self.cap.as_millis());
        // Cap fits in u64 ms for any practical configuration.
        Duration::from_millis(delay as u64)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), 2, Duration::from_secs(30))
    }
}

#[cfg(test)]
mod tests {
    use super::BackoffPolicy;
    use std::time::Duration;

    #[test]
    fn doubles_until_cap() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(10), Duration::from_secs(30));
    }

    #[test]
    fn huge_attempt_numbers_saturate_at_cap() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(30));
    }
}

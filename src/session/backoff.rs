//! Reconnection backoff policy

use std::time::Duration;

/// Exponential backoff with a cap and no retry limit
///
/// `delay(n) = min(base * 2^n, cap)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
}

impl Backoff {
    /// Delay before the first retry
    pub const DEFAULT_BASE: Duration = Duration::from_millis(3_000);

    /// Largest delay between retries
    pub const DEFAULT_CAP: Duration = Duration::from_millis(30_000);

    /// Create a policy; a cap below the base is raised to the base
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap: cap.max(base) }
    }

    /// Delay to wait before retry number `attempt` (zero-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        1u32.checked_shl(attempt)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.cap, |delay| delay.min(self.cap))
    }

    /// Base delay
    pub fn base(&self) -> Duration {
        self.base
    }

    /// Delay cap
    pub fn cap(&self) -> Duration {
        self.cap
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BASE, Self::DEFAULT_CAP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn default_schedule() {
        let backoff = Backoff::default();
        let delays: Vec<u64> = (0..7).map(|n| backoff.delay(n).as_millis() as u64).collect();
        assert_eq!(delays, vec![3_000, 6_000, 12_000, 24_000, 30_000, 30_000, 30_000]);
    }

    #[test]
    fn huge_attempt_counts_stay_capped() {
        let backoff = Backoff::default();
        assert_eq!(backoff.delay(31), Backoff::DEFAULT_CAP);
        assert_eq!(backoff.delay(32), Backoff::DEFAULT_CAP);
        assert_eq!(backoff.delay(u32::MAX), Backoff::DEFAULT_CAP);
    }

    #[test]
    fn cap_below_base_is_raised() {
        let backoff = Backoff::new(Duration::from_secs(5), Duration::from_secs(1));
        assert_eq!(backoff.delay(0), Duration::from_secs(5));
        assert_eq!(backoff.delay(4), Duration::from_secs(5));
    }

    proptest! {
        #[test]
        fn delay_follows_capped_doubling(attempt in 0u32..64) {
            let expected = 3_000u128
                .checked_mul(1u128 << attempt)
                .map_or(30_000, |ms| ms.min(30_000));
            prop_assert_eq!(Backoff::default().delay(attempt).as_millis(), expected);
        }

        #[test]
        fn delay_is_monotonic(attempt in 0u32..1_000) {
            let backoff = Backoff::default();
            prop_assert!(backoff.delay(attempt) <= backoff.delay(attempt + 1));
        }
    }
}

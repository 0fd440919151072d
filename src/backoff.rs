//! Capped exponential backoff for channel reconnection.
//!
//! Attempt `n` (1-based) waits `min(cap, base * 2^(n-1))`. Attempts are
//! unbounded; only closing the owning channel stops them.

use std::time::Duration;

/// Default delay before the first reconnection attempt.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

/// Default upper bound on any single reconnection delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(15_000);

/// A pure, deterministic reconnection schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    base: Duration,
    cap: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }
}

impl ReconnectPolicy {
    /// Create a policy. A cap below `base` is raised to `base`.
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap: cap.max(base),
        }
    }

    /// Convenience constructor in milliseconds.
    pub fn from_millis(base_ms: u64, cap_ms: u64) -> Self {
        Self::new(Duration::from_millis(base_ms), Duration::from_millis(cap_ms))
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn cap(&self) -> Duration {
        self.cap
    }

    /// Delay before attempt `attempt` (1-based). Attempt 0 is treated as 1.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 1_u32 << exponent;
        self.base
            .checked_mul(factor)
            .map_or(self.cap, |d| d.min(self.cap))
    }
}

/// Attempt counter driving a [`ReconnectPolicy`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconnectState {
    attempts: u32,
}

impl ReconnectState {
    /// Attempts made since the last successful connection.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Advance to the next attempt and return its index and delay.
    pub fn next_delay(&mut self, policy: &ReconnectPolicy) -> (u32, Duration) {
        self.attempts = self.attempts.saturating_add(1);
        (self.attempts, policy.delay_for(self.attempts))
    }

    /// A connection succeeded; start over from the base delay.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_doubles_then_caps() {
        let policy = ReconnectPolicy::from_millis(500, 15_000);
        let delays: Vec<u128> = (1..=8).map(|n| policy.delay_for(n).as_millis()).collect();
        assert_eq!(delays, [500, 1000, 2000, 4000, 8000, 15_000, 15_000, 15_000]);
    }

    #[test]
    fn default_policy_matches_documented_constants() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.base(), DEFAULT_BASE_DELAY);
        assert_eq!(policy.cap(), DEFAULT_MAX_DELAY);
    }

    #[test]
    fn attempt_zero_uses_base() {
        let policy = ReconnectPolicy::from_millis(1000, 5000);
        assert_eq!(policy.delay_for(0), Duration::from_millis(1000));
    }

    #[test]
    fn huge_attempts_saturate_at_cap() {
        let policy = ReconnectPolicy::from_millis(1000, 30_000);
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_millis(30_000));
        assert_eq!(policy.delay_for(64), Duration::from_millis(30_000));
    }

    #[test]
    fn cap_below_base_is_raised() {
        let policy = ReconnectPolicy::from_millis(2000, 100);
        assert_eq!(policy.cap(), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(5), Duration::from_millis(2000));
    }

    #[test]
    fn state_counts_and_resets() {
        let policy = ReconnectPolicy::from_millis(1000, 8000);
        let mut state = ReconnectState::default();
        assert_eq!(state.next_delay(&policy), (1, Duration::from_millis(1000)));
        assert_eq!(state.next_delay(&policy), (2, Duration::from_millis(2000)));
        assert_eq!(state.attempts(), 2);
        state.reset();
        assert_eq!(state.attempts(), 0);
        assert_eq!(state.next_delay(&policy), (1, Duration::from_millis(1000)));
    }
}

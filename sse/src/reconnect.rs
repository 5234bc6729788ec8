//! Reconnection schedule for a consumer whose stream failed.

use std::time::Duration;

/// Bounded reconnection with exponentially increasing delays, capped at a maximum.
///
/// `max_attempts` counts reconnections after a failure, not the initial
/// connection. The consumer resets its attempt count whenever a connection
/// reaches `Connected`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    multiplier: u32,
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            multiplier: 2,
        }
    }

    /// Never reconnects: the first failure is final.
    pub fn disabled() -> Self {
        Self::new(0, Duration::ZERO, Duration::ZERO)
    }

    /// The same delay before every attempt.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            multiplier: 1,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before reconnect attempt `n_attempts` (zero-based), or `None` once
    /// the attempts are used up.
    pub fn next_delay(&self, n_attempts: u32) -> Option<Duration> {
        if n_attempts >= self.max_attempts {
            return None;
        }
        Some(self.exponential_delay(n_attempts))
    }

    fn exponential_delay(&self, n_attempts: u32) -> Duration {
        // Past 2^32 every realistic delay is already at the cap.
        let factor = (self.multiplier as f64).powi(n_attempts.min(32) as i32);
        let delay = self.base_delay.as_secs_f64() * factor;
        // Caps near Duration::MAX lose precision as f64 and no longer convert back.
        Duration::try_from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
            .unwrap_or(self.max_delay)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(1), Duration::from_secs(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_delay() {
        let policy = ReconnectPolicy::default();

        assert_eq!(policy.next_delay(0), Some(Duration::from_secs(1)));
        assert_eq!(policy.next_delay(1), Some(Duration::from_secs(2)));
        assert_eq!(policy.next_delay(2), Some(Duration::from_secs(4)));
    }

    #[test]
    fn test_max_delay_cap() {
        let policy = ReconnectPolicy::new(20, Duration::from_secs(1), Duration::from_secs(30));

        assert_eq!(policy.next_delay(10), Some(Duration::from_secs(30)));
        assert_eq!(policy.next_delay(19), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_unbounded_max_delay_does_not_overflow() {
        let policy = ReconnectPolicy::new(100, Duration::from_secs(1 << 62), Duration::MAX);

        assert_eq!(policy.next_delay(0), Some(Duration::from_secs(1 << 62)));
        assert_eq!(policy.next_delay(2), Some(Duration::MAX));
        assert_eq!(policy.next_delay(99), Some(Duration::MAX));
    }

    #[test]
    fn test_attempts_are_bounded() {
        let policy = ReconnectPolicy::default();

        assert!(policy.next_delay(4).is_some());
        assert_eq!(policy.next_delay(5), None);
    }

    #[test]
    fn test_fixed_interval() {
        let policy = ReconnectPolicy::fixed(3, Duration::from_millis(500));

        for n in 0..3 {
            assert_eq!(policy.next_delay(n), Some(Duration::from_millis(500)));
        }
        assert_eq!(policy.next_delay(3), None);
    }

    #[test]
    fn test_disabled_never_reconnects() {
        assert_eq!(ReconnectPolicy::disabled().next_delay(0), None);
    }
}

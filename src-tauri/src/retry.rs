//! Retry policy for the server readiness check
//!
//! Attempts are numbered from 1. The policy only computes delays; the shell
//! schedules the next attempt itself, so tests can step through a whole
//! retry chain without sleeping.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total readiness checks before giving up. `None` never gives up.
    pub max_attempts: Option<u32>,
    pub interval: Duration,
    /// 1.0 keeps a constant interval
    pub multiplier: f64,
    pub max_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(10),
            interval: Duration::from_secs(2),
            multiplier: 1.0,
            max_interval: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Constant-interval polling with no attempt cap.
    pub fn unbounded(interval: Duration) -> Self {
        Self {
            max_attempts: None,
            interval,
            multiplier: 1.0,
            max_interval: interval,
        }
    }

    /// Delay before the attempt following `attempt`, or `None` when the
    /// policy is exhausted.
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if let Some(max) = self.max_attempts {
            if attempt >= max {
                return None;
            }
        }

        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_ms = self.interval.as_millis() as f64;
        let raw_ms = base_ms * self.multiplier.max(1.0).powi(exponent);
        let capped_ms = raw_ms.min(self.max_interval.as_millis() as f64);
        Some(Duration::from_millis(capped_ms as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_bounded_and_constant() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Some(Duration::from_secs(2)));
        assert_eq!(policy.delay_after(9), Some(Duration::from_secs(2)));
        assert_eq!(policy.delay_after(10), None);
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy {
            max_attempts: Some(6),
            interval: Duration::from_millis(500),
            multiplier: 2.0,
            max_interval: Duration::from_secs(3),
        };
        assert_eq!(policy.delay_after(1), Some(Duration::from_millis(500)));
        assert_eq!(policy.delay_after(2), Some(Duration::from_millis(1000)));
        assert_eq!(policy.delay_after(3), Some(Duration::from_millis(2000)));
        assert_eq!(policy.delay_after(4), Some(Duration::from_secs(3)));
        assert_eq!(policy.delay_after(6), None);
    }

    #[test]
    fn test_unbounded_never_gives_up() {
        let policy = RetryPolicy::unbounded(Duration::from_secs(2));
        assert_eq!(policy.delay_after(10_000), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_single_attempt_policy() {
        let policy = RetryPolicy {
            max_attempts: Some(1),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_after(1), None);
    }
}

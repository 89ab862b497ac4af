//! Retry timing
//!
//! Exponential backoff with jitter for `retry_task` decisions.

use rand::Rng;
use std::time::Duration;

use crate::config::RecoveryConfig;

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Jitter factor (0.0 - 1.0); zero disables jitter
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RecoveryConfig) -> Self {
        Self {
            initial_delay: config.retry_base_delay,
            max_delay: config.retry_max_delay,
            ..Default::default()
        }
    }

    /// Slower start and steeper growth for throttled upstreams
    pub fn rate_limit_aware(&self) -> Self {
        Self {
            initial_delay: self.initial_delay.saturating_mul(10),
            max_delay: self.max_delay.saturating_mul(4),
            backoff_multiplier: 2.5,
            jitter_factor: self.jitter_factor,
        }
    }

    /// Calculate delay for a given attempt (0-based)
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let exponent = attempt.min(i32::MAX as usize) as i32;
        let base = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());

        let delay = if self.jitter_factor > 0.0 {
            let spread: f64 = rand::thread_rng().gen_range(-1.0..=1.0);
            (capped + capped * self.jitter_factor * spread).max(0.0)
        } else {
            capped
        };

        Duration::try_from_secs_f64(delay).unwrap_or(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> RetryPolicy {
        RetryPolicy {
            initial_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(10),
            jitter_factor: 0.0,
        }
    }

    #[test]
    fn test_retry_policy_delay() {
        let policy = no_jitter();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
    }

    #[test]
    fn test_retry_policy_max_cap() {
        let policy = RetryPolicy {
            initial_delay: Duration::from_secs(1),
            backoff_multiplier: 10.0,
            max_delay: Duration::from_secs(5),
            jitter_factor: 0.0,
        };
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(10_000), Duration::from_secs(5));
    }

    #[test]
    fn test_jitter_stays_in_band() {
        let policy = RetryPolicy {
            jitter_factor: 0.2,
            ..no_jitter()
        };
        for _ in 0..50 {
            let d = policy.delay_for_attempt(0);
            assert!(d >= Duration::from_millis(79) && d <= Duration::from_millis(121));
        }
    }

    #[test]
    fn test_rate_limit_policy_is_slower() {
        let policy = no_jitter();
        let throttled = policy.rate_limit_aware();
        assert!(throttled.delay_for_attempt(0) > policy.delay_for_attempt(0));
    }

    #[test]
    fn test_rate_limit_policy_saturates() {
        let policy = RetryPolicy {
            initial_delay: Duration::MAX,
            max_delay: Duration::MAX,
            ..no_jitter()
        };
        let throttled = policy.rate_limit_aware();
        assert_eq!(throttled.initial_delay, Duration::MAX);
        assert_eq!(throttled.max_delay, Duration::MAX);
        assert_eq!(throttled.delay_for_attempt(3), Duration::MAX);
    }
}

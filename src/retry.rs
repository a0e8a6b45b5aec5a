// src/retry.rs
//! Explicit retry policy shared by the crawler and the outbound
//! HTTP collaborators (classifier, webhooks).

use rand::Rng;
use std::time::Duration;

/// Bounded exponential backoff: base, doubling per attempt, capped,
/// with optional jitter. The caller decides which errors are
/// retryable; the policy only shapes the schedule.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            jitter: false,
        }
    }

    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    /// Delay before retrying after the given 1-based failed attempt.
    /// Attempt 1 waits `base`, attempt 2 waits `2*base`, and so on,
    /// capped at `max_delay`. Jitter adds up to +50%.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let raw = self
            .base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay);
        if self.jitter {
            let extra = rand::rng().random_range(0.0..0.5);
            raw.mul_f64(1.0 + extra).min(self.max_delay.mul_f64(1.5))
        } else {
            raw
        }
    }

    /// True while another attempt is allowed after `attempt` failures.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_and_cap() {
        let p = RetryPolicy::new(5, Duration::from_secs(1), Duration::from_secs(10));
        assert_eq!(p.delay_for(1), Duration::from_secs(1));
        assert_eq!(p.delay_for(2), Duration::from_secs(2));
        assert_eq!(p.delay_for(3), Duration::from_secs(4));
        assert_eq!(p.delay_for(4), Duration::from_secs(8));
        assert_eq!(p.delay_for(5), Duration::from_secs(10));
        assert_eq!(p.delay_for(12), Duration::from_secs(10));
    }

    #[test]
    fn attempt_budget_is_bounded() {
        let p = RetryPolicy::default();
        assert!(p.should_retry(1));
        assert!(p.should_retry(2));
        assert!(!p.should_retry(3));
    }

    #[test]
    fn jitter_stays_within_band() {
        let p = RetryPolicy::new(3, Duration::from_secs(2), Duration::from_secs(10)).with_jitter();
        for _ in 0..50 {
            let d = p.delay_for(1);
            assert!(d >= Duration::from_secs(2));
            assert!(d <= Duration::from_secs(3));
        }
    }
}

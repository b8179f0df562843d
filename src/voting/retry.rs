use rand::Rng;
use std::time::Duration;

/// Bounded retry with randomized exponential backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retrying after failed attempt number `attempt` (1-based):
    /// `min(base * 2^(attempt-1), max)` plus up to half of that again as jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1).min(31);
        let delay = self
            .base_delay
            .saturating_mul(1u32 << doublings)
            .min(self.max_delay);

        let jitter_ms = delay.as_millis() as u64 / 2;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        delay + Duration::from_millis(jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_until_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(100),
        };

        let first = policy.delay_for(1);
        assert!(first >= Duration::from_millis(20) && first <= Duration::from_millis(30));

        let second = policy.delay_for(2);
        assert!(second >= Duration::from_millis(40) && second <= Duration::from_millis(60));

        let late = policy.delay_for(9);
        assert!(late >= Duration::from_millis(100) && late <= Duration::from_millis(150));
    }

    #[test]
    fn huge_attempt_numbers_do_not_overflow() {
        let policy = RetryPolicy::default();
        assert!(policy.delay_for(u32::MAX) <= policy.max_delay * 2);
    }

    #[test]
    fn zero_base_means_no_wait() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        };
        assert_eq!(policy.delay_for(1), Duration::ZERO);
    }
}

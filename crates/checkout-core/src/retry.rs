//! Retry bookkeeping with exponential backoff

use std::time::Duration;

/// Bounded exponential backoff: `base × 2^attempt`, uncapped
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total consecutive failures tolerated before giving up
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt that follows failed attempt `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Outcome of recording a failure
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again after `delay`; `attempt` is the 1-based number of failures so far
    Retry { attempt: u32, delay: Duration },
    /// Maximum reached; surface a terminal failure
    GiveUp { attempts: u32 },
}

/// Attempt counter scoped to one operation (initialization or submission)
#[derive(Clone, Debug)]
pub struct RetryState {
    policy: RetryPolicy,
    failures: u32,
}

impl RetryState {
    pub const fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            failures: 0,
        }
    }

    /// Consecutive failures since the last success
    pub const fn failures(&self) -> u32 {
        self.failures
    }

    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Record a failed attempt and decide what happens next
    pub fn record_failure(&mut self) -> RetryDecision {
        let attempt = self.failures;
        self.failures = self.failures.saturating_add(1).min(self.policy.max_retries);

        if self.failures < self.policy.max_retries {
            RetryDecision::Retry {
                attempt: self.failures,
                delay: self.policy.delay_for(attempt),
            }
        } else {
            RetryDecision::GiveUp {
                attempts: self.failures,
            }
        }
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(1), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(4000));
    }

    #[test]
    fn test_gives_up_after_max_failures() {
        let mut state = RetryState::new(RetryPolicy::default());

        assert_eq!(
            state.record_failure(),
            RetryDecision::Retry {
                attempt: 1,
                delay: Duration::from_millis(1000)
            }
        );
        assert_eq!(
            state.record_failure(),
            RetryDecision::Retry {
                attempt: 2,
                delay: Duration::from_millis(2000)
            }
        );
        assert_eq!(state.record_failure(), RetryDecision::GiveUp { attempts: 3 });

        // Never counts past the maximum
        assert_eq!(state.record_failure(), RetryDecision::GiveUp { attempts: 3 });
        assert_eq!(state.failures(), 3);
    }

    #[test]
    fn test_reset_restarts_backoff() {
        let mut state = RetryState::new(RetryPolicy::default());
        state.record_failure();
        state.record_failure();
        state.reset();

        assert_eq!(state.failures(), 0);
        assert!(matches!(
            state.record_failure(),
            RetryDecision::Retry { attempt: 1, delay } if delay == Duration::from_millis(1000)
        ));
    }
}

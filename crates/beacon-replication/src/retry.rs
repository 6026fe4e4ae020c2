//! # Retry Policies
//!
//! Decides how long the lifecycle waits before requesting the next channel.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Retry Strategies                                 │
//! │                                                                         │
//! │  FIXED (Default)                     │  EXPONENTIAL                     │
//! │  ───────────────                     │  ───────────                     │
//! │  every attempt: 500ms                │  failure 1: 500ms                │
//! │                                      │  failure 2: 1s                   │
//! │                                      │  failure 3: 2s ... max_wait      │
//! │                                      │  clean completion: reset         │
//! │                                                                         │
//! │  Both give up after `max_retries` consecutive failures (0 = never).    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A self-loop or a change stream that ends cleanly counts as a completed
//! attempt: the wait still applies, but the failure count resets.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::time::Duration;

use crate::config::{RetrySettings, RetryStrategy};
use crate::error::ReplicationError;

/// Strategy consulted after every session attempt.
pub trait RetryPolicy: Send {
    /// Returns the wait before the next attempt, or `None` to give up.
    ///
    /// `failure` is the error that ended the attempt, `None` when it completed.
    fn next_delay(&mut self, failure: Option<&ReplicationError>) -> Option<Duration>;
}

// =============================================================================
// Fixed Delay
// =============================================================================

/// Same wait before every attempt.
#[derive(Debug, Clone)]
pub struct FixedDelay {
    wait: Duration,
    max_retries: u32,
    failures: u32,
}

impl FixedDelay {
    pub fn new(wait: Duration) -> Self {
        FixedDelay {
            wait,
            max_retries: 0,
            failures: 0,
        }
    }

    /// Gives up after `max_retries` consecutive failures (0 = never).
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

impl RetryPolicy for FixedDelay {
    fn next_delay(&mut self, failure: Option<&ReplicationError>) -> Option<Duration> {
        if failure.is_none() {
            self.failures = 0;
            return Some(self.wait);
        }

        self.failures = self.failures.saturating_add(1);
        if self.max_retries > 0 && self.failures >= self.max_retries {
            return None;
        }
        Some(self.wait)
    }
}

// =============================================================================
// Exponential Delay
// =============================================================================

/// Doubling wait after consecutive failures, capped at a maximum.
pub struct ExponentialDelay {
    backoff: ExponentialBackoff,
    initial: Duration,
    max_retries: u32,
    failures: u32,
}

impl ExponentialDelay {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let backoff = ExponentialBackoff {
            initial_interval: initial,
            current_interval: initial,
            max_interval: max,
            multiplier: 2.0,
            randomization_factor: 0.0,
            max_elapsed_time: None,
            ..Default::default()
        };
        ExponentialDelay {
            backoff,
            initial,
            max_retries: 0,
            failures: 0,
        }
    }

    /// Spreads each wait by up to `factor` in either direction.
    pub fn with_jitter(mut self, factor: f64) -> Self {
        self.backoff.randomization_factor = factor.clamp(0.0, 1.0);
        self
    }

    /// Gives up after `max_retries` consecutive failures (0 = never).
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

impl RetryPolicy for ExponentialDelay {
    fn next_delay(&mut self, failure: Option<&ReplicationError>) -> Option<Duration> {
        if failure.is_none() {
            self.failures = 0;
            self.backoff.reset();
            return Some(self.initial);
        }

        self.failures = self.failures.saturating_add(1);
        if self.max_retries > 0 && self.failures >= self.max_retries {
            return None;
        }
        self.backoff.next_backoff()
    }
}

impl RetrySettings {
    /// Builds a fresh policy for one lifecycle.
    pub fn build_policy(&self) -> Box<dyn RetryPolicy> {
        match self.strategy {
            RetryStrategy::Fixed => {
                Box::new(FixedDelay::new(self.wait()).with_max_retries(self.max_retries))
            }
            RetryStrategy::Exponential => Box::new(
                ExponentialDelay::new(self.wait(), self.max_wait())
                    .with_max_retries(self.max_retries),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure() -> ReplicationError {
        ReplicationError::Disconnected
    }

    #[test]
    fn test_fixed_delay_is_unbounded_by_default() {
        let mut policy = FixedDelay::new(Duration::from_millis(500));
        for _ in 0..1_000 {
            assert_eq!(policy.next_delay(Some(&failure())), Some(Duration::from_millis(500)));
        }
        assert_eq!(policy.next_delay(None), Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_fixed_delay_gives_up_after_consecutive_failures() {
        let mut policy = FixedDelay::new(Duration::from_millis(100)).with_max_retries(3);
        assert!(policy.next_delay(Some(&failure())).is_some());
        assert!(policy.next_delay(Some(&failure())).is_some());

        // A completed attempt resets the count
        assert!(policy.next_delay(None).is_some());
        assert!(policy.next_delay(Some(&failure())).is_some());
        assert!(policy.next_delay(Some(&failure())).is_some());
        assert!(policy.next_delay(Some(&failure())).is_none());
    }

    #[test]
    fn test_failure_count_saturates() {
        let mut fixed = FixedDelay::new(Duration::from_millis(500));
        fixed.failures = u32::MAX;
        assert_eq!(fixed.next_delay(Some(&failure())), Some(Duration::from_millis(500)));
        assert_eq!(fixed.failures, u32::MAX);

        let mut exponential =
            ExponentialDelay::new(Duration::from_millis(500), Duration::from_secs(3));
        exponential.failures = u32::MAX;
        assert!(exponential.next_delay(Some(&failure())).is_some());
        assert_eq!(exponential.failures, u32::MAX);
    }

    #[test]
    fn test_exponential_growth_and_cap() {
        let mut policy = ExponentialDelay::new(Duration::from_millis(500), Duration::from_secs(3));
        let waits: Vec<_> = (0..5)
            .map(|_| policy.next_delay(Some(&failure())).unwrap())
            .collect();

        assert_eq!(
            waits,
            vec![
                Duration::from_millis(500),
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(3),
                Duration::from_secs(3),
            ]
        );
    }

    #[test]
    fn test_exponential_resets_after_completion() {
        let mut policy = ExponentialDelay::new(Duration::from_millis(200), Duration::from_secs(10));
        policy.next_delay(Some(&failure()));
        policy.next_delay(Some(&failure()));
        assert_eq!(policy.next_delay(None), Some(Duration::from_millis(200)));
        assert_eq!(policy.next_delay(Some(&failure())), Some(Duration::from_millis(200)));
    }

    #[test]
    fn test_exponential_jitter_stays_in_bounds() {
        let mut policy = ExponentialDelay::new(Duration::from_millis(1_000), Duration::from_secs(10))
            .with_jitter(0.5);
        let wait = policy.next_delay(Some(&failure())).unwrap();
        assert!(wait >= Duration::from_millis(500) && wait <= Duration::from_millis(1_501));
    }

    #[test]
    fn test_build_policy_from_settings() {
        let settings = RetrySettings::default();
        let mut policy = settings.build_policy();
        assert_eq!(policy.next_delay(Some(&failure())), Some(Duration::from_millis(500)));

        let settings = RetrySettings {
            strategy: RetryStrategy::Exponential,
            wait_ms: 100,
            max_wait_ms: 1_000,
            max_retries: 2,
        };
        let mut policy = settings.build_policy();
        assert_eq!(policy.next_delay(Some(&failure())), Some(Duration::from_millis(100)));
        assert_eq!(policy.next_delay(Some(&failure())), None);
    }
}

//! Reconnection strategies for automatic reconnection
//!
//! When the events socket closes without a preceding `disconnect()`, the
//! connection manager asks its strategy how long to wait before the next
//! attempt, or whether to give up.
//!
//! # Built-in Strategies
//!
//! - **ExponentialBackoff**: `min(base * 2^(attempt-1), max)` (default)
//! - **FixedDelay**: constant delay between attempts
//!
//! Attempts are numbered from 1. The attempt counter itself is owned by the
//! connection manager and reset after every successful authentication, so
//! strategies are stateless.
//!
//! # Examples
//!
//! ```rust
//! use beacon_client::{ExponentialBackoff, ReconnectionStrategy};
//! use std::time::Duration;
//!
//! let backoff = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(30))
//!     .with_max_attempts(5);
//!
//! assert_eq!(backoff.next_delay(1), Some(Duration::from_secs(1)));
//! assert_eq!(backoff.next_delay(3), Some(Duration::from_secs(4)));
//! assert_eq!(backoff.next_delay(6), None);
//! ```

use std::time::Duration;

/// Trait for reconnection strategies
///
/// Implementations decide the delay before each reconnect attempt and when
/// to stop retrying.
pub trait ReconnectionStrategy: Send + Sync {
    /// Delay before the given attempt (1-based), or `None` to give up
    fn next_delay(&self, attempt: u32) -> Option<Duration>;
}

/// Exponential backoff capped at a maximum delay
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base_delay: Duration,
    max_delay: Duration,
    max_attempts: Option<u32>,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff strategy with unlimited attempts
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
            max_attempts: None,
        }
    }

    /// Set the maximum number of attempts before giving up
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Delay for an attempt, ignoring the attempt limit
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        2u32.checked_pow(exponent)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30)).with_max_attempts(5)
    }
}

impl ReconnectionStrategy for ExponentialBackoff {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if let Some(max) = self.max_attempts {
            if attempt > max {
                return None;
            }
        }
        Some(self.delay_for(attempt))
    }
}

/// Fixed delay reconnection strategy
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
    max_attempts: Option<u32>,
}

impl FixedDelay {
    /// Create a new fixed delay strategy with unlimited attempts
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
        }
    }

    /// Set the maximum number of attempts before giving up
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

impl ReconnectionStrategy for FixedDelay {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if let Some(max) = self.max_attempts {
            if attempt > max {
                return None;
            }
        }
        Some(self.delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_doubles() {
        let strategy = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(10))
            .with_max_attempts(5);

        assert_eq!(strategy.next_delay(1), Some(Duration::from_millis(100)));
        assert_eq!(strategy.next_delay(2), Some(Duration::from_millis(200)));
        assert_eq!(strategy.next_delay(3), Some(Duration::from_millis(400)));
        assert_eq!(strategy.next_delay(4), Some(Duration::from_millis(800)));
    }

    #[test]
    fn test_exponential_backoff_capped() {
        let strategy = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(1));

        assert_eq!(strategy.next_delay(5), Some(Duration::from_millis(1000)));
        assert_eq!(strategy.next_delay(40), Some(Duration::from_millis(1000)));
        // 2^200 overflows; still capped rather than panicking
        assert_eq!(strategy.next_delay(200), Some(Duration::from_millis(1000)));
    }

    #[test]
    fn test_exponential_backoff_non_decreasing() {
        let strategy = ExponentialBackoff::new(Duration::from_millis(250), Duration::from_secs(20));

        let delays: Vec<Duration> = (1..=12).map(|a| strategy.delay_for(a)).collect();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*delays.last().unwrap(), Duration::from_secs(20));
    }

    #[test]
    fn test_exponential_backoff_max_attempts() {
        let strategy = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(10))
            .with_max_attempts(3);

        assert!(strategy.next_delay(1).is_some());
        assert!(strategy.next_delay(2).is_some());
        assert!(strategy.next_delay(3).is_some());
        assert!(strategy.next_delay(4).is_none());
    }

    #[test]
    fn test_exponential_backoff_default() {
        let strategy = ExponentialBackoff::default();
        assert_eq!(strategy.next_delay(1), Some(Duration::from_secs(1)));
        assert_eq!(strategy.next_delay(5), Some(Duration::from_secs(16)));
        assert!(strategy.next_delay(6).is_none());
    }

    #[test]
    fn test_fixed_delay() {
        let strategy = FixedDelay::new(Duration::from_secs(1)).with_max_attempts(3);

        assert_eq!(strategy.next_delay(1), Some(Duration::from_secs(1)));
        assert_eq!(strategy.next_delay(3), Some(Duration::from_secs(1)));
        assert!(strategy.next_delay(4).is_none());
    }
}

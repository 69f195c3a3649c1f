//! # Retry Policy and Backoff Strategies
//!
//! Decides when a pending operation is due for another replay and when it has
//! exhausted its attempts.
//!
//! The default is a flat counter: every drain retries every pending record
//! until `max_attempts` failures. `Fixed` and `Exponential` backoff make the
//! drain skip records whose delay since `last_attempt_at` has not elapsed.
//! A skipped record is not counted and not mutated.
//!
//! ## Usage
//!
//! ```rust
//! use offline_relay::client::offline::retry::{BackoffStrategy, RetryPolicy};
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new(5).with_backoff(BackoffStrategy::Exponential {
//!     base: Duration::from_secs(1),
//!     max: Duration::from_secs(300),
//! });
//! assert_eq!(policy.delay_for(3), Duration::from_secs(4));
//! ```

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::shared::operation::QueuedOperation;

/// Backoff strategy configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackoffStrategy {
    /// Retry on every drain
    #[default]
    None,
    /// Fixed interval between retries
    Fixed { interval: Duration },
    /// Doubling interval, capped at `max`
    Exponential { base: Duration, max: Duration },
}

/// Attempt ceiling plus backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: BackoffStrategy::None,
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Delay required after the `attempts`-th failure
    pub fn delay_for(&self, attempts: u32) -> Duration {
        if attempts == 0 {
            return Duration::ZERO;
        }
        match self.backoff {
            BackoffStrategy::None => Duration::ZERO,
            BackoffStrategy::Fixed { interval } => interval,
            BackoffStrategy::Exponential { base, max } => {
                let factor = 2u32.saturating_pow(attempts.saturating_sub(1));
                base.saturating_mul(factor).min(max)
            }
        }
    }

    /// Whether a pending record may be replayed at `now`
    pub fn is_due(&self, operation: &QueuedOperation, now: DateTime<Utc>) -> bool {
        if !operation.is_pending() {
            return false;
        }
        let Some(last) = operation.last_attempt_at else {
            return true;
        };
        let delay = self.delay_for(operation.attempts);
        if delay.is_zero() {
            return true;
        }
        match chrono::Duration::from_std(delay) {
            Ok(delay) => last + delay <= now,
            Err(_) => false,
        }
    }

    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

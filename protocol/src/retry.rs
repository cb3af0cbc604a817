//! # Retry Combinator
//!
//! Transient faults (storage I/O hiccups, network instability) get a
//! bounded exponential backoff; everything else fails immediately. Rather
//! than scattering retry loops through the codebase, fallible operations
//! are wrapped once:
//!
//! ```
//! use h3tag_protocol::retry::{with_backoff, RetryPolicy};
//!
//! let mut attempts = 0;
//! let result: Result<u32, &str> = with_backoff(
//!     &RetryPolicy::default().no_delay(),
//!     |err| *err == "transient",
//!     || {
//!         attempts += 1;
//!         if attempts < 3 { Err("transient") } else { Ok(42) }
//!     },
//! );
//! assert_eq!(result, Ok(42));
//! ```
//!
//! The predicate decides retryability — validation rejects and invariant
//! violations must return `false` so they surface on the first attempt.

use std::time::Duration;

use rand::Rng;
use tracing::warn;

/// Backoff parameters.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Multiplier applied per subsequent attempt.
    pub backoff_factor: f64,
    /// Fractional jitter applied to each delay, e.g. 0.25 for ±25%.
    pub jitter: f64,
    /// Hard cap on any single delay.
    pub max_delay: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            jitter: 0.25,
            max_delay: None,
        }
    }
}

impl RetryPolicy {
    /// Zero all delays. For tests and doctests, where waiting one second
    /// to prove a point is a waste of everyone's time.
    pub fn no_delay(mut self) -> Self {
        self.initial_delay = Duration::ZERO;
        self
    }

    /// Delay before attempt `n` (1-based; attempt 1 has no delay).
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 || self.initial_delay.is_zero() {
            return Duration::ZERO;
        }
        let exponent = (attempt - 2) as i32;
        let base = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        let jittered = if self.jitter > 0.0 {
            let spread = rand::thread_rng().gen_range(-self.jitter..=self.jitter);
            base * (1.0 + spread)
        } else {
            base
        };
        let delay = Duration::from_secs_f64(jittered.max(0.0));
        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }
}

/// Run `op` until it succeeds, the error is non-retryable, or the policy
/// runs out of attempts. Returns the final result either way.
pub fn with_backoff<T, E, F, P>(policy: &RetryPolicy, retryable: P, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_attempts && retryable(&err) => {
                let delay = policy.delay_for_attempt(attempt + 1);
                warn!(attempt, error = %err, delay_ms = delay.as_millis() as u64, "retrying after transient failure");
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> RetryPolicy {
        RetryPolicy::default().no_delay()
    }

    #[test]
    fn first_success_needs_no_retry() {
        let mut calls = 0;
        let result: Result<u32, &str> = with_backoff(&fast(), |_| true, || {
            calls += 1;
            Ok(7)
        });
        assert_eq!(result, Ok(7));
        assert_eq!(calls, 1);
    }

    #[test]
    fn transient_failures_are_retried_to_success() {
        let mut calls = 0;
        let result: Result<u32, &str> = with_backoff(&fast(), |_| true, || {
            calls += 1;
            if calls < 3 {
                Err("flaky")
            } else {
                Ok(1)
            }
        });
        assert_eq!(result, Ok(1));
        assert_eq!(calls, 3);
    }

    #[test]
    fn attempts_are_bounded() {
        let mut calls = 0;
        let result: Result<u32, &str> = with_backoff(&fast(), |_| true, || {
            calls += 1;
            Err("always")
        });
        assert_eq!(result, Err("always"));
        assert_eq!(calls, 3);
    }

    #[test]
    fn non_retryable_errors_fail_immediately() {
        let mut calls = 0;
        let result: Result<u32, &str> = with_backoff(
            &fast(),
            |err| *err != "fatal",
            || {
                calls += 1;
                Err("fatal")
            },
        );
        assert_eq!(result, Err("fatal"));
        assert_eq!(calls, 1);
    }

    #[test]
    fn delays_grow_and_respect_cap() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            backoff_factor: 2.0,
            jitter: 0.0,
            max_delay: Some(Duration::from_millis(250)),
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(200));
        // 400ms capped to 250ms.
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(250));
    }

    #[test]
    fn jitter_stays_within_band() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            backoff_factor: 1.0,
            jitter: 0.25,
            max_delay: None,
        };
        for _ in 0..50 {
            let delay = policy.delay_for_attempt(2);
            assert!(delay >= Duration::from_millis(75), "{delay:?}");
            assert!(delay <= Duration::from_millis(125), "{delay:?}");
        }
    }
}

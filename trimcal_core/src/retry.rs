//! Bounded retry with a fixed backoff, shared by every sampling stage.

use crate::error::RecoverableError;
use std::time::Duration;
use trimcal_traits::Clock;

/// Attempt ceiling and delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Treated as at least 1.
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(attempts: u32, delay_ms: u64) -> Self {
        Self {
            attempts,
            delay: Duration::from_millis(delay_ms),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, 15)
    }
}

/// Run `op` until it succeeds or the policy's attempts are used up, sleeping
/// `policy.delay` on `clock` between attempts. `op` receives the 1-based
/// attempt number. Returns the last error on exhaustion.
pub fn retry_with_backoff<T, C, F>(
    policy: RetryPolicy,
    clock: &C,
    what: &str,
    mut op: F,
) -> Result<T, RecoverableError>
where
    C: Clock + ?Sized,
    F: FnMut(u32) -> Result<T, RecoverableError>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt) {
            Ok(v) => {
                if attempt > 1 {
                    tracing::debug!(what, attempt, "succeeded after retry");
                }
                return Ok(v);
            }
            Err(e) if attempt < attempts => {
                tracing::warn!(what, attempt, error = %e, "attempt failed, retrying");
                clock.sleep(policy.delay);
                attempt += 1;
            }
            Err(e) => {
                tracing::error!(what, attempts, error = %e, "giving up after retries");
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trimcal_traits::clock::test_clock::TestClock;

    #[test]
    fn succeeds_on_third_attempt() {
        let clock = TestClock::new();
        let mut calls = 0;
        let got = retry_with_backoff(RetryPolicy::new(5, 30), &clock, "read", |attempt| {
            calls += 1;
            if attempt < 3 {
                Err(RecoverableError::Timeout)
            } else {
                Ok(attempt)
            }
        });
        assert_eq!(got, Ok(3));
        assert_eq!(calls, 3);
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(30); 2]);
    }

    #[test]
    fn exhausts_and_returns_last_error() {
        let clock = TestClock::new();
        let got: Result<(), _> = retry_with_backoff(RetryPolicy::new(5, 15), &clock, "read", |a| {
            Err(RecoverableError::Hardware(format!("attempt {a}")))
        });
        assert_eq!(got, Err(RecoverableError::Hardware("attempt 5".into())));
        // no sleep after the final attempt
        assert_eq!(clock.sleeps().len(), 4);
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        let clock = TestClock::new();
        let got = retry_with_backoff(RetryPolicy::new(0, 15), &clock, "read", |_| Ok(7));
        assert_eq!(got, Ok(7));
        assert!(clock.sleeps().is_empty());
    }
}

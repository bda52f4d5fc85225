//! Bounded retry with capped exponential backoff.
//!
//! One policy shared by the discovery client and any operation wrapper,
//! instead of ad hoc retry loops at each call site. Attempts are always
//! bounded; there is no retry-forever mode.

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::Result;

// ============================================================================
// RetryPolicy
// ============================================================================

/// A bounded retry policy: at most `max_attempts` tries, sleeping an
/// exponentially growing, capped delay between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first (minimum 1).
    pub max_attempts: u32,

    /// Delay before the second attempt; doubles per attempt thereafter.
    pub base_delay: Duration,

    /// Upper bound on any single backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with the given attempt bound and default backoff.
    #[inline]
    #[must_use]
    pub fn attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Default::default()
        }
    }

    /// Sets the initial backoff delay.
    #[inline]
    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the backoff cap.
    #[inline]
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Returns the backoff delay preceding `attempt` (1-based; the first
    /// attempt has no delay).
    #[must_use]
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let shift = (attempt - 2).min(16);
        let delay = self.base_delay.saturating_mul(1u32 << shift);
        delay.min(self.max_delay)
    }

    /// Runs `op` until it succeeds or the attempt bound is reached.
    ///
    /// The closure receives the 1-based attempt number. The last error is
    /// surfaced when every attempt fails.
    ///
    /// # Errors
    ///
    /// Returns the error from the final attempt.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut last_err = None;

        for attempt in 1..=attempts {
            let delay = self.delay_before(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    debug!(attempt, max = attempts, error = %e, "Attempt failed");
                    last_err = Some(e);
                }
            }
        }

        // attempts >= 1, so at least one error was recorded.
        Err(last_err.unwrap_or_else(|| crate::error::Error::protocol("retry with zero attempts")))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::error::Error;

    #[test]
    fn test_delay_sequence_capped() {
        let policy = RetryPolicy {
            max_attempts: 6,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(300),
        };

        assert_eq!(policy.delay_before(1), Duration::ZERO);
        assert_eq!(policy.delay_before(2), Duration::from_millis(100));
        assert_eq!(policy.delay_before(3), Duration::from_millis(200));
        assert_eq!(policy.delay_before(4), Duration::from_millis(300));
        assert_eq!(policy.delay_before(5), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_run_succeeds_first_attempt() {
        let policy = RetryPolicy::attempts(3);
        let calls = AtomicU32::new(0);

        let result = policy
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(42u32) }
            })
            .await
            .expect("should succeed");

        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_bounded_attempts() {
        let policy = RetryPolicy::attempts(3).with_base_delay(Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result: Result<u32> = policy
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::discovery("nope")) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_run_recovers_on_later_attempt() {
        let policy = RetryPolicy::attempts(3).with_base_delay(Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result = policy
            .run(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(Error::discovery("not yet"))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await
            .expect("third attempt succeeds");

        assert_eq!(result, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}

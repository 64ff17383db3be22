//! Bounded exponential backoff around fallible async operations.
//!
//! After the n-th failed attempt (1-indexed) the scheduler waits
//! `base_delay * 2^n`. The wait after the final attempt is a cooldown taken
//! while the operation still counts as in flight, so a caller re-invoking
//! immediately gets `AlreadyInProgress` instead of hammering the backend.
//! Only transient errors are retried; anything else surfaces at once.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::error::{Error, Result};

/// Attempt budget and backoff base for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1_000))
    }
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Single attempt, no backoff. Used where a failure must revert, not retry.
    pub const fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Delay taken after the given failed attempt (1-indexed).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2_u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// Runs operations with retry and drops duplicate in-flight invocations.
#[derive(Debug, Clone, Default)]
pub struct RetryScheduler {
    in_flight: Arc<Mutex<HashSet<String>>>,
}

struct InFlightGuard {
    key: String,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

impl RetryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    fn claim(&self, key: &str) -> Option<InFlightGuard> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(key.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            key: key.to_string(),
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    /// Run `operation` under `policy`, keyed by the logical operation name.
    pub async fn run<T, F, Fut>(&self, key: &str, policy: RetryPolicy, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let Some(_guard) = self.claim(key) else {
            tracing::debug!(key, "operation already in flight, dropping duplicate");
            return Err(Error::AlreadyInProgress(key.to_string()));
        };

        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if !error.is_retryable() {
                return Err(error);
            }

            let delay = policy.delay_after(attempt);
            if attempt < max_attempts {
                tracing::warn!(
                    key,
                    attempt,
                    "Transient failure, retrying in {}ms: {}",
                    delay.as_millis(),
                    error
                );
            } else {
                tracing::warn!(key, attempt, "Giving up after {} attempts: {}", attempt, error);
            }

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            if attempt >= max_attempts {
                return Err(error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::time::Instant;

    use super::*;

    #[test]
    fn delays_double_from_twice_the_base() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1_000));
        assert_eq!(policy.delay_after(1), Duration::from_millis(2_000));
        assert_eq!(policy.delay_after(2), Duration::from_millis(4_000));
        assert_eq!(policy.delay_after(3), Duration::from_millis(8_000));
        assert_eq!(RetryPolicy::once().delay_after(1), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_transient_failure_is_bounded() {
        let scheduler = RetryScheduler::new();
        let attempts = AtomicU32::new(0);
        let started = Instant::now();

        let result: Result<()> = scheduler
            .run("requests", RetryPolicy::default(), || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::Disconnected("connection reset".to_string())) }
            })
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_millis(2_000 + 4_000 + 8_000));
        let error = result.unwrap_err();
        assert_eq!(error.class(), crate::ErrorClass::TransientNetwork);
        assert!(!scheduler.is_in_flight("requests"));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failure() {
        let scheduler = RetryScheduler::new();
        let attempts = AtomicU32::new(0);

        let value = scheduler
            .run("songs", RetryPolicy::default(), || {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if attempt < 2 {
                        Err(Error::Timeout("songs"))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_errors_are_not_retried() {
        let scheduler = RetryScheduler::new();
        let attempts = AtomicU32::new(0);

        let error = scheduler
            .run("vote", RetryPolicy::default(), || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(Error::Conflict("already voted".to_string())) }
            })
            .await
            .unwrap_err();

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(matches!(error, Error::Conflict(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_invocation_is_rejected_not_queued() {
        let scheduler = RetryScheduler::new();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let first = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move {
                let mut release_rx = Some(release_rx);
                scheduler
                    .run("submit", RetryPolicy::once(), || {
                        let release_rx = release_rx.take();
                        async move {
                            if let Some(release_rx) = release_rx {
                                let _ = release_rx.await;
                            }
                            Ok(1)
                        }
                    })
                    .await
            })
        };

        tokio::task::yield_now().await;
        assert!(scheduler.is_in_flight("submit"));

        let second = scheduler
            .run("submit", RetryPolicy::once(), || async { Ok(2) })
            .await;
        assert!(matches!(second, Err(Error::AlreadyInProgress(_))));

        release_tx.send(()).unwrap();
        assert_eq!(first.await.unwrap().unwrap(), 1);
        assert!(!scheduler.is_in_flight("submit"));
    }
}

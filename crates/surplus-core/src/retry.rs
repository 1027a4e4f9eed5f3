//! Retry policy and circuit breaker for external calls
//!
//! Every banking call that can be retried goes through [`RetryPolicy::run`]:
//! - only transient errors (see [`Error::is_transient`]) are retried
//! - delay grows by `multiplier` each attempt, capped at `max_delay`
//! - each attempt is bounded by `attempt_timeout`; elapsing counts as transient
//!
//! [`CircuitBreaker`] tracks consecutive failures across calls in a run and
//! fails fast once the threshold is reached, until `recovery_wait` passes.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Bounded exponential backoff
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            attempt_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl RetryPolicy {
    /// Policy with no waiting between attempts (tests, dry runs)
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            multiplier: 1.0,
            max_delay: Duration::ZERO,
            attempt_timeout: None,
        }
    }

    /// Delay before attempt `attempt + 1`, where `attempt` is 1-based
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let factor = self.multiplier.max(1.0).powi(exponent);
        let nanos = (self.base_delay.as_nanos() as f64 * factor).round();
        if !nanos.is_finite() || nanos >= self.max_delay.as_nanos() as f64 {
            return self.max_delay;
        }
        Duration::from_nanos(nanos as u64)
    }

    /// Run `call` until it succeeds, fails permanently, or attempts run out
    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let outcome = match self.attempt_timeout {
                Some(limit) => match tokio::time::timeout(limit, call()).await {
                    Ok(result) => result,
                    Err(_) => Err(Error::Timeout(operation)),
                },
                None => call().await,
            };

            match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "Call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient failure, retrying"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_transient() {
                        warn!(operation, attempt, error = %e, "Retry ceiling reached");
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Like [`run`](Self::run), but consults and updates a circuit breaker
    pub async fn run_guarded<T, F, Fut>(
        &self,
        breaker: &CircuitBreaker,
        operation: &'static str,
        call: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !breaker.allows_call() {
            warn!(operation, "Circuit open, skipping call");
            return Err(Error::CircuitOpen(operation));
        }

        match self.run(operation, call).await {
            Ok(value) => {
                breaker.record_success();
                Ok(value)
            }
            Err(e) => {
                if e.is_transient() && breaker.record_failure() {
                    warn!(operation, "Circuit open after consecutive failures");
                }
                Err(e)
            }
        }
    }
}

/// Consecutive-failure breaker
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    recovery_wait: Duration,
    failures: AtomicU32,
    opened_at: Mutex<Option<Instant>>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(300))
    }
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery_wait: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            recovery_wait,
            failures: AtomicU32::new(0),
            opened_at: Mutex::new(None),
        }
    }

    pub fn record_success(&self) {
        self.failures.store(0, Ordering::SeqCst);
        if let Ok(mut opened) = self.opened_at.lock() {
            *opened = None;
        }
    }

    /// Record a failed call, returns true if the circuit is now open
    ///
    /// Every failure at or past the threshold restarts the recovery wait, so a
    /// failed trial call reopens the circuit.
    pub fn record_failure(&self) -> bool {
        let failures = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures >= self.failure_threshold {
            if let Ok(mut opened) = self.opened_at.lock() {
                *opened = Some(Instant::now());
            }
            return true;
        }
        false
    }

    pub fn failure_count(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    /// Closed, or open long enough to let a trial call through
    pub fn allows_call(&self) -> bool {
        if self.failure_count() < self.failure_threshold {
            return true;
        }
        match self.opened_at.lock() {
            Ok(opened) => opened
                .map(|since| since.elapsed() >= self.recovery_wait)
                .unwrap_or(true),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiFailure;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_delay_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_millis(350),
            attempt_timeout: None,
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(350));
        assert_eq!(policy.delay_for(10), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let calls = AtomicUsize::new(0);
        let result = RetryPolicy::immediate(3)
            .run("get_account_details", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(Error::Api {
                            operation: "get_account_details",
                            kind: ApiFailure::Server,
                        })
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_stops_at_ceiling() {
        let calls = AtomicUsize::new(0);
        let result: Result<()> = RetryPolicy::immediate(3)
            .run("initiate_transfer", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::Authentication) }
            })
            .await;

        assert!(matches!(result, Err(Error::Authentication)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: Result<()> = RetryPolicy::immediate(3)
            .run("get_account_details", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::NotFound("account".into())) }
            })
            .await;

        assert!(matches!(result, Err(Error::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_attempt_timeout_is_transient() {
        let policy = RetryPolicy {
            attempt_timeout: Some(Duration::from_millis(20)),
            ..RetryPolicy::immediate(2)
        };
        let calls = AtomicUsize::new(0);
        let result: Result<()> = policy
            .run("get_transfer_status", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(())
                }
            })
            .await;

        assert!(matches!(result, Err(Error::Timeout("get_transfer_status"))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_breaker_opens_and_resets() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(300));
        assert!(breaker.allows_call());
        assert!(!breaker.record_failure());
        assert!(breaker.allows_call());
        assert!(breaker.record_failure());
        assert!(!breaker.allows_call());

        breaker.record_success();
        assert!(breaker.allows_call());
        assert_eq!(breaker.failure_count(), 0);
    }

    #[test]
    fn test_breaker_reopens_after_failed_trial_call() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(20));
        assert!(breaker.record_failure());
        assert!(!breaker.allows_call());

        std::thread::sleep(Duration::from_millis(30));
        assert!(breaker.allows_call());

        // The trial call fails too
        assert!(breaker.record_failure());
        assert_eq!(breaker.failure_count(), 2);
        assert!(!breaker.allows_call());

        std::thread::sleep(Duration::from_millis(30));
        assert!(breaker.allows_call());
    }

    #[tokio::test]
    async fn test_run_guarded_fails_fast_when_open() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(300));
        let policy = RetryPolicy::immediate(1);

        let first: Result<()> = policy
            .run_guarded(&breaker, "get_account_details", || async {
                Err(Error::Authentication)
            })
            .await;
        assert!(matches!(first, Err(Error::Authentication)));

        let calls = AtomicUsize::new(0);
        let second: Result<()> = policy
            .run_guarded(&breaker, "get_account_details", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;
        assert!(matches!(second, Err(Error::CircuitOpen(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}

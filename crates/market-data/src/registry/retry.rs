//! Bounded retry with exponential backoff around a single provider call.
//!
//! The policy runs an explicit state machine:
//!
//! ```text
//! Attempting(n) --ok--------------------------> Succeeded
//! Attempting(n) --transient, n < max---------> BackingOff(n) --sleep--> Attempting(n+1)
//! Attempting(n) --permanent or n == max------> Exhausted
//! ```
//!
//! Each attempt is bounded by the per-call timeout; expiry counts as a
//! transient [`MarketDataError::Timeout`]. An optional gate (the rate-limit
//! wait) runs before every attempt, outside that timeout.

use std::future::Future;
use std::time::Duration;

use log::{debug, warn};

use crate::errors::MarketDataError;

/// Default per-call timeout.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Retry parameters for one provider.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Attempts per request, including the first. Zero is treated as one.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// `None` disables the per-call timeout.
    pub call_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            call_timeout: Some(DEFAULT_CALL_TIMEOUT),
        }
    }
}

/// Terminal failure after the retry budget is spent or a permanent error.
#[derive(Clone, Debug)]
pub struct RetryExhausted {
    /// Last error observed.
    pub error: MarketDataError,
    /// Attempts actually made.
    pub attempts: u32,
}

#[derive(Debug)]
enum RetryState<T> {
    Attempting { attempt: u32 },
    BackingOff { attempt: u32, delay: Duration },
    Succeeded { value: T, attempts: u32 },
    Exhausted(RetryExhausted),
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            ..Self::default()
        }
    }

    pub fn with_call_timeout(mut self, call_timeout: Option<Duration>) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// A policy that makes exactly one attempt.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 1,
            ..Self::default()
        }
    }

    fn attempt_budget(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Delay slept after the `n`-th failed attempt (0-based):
    /// `min(base * 2^n, max)`.
    pub fn backoff_delay(&self, n: u32) -> Duration {
        let factor = 2f64.powi(n.min(i32::MAX as u32) as i32);
        let seconds = (self.base_delay.as_secs_f64() * factor).min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(seconds.max(0.0))
    }

    /// Delays actually slept between attempts when every attempt fails
    /// transiently.
    pub fn backoff_schedule(&self) -> Vec<Duration> {
        (0..self.attempt_budget() - 1)
            .map(|n| self.backoff_delay(n))
            .collect()
    }

    /// Run `operation` under this policy.
    pub async fn execute<T, F, Fut>(
        &self,
        provider: &str,
        operation: F,
    ) -> Result<T, RetryExhausted>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, MarketDataError>>,
    {
        self.execute_counted(provider, operation)
            .await
            .map(|(value, _)| value)
    }

    /// Like [`execute`](Self::execute), also reporting the attempts made on
    /// success.
    pub async fn execute_counted<T, F, Fut>(
        &self,
        provider: &str,
        operation: F,
    ) -> Result<(T, u32), RetryExhausted>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, MarketDataError>>,
    {
        self.execute_gated(provider, || std::future::ready(()), operation)
            .await
    }

    /// Like [`execute_counted`](Self::execute_counted), awaiting `gate` before
    /// every attempt. Time spent in the gate is not charged to the per-call
    /// timeout.
    pub async fn execute_gated<T, G, GFut, F, Fut>(
        &self,
        provider: &str,
        mut gate: G,
        mut operation: F,
    ) -> Result<(T, u32), RetryExhausted>
    where
        G: FnMut() -> GFut,
        GFut: Future<Output = ()>,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, MarketDataError>>,
    {
        let budget = self.attempt_budget();
        let mut state = RetryState::Attempting { attempt: 1 };

        loop {
            state = match state {
                RetryState::Attempting { attempt } => {
                    gate().await;
                    match self.attempt(provider, &mut operation).await {
                        Ok(value) => RetryState::Succeeded {
                            value,
                            attempts: attempt,
                        },
                        Err(error) if error.is_transient() && attempt < budget => {
                            let delay = self.backoff_delay(attempt - 1);
                            warn!(
                                "Attempt {}/{} on '{}' failed: {}. Retrying in {:?}",
                                attempt, budget, provider, error, delay
                            );
                            RetryState::BackingOff { attempt, delay }
                        }
                        Err(error) => {
                            debug!(
                                "Giving up on '{}' after {} attempt(s): {}",
                                provider, attempt, error
                            );
                            RetryState::Exhausted(RetryExhausted {
                                error,
                                attempts: attempt,
                            })
                        }
                    }
                }
                RetryState::BackingOff { attempt, delay } => {
                    tokio::time::sleep(delay).await;
                    RetryState::Attempting {
                        attempt: attempt + 1,
                    }
                }
                RetryState::Succeeded { value, attempts } => return Ok((value, attempts)),
                RetryState::Exhausted(exhausted) => return Err(exhausted),
            };
        }
    }

    async fn attempt<T, F, Fut>(&self, provider: &str, operation: &mut F) -> Result<T, MarketDataError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, MarketDataError>>,
    {
        match self.call_timeout {
            Some(limit) => tokio::time::timeout(limit, operation())
                .await
                .unwrap_or_else(|_| {
                    Err(MarketDataError::Timeout {
                        provider: provider.to_string(),
                    })
                }),
            None => operation().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn unavailable() -> MarketDataError {
        MarketDataError::from_status("TEST", 503, "unavailable")
    }

    #[test]
    fn test_backoff_sequence_doubles_then_caps() {
        let policy = RetryPolicy::new(5, secs(1), secs(30));
        let delays: Vec<Duration> = (0..5).map(|n| policy.backoff_delay(n)).collect();
        assert_eq!(delays, vec![secs(1), secs(2), secs(4), secs(8), secs(16)]);

        assert_eq!(policy.backoff_delay(5), secs(30));
        assert_eq!(policy.backoff_delay(20), secs(30));
    }

    #[test]
    fn test_backoff_schedule_covers_gaps_between_attempts() {
        let policy = RetryPolicy::new(5, secs(1), secs(30));
        assert_eq!(
            policy.backoff_schedule(),
            vec![secs(1), secs(2), secs(4), secs(8)]
        );
        assert!(RetryPolicy::no_retry().backoff_schedule().is_empty());
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let result = policy
            .execute_counted("TEST", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, MarketDataError>(42)
            })
            .await;

        assert_eq!(result.map_err(|e| e.attempts).ok(), Some((42, 1)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_retry_with_backoff() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, secs(1), secs(30));
        let start = Instant::now();

        let result = policy
            .execute("TEST", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(unavailable())
                } else {
                    Ok("bars")
                }
            })
            .await;

        assert_eq!(result.ok(), Some("bars"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s + 2s of backoff
        assert_eq!(start.elapsed(), secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_reports_last_error_and_attempts() {
        let policy = RetryPolicy::new(3, secs(1), secs(30));

        let result: Result<(), RetryExhausted> = policy
            .execute("TEST", || async { Err(unavailable()) })
            .await;

        let exhausted = result.err().expect("should exhaust");
        assert_eq!(exhausted.attempts, 3);
        assert!(matches!(
            exhausted.error,
            MarketDataError::Http { status: 503, .. }
        ));
    }

    #[tokio::test]
    async fn test_permanent_error_fails_immediately() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(5, secs(1), secs(30));

        let result: Result<(), RetryExhausted> = policy
            .execute("TEST", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(MarketDataError::from_status("TEST", 401, "bad token"))
            })
            .await;

        let exhausted = result.err().expect("should fail");
        assert_eq!(exhausted.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_timeout_is_transient() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(2, secs(1), secs(30)).with_call_timeout(Some(secs(5)));
        let start = Instant::now();

        let result = policy
            .execute("SLOW", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    tokio::time::sleep(secs(3600)).await;
                }
                Ok::<_, MarketDataError>(n)
            })
            .await;

        assert_eq!(result.ok(), Some(1));
        // 5s timeout + 1s backoff
        assert_eq!(start.elapsed(), secs(6));
    }

    #[tokio::test]
    async fn test_zero_retries_still_attempts_once() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(0, secs(1), secs(30));

        let _ = policy
            .execute("TEST", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(unavailable())
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_wait_is_not_charged_to_call_timeout() {
        let gates = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, secs(1), secs(30)).with_call_timeout(Some(secs(5)));
        let start = Instant::now();

        let result = policy
            .execute_gated(
                "QUEUED",
                || async {
                    gates.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(secs(45)).await;
                },
                || async { Ok::<_, MarketDataError>("quote") },
            )
            .await;

        assert_eq!(result.map_err(|e| e.attempts).ok(), Some(("quote", 1)));
        assert_eq!(gates.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), secs(45));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_runs_before_every_attempt() {
        let gates = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, secs(1), secs(30));

        let result: Result<((), u32), RetryExhausted> = policy
            .execute_gated(
                "TEST",
                || {
                    gates.fetch_add(1, Ordering::SeqCst);
                    std::future::ready(())
                },
                || async { Err(unavailable()) },
            )
            .await;

        assert_eq!(result.err().map(|e| e.attempts), Some(3));
        assert_eq!(gates.load(Ordering::SeqCst), 3);
    }
}

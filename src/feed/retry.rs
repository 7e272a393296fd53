use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Retries after the first attempt, so three attempts in total.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Growth base of the backoff curve: retry `r` waits `r * 1.2^r` units.
const BACKOFF_GROWTH: f64 = 1.2;

/// Classifies errors the [`RetryPolicy`] may retry.
///
/// Errors that are not retryable propagate on their first occurrence.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Stateless retry policy with superlinear backoff.
///
/// The policy only holds its configuration; attempt counters live inside
/// each [`RetryPolicy::run`] call, so one value can be copied into any
/// number of concurrent fetches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    max_retries: u32,
    unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, Duration::from_secs(1))
    }
}

impl RetryPolicy {
    /// `unit` scales the backoff curve; one second gives 1.2s then 2.88s.
    pub fn new(max_retries: u32, unit: Duration) -> Self {
        Self { max_retries, unit }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let r = f64::from(retry);
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        self.unit.mul_f64(r * BACKOFF_GROWTH.powi(exponent))
    }

    /// Runs `operation`, retrying retryable failures until the budget is spent.
    ///
    /// `context` identifies the operation in logs (typically the feed URI).
    /// Returns the first success, the first non-retryable error, or the
    /// error of the final attempt.
    pub async fn run<T, E, F, Fut>(&self, context: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let mut retry = 0;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && retry < self.max_retries => {
                    retry += 1;
                    let delay = self.delay_for(retry);
                    tracing::warn!(
                        context = %context,
                        retry = retry,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying after failure"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

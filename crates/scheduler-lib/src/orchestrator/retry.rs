//! Bounded exponential backoff for provider calls

use super::provider::ProviderResult;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; transient errors only
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_millis(500),
            backoff_cap: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based): base · 2^retry, capped
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        std::cmp::min(self.backoff_base.saturating_mul(factor), self.backoff_cap)
    }

    /// Run `op` until it succeeds, fails fatally or runs out of retries
    ///
    /// `op` receives the 1-based attempt number. Returns the final result
    /// and the number of attempts made.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> (ProviderResult<T>, u32)
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op(attempt).await {
                Ok(value) => return (Ok(value), attempt),
                Err(e) if e.is_transient() && attempt <= self.max_retries => {
                    let delay = self.backoff(attempt - 1);
                    warn!(
                        operation = %operation,
                        attempt = attempt,
                        backoff_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient provider error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return (Err(e), attempt),
            }
        }
    }
}

//! Bounded retry with exponential backoff for remote calls.

use std::future::Future;
use std::time::Duration;

use super::RemoteResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: usize,
    /// Delay before the first retry; doubled for each further retry
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// For idempotent reads (`list_all`, token requests)
    pub const fn idempotent() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
        }
    }

    /// For writes: a single automatic retry, to limit duplicate remote rows
    pub const fn write() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_millis(250),
        }
    }

    #[must_use]
    pub const fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(retry.saturating_sub(1)))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::idempotent()
    }
}

/// Run `call` until it succeeds, fails permanently, or attempts run out.
///
/// Only errors reporting [`super::RemoteError::is_transient`] are retried.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, operation: &str, mut call: F) -> RemoteResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = RemoteResult<T>>,
{
    let mut retry = 0u32;

    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                let attempts_made = usize::try_from(retry).unwrap_or(usize::MAX) + 1;
                let should_retry =
                    attempts_made < policy.max_attempts && error.is_transient();

                if !should_retry {
                    return Err(error);
                }

                retry += 1;
                let delay = policy.delay_for(retry);
                tracing::warn!(
                    operation,
                    attempt = retry,
                    "Transient remote failure, retrying in {}ms: {}",
                    delay.as_millis(),
                    error
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::RetryConfig;

/// Exponential backoff with an explicit attempt cap inside an overall
/// timeout. The cap guarantees termination even when the clock is
/// generous; the timeout bounds wall time across all attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base: Duration,
    pub max_attempts: u32,
    pub timeout: Duration,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            base: Duration::from_millis(config.base_ms),
            max_attempts: config.max_attempts.max(1),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

#[derive(Debug, Error)]
pub enum RetryError<E: fmt::Display> {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("retries exhausted: {0}")]
    Exhausted(E),
}

/// Runs `op` until it succeeds, the attempt cap is hit, or the timeout
/// expires. Backoff doubles per attempt starting from `policy.base`.
pub async fn retry_with_timeout<T, E, F, Fut>(
    policy: RetryPolicy,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    E: fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = async {
        let mut last_err = None;
        for attempt in 0..policy.max_attempts {
            if attempt > 0 {
                let backoff = policy.base * 2u32.saturating_pow(attempt - 1);
                debug!("retrying after {:?} (attempt {})", backoff, attempt + 1);
                tokio::time::sleep(backoff).await;
            }
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => last_err = Some(e),
            }
        }
        // max_attempts >= 1, so at least one error was recorded.
        Err(last_err.unwrap())
    };

    match tokio::time::timeout(policy.timeout, attempts).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(RetryError::Exhausted(e)),
        Err(_) => Err(RetryError::Timeout(policy.timeout)),
    }
}

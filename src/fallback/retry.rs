use crate::providers::ProviderError;
use std::future::Future;
use std::time::Duration;

/// Bounded exponential backoff for transient provider errors. Kept in one
/// place so every provider retries the same way.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Delay before retry attempt `k` (1-based): `min(base * 2^(k-1), max)`.
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(31);
    policy
        .base_delay
        .saturating_mul(1u32 << exp)
        .min(policy.max_delay)
}

pub struct RetryOutcome<T> {
    pub result: Result<T, ProviderError>,
    /// Retries actually consumed (0 when the first call succeeded).
    pub retries: u32,
}

/// Runs `op`, retrying transient failures up to `max_retries` times with
/// exponential backoff. Permanent errors fail immediately.
pub async fn retry_transient<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> RetryOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut retries = 0;
    loop {
        match op().await {
            Ok(value) => return RetryOutcome { result: Ok(value), retries },
            Err(e) if e.is_transient() && retries < policy.max_retries => {
                retries += 1;
                let delay = backoff_delay(policy, retries);
                tracing::debug!(retry = retries, delay_ms = delay.as_millis() as u64, "transient error, backing off: {e}");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return RetryOutcome { result: Err(e), retries },
        }
    }
}

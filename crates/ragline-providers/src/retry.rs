//! Timeout and retry wrapper for external calls.

use std::future::Future;
use std::time::Duration;

use ragline_config::LimitsConfig;
use tracing::warn;

use crate::ProviderError;

/// Bounds applied to every external call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Deadline for a single attempt
    pub timeout: Duration,
    /// Extra attempts after the first one
    pub max_retries: u32,
    /// Delay before the first retry, doubled after each one
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_limits(&LimitsConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_limits(limits: &LimitsConfig) -> Self {
        Self {
            timeout: Duration::from_secs(limits.request_timeout_secs),
            max_retries: limits.max_retries,
            initial_backoff: Duration::from_millis(limits.retry_backoff_ms),
        }
    }

    /// A single attempt with the given deadline.
    pub fn no_retry(timeout: Duration) -> Self {
        Self {
            timeout,
            max_retries: 0,
            initial_backoff: Duration::ZERO,
        }
    }
}

/// Run `call` under `policy`.
///
/// Each attempt is bounded by `policy.timeout`; an elapsed deadline becomes
/// [`ProviderError::Timeout`]. Retryable errors are retried up to
/// `policy.max_retries` times with exponential backoff; anything else is
/// returned immediately.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    provider: &str,
    operation: &str,
    mut call: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 0u32;
    let mut backoff = policy.initial_backoff;

    loop {
        let outcome = match tokio::time::timeout(policy.timeout, call()).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout {
                provider: provider.to_string(),
                operation: operation.to_string(),
                after: policy.timeout,
            }),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                attempt += 1;
                warn!(
                    provider,
                    operation,
                    "{} (attempt {}/{}), retrying in {:?}",
                    e,
                    attempt,
                    policy.max_retries,
                    backoff
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(200),
            max_retries,
            initial_backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = with_retry(&fast_policy(3), "mock", "embed", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ProviderError::transient("mock", "503"))
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = with_retry(&fast_policy(2), "mock", "embed", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::transient("mock", "503"))
        })
        .await;

        assert!(matches!(result, Err(ProviderError::Transient { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_returns_immediately() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = with_retry(&fast_policy(5), "mock", "generate", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::Configuration("bad key".to_string()))
        })
        .await;

        assert!(matches!(result, Err(ProviderError::Configuration(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let policy = RetryPolicy::no_retry(Duration::from_millis(10));
        let result: Result<(), _> = with_retry(&policy, "mock", "search", move || async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        match result {
            Err(ProviderError::Timeout { operation, .. }) => assert_eq!(operation, "search"),
            other => panic!("expected timeout, got {:?}", other),
        }
    }
}

//! Retry with exponential backoff for transient provider failures.

use super::{CompletionRequest, CompletionResponse, LlmProvider, ProviderError};
use backon::{ExponentialBuilder, Retryable};
use std::time::Duration;
use tracing::warn;

/// How many times a transient failure is retried, and how long to wait between tries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    /// 2s → 4s → 8s, capped at 60s
    fn default() -> Self {
        Self {
            max_retries: 3,
            min_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Fail on the first error
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::new()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_factor(2.0)
            .with_jitter()
            .with_max_times(self.max_retries)
    }
}

/// If the server told us how long to back off, wait at least that long.
fn adjust_for_rate_limit(err: &ProviderError, dur: Option<Duration>) -> Option<Duration> {
    match (err, dur) {
        (ProviderError::RateLimited { retry_after: Some(secs) }, Some(d)) => {
            Some(d.max(Duration::from_secs(*secs)))
        }
        (_, dur) => dur,
    }
}

/// Send `request`, retrying transient failures according to `policy`.
pub async fn complete_with_retry<P: LlmProvider>(
    provider: &P,
    request: &CompletionRequest,
    policy: &RetryPolicy,
) -> Result<CompletionResponse, ProviderError> {
    let name = provider.name();
    (|| async move { provider.complete(request.clone()).await })
        .retry(policy.backoff())
        .sleep(tokio::time::sleep)
        .when(ProviderError::is_transient)
        .adjust(adjust_for_rate_limit)
        .notify(|err: &ProviderError, dur: Duration| {
            warn!(provider = name, error = %err, "retrying in {:?}", dur);
        })
        .await
}

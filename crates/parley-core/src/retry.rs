//! Bounded retry for provider calls.
//!
//! [`RetryExecutor`] picks a provider through the health monitor on every
//! attempt, so a 502 from the primary flips the next attempt onto the
//! fallback without waiting. Other failures back off exponentially.
//!
//! [`retry_transient`] is the provider-agnostic variant used for calls that
//! have no fallback endpoint (video submission).

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use parley_types::config::RetrySettings;
use parley_types::error::ProviderError;

use crate::provider::{BoxAssistantProvider, ProviderHealthMonitor};

/// Attempt budget and backoff base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (1-based): `initial * 2^(attempt-1)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_delay.saturating_mul(1 << exponent)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
        }
    }
}

/// Runs an operation against the preferred provider with retry and failover.
pub struct RetryExecutor {
    monitor: Arc<ProviderHealthMonitor>,
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(monitor: Arc<ProviderHealthMonitor>, policy: RetryPolicy) -> Self {
        Self { monitor, policy }
    }

    pub fn monitor(&self) -> &Arc<ProviderHealthMonitor> {
        &self.monitor
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Run `operation` until it succeeds or attempts run out.
    ///
    /// - 502: mark the primary unavailable, next attempt immediately.
    /// - non-retryable error: returned at once.
    /// - anything else: sleep `initial_delay * 2^(attempt-1)` unless this was
    ///   the last attempt.
    ///
    /// The last error is returned unchanged when every attempt fails.
    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> Result<T, ProviderError>
    where
        F: FnMut(Arc<BoxAssistantProvider>) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let max_attempts = self.policy.attempts();
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            let selection = self.monitor.preferred().await;

            match operation(selection.provider).await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) if err.is_bad_gateway() => {
                    warn!(
                        provider = %selection.role,
                        attempt,
                        max_attempts,
                        error = %err,
                        "502 from provider, switching to fallback"
                    );
                    self.monitor.mark_primary_unavailable();
                    last_error = Some(err);
                }
                Err(err) => {
                    if attempt < max_attempts {
                        let delay = self.policy.delay_for(attempt);
                        warn!(
                            provider = %selection.role,
                            attempt,
                            max_attempts,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "provider call failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    last_error = Some(err);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| ProviderError::Network("retry loop made no attempts".to_string())))
    }
}

/// Retry `operation` only while it fails with a transient error (network,
/// rate limit, 5xx), doubling the delay between attempts.
pub async fn retry_transient<T, F, Fut>(
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let max_attempts = policy.attempts();
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient error, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

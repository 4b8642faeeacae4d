//! Timeout and retry decorator for gateways

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::warn;

use super::{ChatCompletion, ModelGateway, ModelParams};
use crate::conversation::ChatBody;
use crate::error::GatewayError;
use crate::tools::ToolDeclaration;

/// Upper bound for a single backoff delay
const MAX_RETRY_DELAY_MS: u64 = 30_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Per-attempt timeout, `None` waits forever
    pub timeout: Option<Duration>,
    /// Additional attempts after the first
    pub retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(60)),
            retries: 2,
            retry_delay_ms: 500,
        }
    }
}

/// Wraps a gateway with a per-attempt timeout and exponential backoff.
///
/// Only failures for which [`GatewayError::is_retryable`] holds are retried.
pub struct RetryingGateway<G> {
    inner: G,
    policy: RetryPolicy,
}

impl<G: ModelGateway> RetryingGateway<G> {
    pub fn new(inner: G, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }

    async fn attempt(
        &self,
        messages: &[ChatBody],
        tools: &[ToolDeclaration],
        params: &ModelParams,
    ) -> Result<ChatCompletion, GatewayError> {
        let call = self.inner.process(messages, tools, params);
        match self.policy.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| GatewayError::Timeout(limit))?,
            None => call.await,
        }
    }
}

#[async_trait]
impl<G: ModelGateway> ModelGateway for RetryingGateway<G> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn process(
        &self,
        messages: &[ChatBody],
        tools: &[ToolDeclaration],
        params: &ModelParams,
    ) -> Result<ChatCompletion, GatewayError> {
        let max_attempts = self.policy.retries.saturating_add(1);
        let mut attempt = 0;

        loop {
            match self.attempt(messages, tools, params).await {
                Ok(completion) => return Ok(completion),
                Err(err) => {
                    let can_retry = err.is_retryable() && attempt + 1 < max_attempts;
                    if !can_retry {
                        return Err(err);
                    }
                    let delay = retry_delay(attempt, self.policy.retry_delay_ms);
                    warn!(
                        gateway = self.inner.name(),
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Model call failed, retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Backoff before retry number `attempt + 1`: `base_ms * 2^attempt`, capped
pub fn retry_delay(attempt: u32, base_ms: u64) -> Duration {
    let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    let delay_ms = base_ms.saturating_mul(factor).min(MAX_RETRY_DELAY_MS);
    Duration::from_millis(delay_ms)
}

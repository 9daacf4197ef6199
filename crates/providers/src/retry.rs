//! Caller-side retry with exponential backoff.
//!
//! The agent loop and the memory store never retry; wrap the provider or
//! embedder in these decorators to retry transient failures (rate limits,
//! 5xx, network) before they reach the core.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use taskloop_config::RetryConfig;
use taskloop_core::embedding::Embedder;
use taskloop_core::error::{EmbeddingError, ProviderError};
use taskloop_core::provider::{Provider, ProviderRequest, ProviderResponse};
use tracing::warn;

/// Errors that know whether another attempt could succeed.
pub trait Retryable: Display {
    fn is_retryable(&self) -> bool;
    fn retry_after_secs(&self) -> Option<u64>;
}

impl Retryable for ProviderError {
    fn is_retryable(&self) -> bool {
        ProviderError::is_retryable(self)
    }

    fn retry_after_secs(&self) -> Option<u64> {
        ProviderError::retry_after_secs(self)
    }
}

impl Retryable for EmbeddingError {
    fn is_retryable(&self) -> bool {
        EmbeddingError::is_retryable(self)
    }

    fn retry_after_secs(&self) -> Option<u64> {
        EmbeddingError::retry_after_secs(self)
    }
}

/// Backoff before retry number `attempt` (0-based), capped at `max_delay_ms`.
pub fn compute_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let base = config.initial_delay_ms as f64 * config.backoff_multiplier.powi(attempt as i32);
    let millis = if base.is_finite() { base as u64 } else { u64::MAX };
    Duration::from_millis(millis.min(config.max_delay_ms))
}

/// Run `op` until it succeeds, fails permanently, or retries run out.
pub async fn retry<T, E, F, Fut>(config: &RetryConfig, label: &str, mut op: F) -> Result<T, E>
where
    E: Retryable,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < config.max_retries && e.is_retryable() => {
                let delay = e
                    .retry_after_secs()
                    .map(|secs| Duration::from_secs(secs).min(Duration::from_millis(config.max_delay_ms)))
                    .unwrap_or_else(|| compute_delay(config, attempt));

                warn!(
                    attempt = attempt + 1,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying {label}"
                );

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// A provider that retries transient failures of the wrapped provider.
pub struct RetryingProvider<P> {
    inner: P,
    config: RetryConfig,
}

impl<P: Provider> RetryingProvider<P> {
    pub fn new(inner: P, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl<P: Provider> Provider for RetryingProvider<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        retry(&self.config, "completion request", || self.inner.complete(request.clone())).await
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        self.inner.health_check().await
    }
}

/// An embedder that retries transient failures of the wrapped embedder.
pub struct RetryingEmbedder<E> {
    inner: E,
    config: RetryConfig,
}

impl<E: Embedder> RetryingEmbedder<E> {
    pub fn new(inner: E, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl<E: Embedder> Embedder for RetryingEmbedder<E> {
    fn model(&self) -> &str {
        self.inner.model()
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        retry(&self.config, "embedding request", || self.inner.embed(texts)).await
    }
}

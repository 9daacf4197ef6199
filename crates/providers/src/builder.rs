//! Build the configured provider and embedder.
//!
//! Both come back wrapped in the retry decorators, so callers only see an
//! error once transient failures have been retried away.

use std::sync::Arc;

use taskloop_config::AppConfig;
use taskloop_core::embedding::Embedder;
use taskloop_core::error::{EmbeddingError, ProviderError};
use taskloop_core::provider::Provider;
use tracing::info;

use crate::embedding::OpenAiEmbedder;
use crate::openai_compat::OpenAiCompatProvider;
use crate::retry::{RetryingEmbedder, RetryingProvider};

/// Local runtimes accept any key.
fn needs_api_key(provider: &str) -> bool {
    !matches!(provider, "ollama" | "vllm")
}

fn api_key(config: &AppConfig) -> Option<String> {
    match &config.api_key {
        Some(key) => Some(key.clone()),
        None if !needs_api_key(&config.provider) => Some(config.provider.clone()),
        None => None,
    }
}

/// Completion provider for `config.provider`, with retries.
pub fn build_provider(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let key = api_key(config).ok_or_else(|| {
        ProviderError::NotConfigured(format!("No API key configured for {}", config.provider))
    })?;
    let base_url = config.resolved_base_url();
    info!(provider = %config.provider, base_url = %base_url, model = %config.model, "Building provider");

    let provider = OpenAiCompatProvider::new(&config.provider, base_url, key)?;
    Ok(Arc::new(RetryingProvider::new(provider, config.retry.clone())))
}

/// Remote embedder for `config.memory`, with retries.
pub fn build_embedder(config: &AppConfig) -> Result<Arc<dyn Embedder>, EmbeddingError> {
    let key = api_key(config).ok_or_else(|| {
        EmbeddingError::NotConfigured(format!("No API key configured for {}", config.provider))
    })?;
    let embedder = OpenAiEmbedder::new(
        config.resolved_base_url(),
        key,
        &config.memory.embedding_model,
        config.memory.dimensions,
    )?;
    Ok(Arc::new(RetryingEmbedder::new(embedder, config.retry.clone())))
}

//! OpenAI-compatible embedding client.
//!
//! Posts to `/embeddings` and requests vectors truncated to the deployment
//! dimension, so a 256-dimension store can use `text-embedding-3-small`.

use async_trait::async_trait;
use serde::Deserialize;
use taskloop_core::embedding::{Embedder, check_batch};
use taskloop_core::error::EmbeddingError;
use tracing::{debug, warn};

use crate::http;

pub struct OpenAiEmbedder {
    base_url: String,
    api_key: String,
    model: String,
    dimensions: usize,
    client: reqwest::Client,
}

impl OpenAiEmbedder {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Result<Self, EmbeddingError> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            dimensions,
            client: http::client().map_err(EmbeddingError::NotConfigured)?,
        })
    }

    fn request_body(&self, texts: &[String]) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "input": texts,
            "encoding_format": "float",
            "dimensions": self.dimensions,
        })
    }

    /// Vectors in input order, validated against the request.
    fn parse_response(
        &self,
        mut api_response: EmbeddingApiResponse,
        inputs: usize,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        api_response.data.sort_by_key(|d| d.index);
        let vectors: Vec<Vec<f32>> = api_response.data.into_iter().map(|d| d.embedding).collect();
        check_batch(&vectors, inputs, self.dimensions)?;
        Ok(vectors)
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embeddings", self.base_url);
        debug!(model = %self.model, count = texts.len(), "Sending embedding request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(texts))
            .send()
            .await
            .map_err(|e| EmbeddingError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        match http::classify(status, http::retry_after(&response)) {
            http::Status::Ok => {}
            http::Status::RateLimited(retry_after_secs) => {
                return Err(EmbeddingError::RateLimited { retry_after_secs });
            }
            http::Status::Unauthorized => {
                return Err(EmbeddingError::AuthenticationFailed("Invalid API key".into()));
            }
            http::Status::NotFound | http::Status::Failed => {
                let error_body = response.text().await.unwrap_or_default();
                warn!(status, body = %error_body, "Embedding service returned error");
                return Err(EmbeddingError::ApiError {
                    status_code: status,
                    message: error_body,
                });
            }
        }

        let api_response: EmbeddingApiResponse =
            response.json().await.map_err(|e| EmbeddingError::ApiError {
                status_code: status,
                message: format!("Failed to parse embedding response: {e}"),
            })?;

        self.parse_response(api_response, texts.len())
    }
}

// --- Embedding API types ---

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

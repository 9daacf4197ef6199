//! Embedder trait: text to fixed-length vectors.
//!
//! An embedder is a pure function of its input and model identifier. Output
//! has the same length and order as the input, and every vector has exactly
//! `dimensions()` components.

use async_trait::async_trait;

use crate::error::EmbeddingError;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier (e.g., "text-embedding-3-small").
    fn model(&self) -> &str;

    /// Length of every vector this embedder produces.
    fn dimensions(&self) -> usize;

    /// Embed a batch of texts.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embed a single text.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        if vectors.len() != 1 {
            return Err(EmbeddingError::CountMismatch {
                expected: 1,
                actual: vectors.len(),
            });
        }
        vectors.pop().ok_or(EmbeddingError::CountMismatch {
            expected: 1,
            actual: 0,
        })
    }
}

/// Check a batch returned by a remote service against the request.
pub fn check_batch(
    vectors: &[Vec<f32>],
    inputs: usize,
    dimensions: usize,
) -> Result<(), EmbeddingError> {
    if vectors.len() != inputs {
        return Err(EmbeddingError::CountMismatch {
            expected: inputs,
            actual: vectors.len(),
        });
    }
    match vectors.iter().find(|v| v.len() != dimensions) {
        Some(v) => Err(EmbeddingError::DimensionMismatch {
            expected: dimensions,
            actual: v.len(),
        }),
        None => Ok(()),
    }
}

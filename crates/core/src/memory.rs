//! Memory trait: persistent records ranked by vector similarity.
//!
//! Records are created by explicit saves and never deleted or rewritten;
//! the only mutation is bumping `updated_at`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;

/// A single stored memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Unique ID for this memory
    pub id: String,

    /// The remembered text
    pub content: String,

    /// Embedding of `content`, fixed dimension per deployment
    #[serde(skip)]
    pub embedding: Vec<f32>,

    /// Estimated token count of `content`
    pub token_count: u32,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// A record returned by similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMemory {
    #[serde(flatten)]
    pub record: MemoryRecord,

    /// Cosine similarity to the query, in [-1, 1]
    pub similarity: f32,
}

/// Storage for memory records.
///
/// Implementations must make concurrent inserts safe, and keep insertion
/// order so that equal similarities rank earlier records first.
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Dimension every stored vector must have.
    fn dimensions(&self) -> usize;

    /// Persist a new record.
    async fn insert(&self, record: MemoryRecord) -> Result<(), MemoryError>;

    /// The `k` records most similar to `query`, most similar first.
    async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<ScoredMemory>, MemoryError>;

    /// Get a memory by ID.
    async fn get(&self, id: &str) -> Result<Option<MemoryRecord>, MemoryError>;

    /// Set `updated_at` to now. Returns false if the id is unknown.
    async fn touch(&self, id: &str) -> Result<bool, MemoryError>;

    /// Get total memory count.
    async fn count(&self) -> Result<usize, MemoryError>;
}

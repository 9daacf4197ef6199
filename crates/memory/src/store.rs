//! The vector memory service: embed, persist, and retrieve by similarity.

use std::sync::Arc;

use chrono::Utc;
use taskloop_core::embedding::{Embedder, check_batch};
use taskloop_core::error::MemoryError;
use taskloop_core::event::{DomainEvent, EventBus};
use taskloop_core::memory::{MemoryBackend, MemoryRecord, ScoredMemory};
use tracing::{debug, info};
use uuid::Uuid;

use crate::tokens::count_tokens;

/// Long-term semantic memory over an [`Embedder`] and a [`MemoryBackend`].
///
/// Cheap to share: clone the `Arc` it lives in. Saves are not idempotent;
/// identical content saved twice produces two records.
pub struct VectorMemory {
    embedder: Arc<dyn Embedder>,
    backend: Arc<dyn MemoryBackend>,
    event_bus: Option<Arc<EventBus>>,
}

impl VectorMemory {
    /// Fails if the embedder and backend disagree on the vector dimension.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        backend: Arc<dyn MemoryBackend>,
    ) -> Result<Self, MemoryError> {
        if embedder.dimensions() != backend.dimensions() {
            return Err(MemoryError::DimensionMismatch {
                expected: backend.dimensions(),
                actual: embedder.dimensions(),
            });
        }
        info!(
            embedder = embedder.model(),
            backend = backend.name(),
            dimensions = backend.dimensions(),
            "Vector memory ready"
        );
        Ok(Self {
            embedder,
            backend,
            event_bus: None,
        })
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn dimensions(&self) -> usize {
        self.backend.dimensions()
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Embed and persist `content` as a new record.
    pub async fn save(&self, content: &str) -> Result<MemoryRecord, MemoryError> {
        let mut records = self.save_many(&[content.to_string()]).await?;
        records
            .pop()
            .ok_or_else(|| MemoryError::Storage("Save produced no record".into()))
    }

    /// Embed a batch with a single embedding call and persist each, in order.
    pub async fn save_many(&self, contents: &[String]) -> Result<Vec<MemoryRecord>, MemoryError> {
        if contents.is_empty() {
            return Ok(Vec::new());
        }

        let vectors = self.embedder.embed(contents).await?;
        check_batch(&vectors, contents.len(), self.dimensions())?;

        let mut saved = Vec::with_capacity(contents.len());
        for (content, embedding) in contents.iter().zip(vectors) {
            let now = Utc::now();
            let record = MemoryRecord {
                id: Uuid::new_v4().to_string(),
                content: content.clone(),
                embedding,
                token_count: count_tokens(content),
                created_at: now,
                updated_at: now,
            };
            self.backend.insert(record.clone()).await?;
            debug!(id = %record.id, tokens = record.token_count, "Saved memory");
            self.publish(DomainEvent::MemorySaved {
                id: record.id.clone(),
                token_count: record.token_count,
                timestamp: now,
            });
            saved.push(record);
        }
        Ok(saved)
    }

    /// The `k` records most similar to `query`, most similar first.
    ///
    /// Returns fewer than `k` when the store holds fewer records, and an empty
    /// list for an empty store.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ScoredMemory>, MemoryError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let vector = self.embedder.embed_one(query).await?;
        check_batch(std::slice::from_ref(&vector), 1, self.dimensions())?;

        let results = self.backend.nearest(&vector, k).await?;
        debug!(requested = k, returned = results.len(), "Retrieved memories");
        self.publish(DomainEvent::MemoryRetrieved {
            requested: k,
            returned: results.len(),
            timestamp: Utc::now(),
        });
        Ok(results)
    }

    pub async fn get(&self, id: &str) -> Result<Option<MemoryRecord>, MemoryError> {
        self.backend.get(id).await
    }

    /// Bump a record's `updated_at`.
    pub async fn touch(&self, id: &str) -> Result<bool, MemoryError> {
        self.backend.touch(id).await
    }

    pub async fn count(&self) -> Result<usize, MemoryError> {
        self.backend.count().await
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }
}

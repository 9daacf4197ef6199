//! In-memory backend: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use taskloop_core::error::MemoryError;
use taskloop_core::memory::{MemoryBackend, MemoryRecord, ScoredMemory};
use tokio::sync::RwLock;

use crate::vector::rank_nearest;

/// An in-memory backend that stores records in a Vec, in insertion order.
///
/// Searches take a read lock and run concurrently; inserts and touches take
/// the write lock.
pub struct InMemoryBackend {
    dimensions: usize,
    records: Arc<RwLock<Vec<MemoryRecord>>>,
}

impl InMemoryBackend {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            records: Arc::new(RwLock::new(Vec::new())),
        }
    }

    fn check_dimensions(&self, len: usize) -> Result<(), MemoryError> {
        if len == self.dimensions {
            Ok(())
        } else {
            Err(MemoryError::DimensionMismatch {
                expected: self.dimensions,
                actual: len,
            })
        }
    }
}

#[async_trait]
impl MemoryBackend for InMemoryBackend {
    fn name(&self) -> &str {
        "in_memory"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn insert(&self, record: MemoryRecord) -> Result<(), MemoryError> {
        self.check_dimensions(record.embedding.len())?;
        let mut records = self.records.write().await;
        if records.iter().any(|r| r.id == record.id) {
            return Err(MemoryError::Storage(format!("Duplicate memory id {}", record.id)));
        }
        records.push(record);
        Ok(())
    }

    async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<ScoredMemory>, MemoryError> {
        self.check_dimensions(query.len())?;
        let records = self.records.read().await;
        Ok(rank_nearest(records.iter(), query, k))
    }

    async fn get(&self, id: &str) -> Result<Option<MemoryRecord>, MemoryError> {
        let records = self.records.read().await;
        Ok(records.iter().find(|r| r.id == id).cloned())
    }

    async fn touch(&self, id: &str) -> Result<bool, MemoryError> {
        let mut records = self.records.write().await;
        match records.iter_mut().find(|r| r.id == id) {
            Some(record) => {
                record.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        Ok(self.records.read().await.len())
    }
}

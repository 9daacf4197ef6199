//! SQLite backend.
//!
//! Uses a single SQLite database file with two tables:
//! - `memories`: one row per record, embedding stored as a little-endian f32 BLOB
//! - `memory_meta`: deployment settings, currently the embedding dimension
//!
//! The AUTOINCREMENT key preserves insertion order for tie-breaking.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use taskloop_core::error::MemoryError;
use taskloop_core::memory::{MemoryBackend, MemoryRecord, ScoredMemory};
use tracing::{debug, info};

use crate::vector::rank_nearest;

/// A persistent SQLite memory backend.
pub struct SqliteBackend {
    pool: SqlitePool,
    dimensions: usize,
}

impl SqliteBackend {
    /// Open (or create) a database at `path` holding `dimensions`-length vectors.
    ///
    /// Pass `"sqlite::memory:"` for an ephemeral database. Opening an existing
    /// database created with a different dimension fails.
    pub async fn new(path: &str, dimensions: usize) -> Result<Self, MemoryError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| MemoryError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        // Every connection to :memory: is a separate database.
        let max_connections = if path.contains(":memory:") { 1 } else { 4 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to open SQLite: {e}")))?;

        let backend = Self::from_pool(pool, dimensions).await?;
        info!(path, dimensions, "SQLite memory backend initialized");
        Ok(backend)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool, dimensions: usize) -> Result<Self, MemoryError> {
        let backend = Self { pool, dimensions };
        backend.run_migrations().await?;
        backend.check_stored_dimensions().await?;
        Ok(backend)
    }

    async fn run_migrations(&self) -> Result<(), MemoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS memories (
                iid          INTEGER PRIMARY KEY AUTOINCREMENT,
                id           TEXT UNIQUE NOT NULL,
                content      TEXT NOT NULL,
                embedding    BLOB NOT NULL,
                token_count  INTEGER NOT NULL CHECK (token_count >= 0),
                created_at   TEXT NOT NULL,
                updated_at   TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("memories table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS memory_meta (
                key    TEXT PRIMARY KEY,
                value  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("meta table: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    /// Record the dimension on first open; reject a different one afterwards.
    async fn check_stored_dimensions(&self) -> Result<(), MemoryError> {
        sqlx::query("INSERT OR IGNORE INTO memory_meta (key, value) VALUES ('dimensions', ?1)")
            .bind(self.dimensions.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::MigrationFailed(format!("dimension record: {e}")))?;

        let stored: String =
            sqlx::query_scalar("SELECT value FROM memory_meta WHERE key = 'dimensions'")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| MemoryError::QueryFailed(format!("dimension lookup: {e}")))?;

        let stored: usize = stored
            .parse()
            .map_err(|e| MemoryError::Storage(format!("Corrupt stored dimension '{stored}': {e}")))?;

        if stored != self.dimensions {
            return Err(MemoryError::DimensionMismatch {
                expected: stored,
                actual: self.dimensions,
            });
        }
        Ok(())
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

    /// Parse a `MemoryRecord` from a SQLite row.
    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<MemoryRecord, MemoryError> {
        let id: String = row
            .try_get("id")
            .map_err(|e| MemoryError::QueryFailed(format!("id column: {e}")))?;
        let content: String = row
            .try_get("content")
            .map_err(|e| MemoryError::QueryFailed(format!("content column: {e}")))?;
        let blob: Vec<u8> = row
            .try_get("embedding")
            .map_err(|e| MemoryError::QueryFailed(format!("embedding column: {e}")))?;
        let token_count: i64 = row
            .try_get("token_count")
            .map_err(|e| MemoryError::QueryFailed(format!("token_count column: {e}")))?;
        let created_at: String = row
            .try_get("created_at")
            .map_err(|e| MemoryError::QueryFailed(format!("created_at column: {e}")))?;
        let updated_at: String = row
            .try_get("updated_at")
            .map_err(|e| MemoryError::QueryFailed(format!("updated_at column: {e}")))?;

        Ok(MemoryRecord {
            id,
            content,
            embedding: Self::blob_to_embedding(&blob),
            token_count: u32::try_from(token_count)
                .map_err(|e| MemoryError::QueryFailed(format!("token_count out of range: {e}")))?,
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
        })
    }

    /// Serialize an embedding vector to bytes.
    fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
        blob.chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, MemoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| MemoryError::QueryFailed(format!("Bad timestamp '{value}': {e}")))
}

#[async_trait]
impl MemoryBackend for SqliteBackend {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn insert(&self, record: MemoryRecord) -> Result<(), MemoryError> {
        self.check_dimensions(record.embedding.len())?;

        sqlx::query(
            r#"
            INSERT INTO memories (id, content, embedding, token_count, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&record.id)
        .bind(&record.content)
        .bind(Self::embedding_to_blob(&record.embedding))
        .bind(i64::from(record.token_count))
        .bind(record.created_at.to_rfc3339())
        .bind(record.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("INSERT failed: {e}")))?;

        debug!(id = %record.id, "Stored memory");
        Ok(())
    }

    async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<ScoredMemory>, MemoryError> {
        self.check_dimensions(query.len())?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query("SELECT * FROM memories ORDER BY iid ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("Scan failed: {e}")))?;

        let records = rows
            .iter()
            .map(Self::row_to_record)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rank_nearest(&records, query, k))
    }

    async fn get(&self, id: &str) -> Result<Option<MemoryRecord>, MemoryError> {
        let row = sqlx::query("SELECT * FROM memories WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("GET failed: {e}")))?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn touch(&self, id: &str) -> Result<bool, MemoryError> {
        let result = sqlx::query("UPDATE memories SET updated_at = ?1 WHERE id = ?2")
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("UPDATE failed: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM memories")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("COUNT failed: {e}")))?;

        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_backend() -> SqliteBackend {
        SqliteBackend::new("sqlite::memory:", 3).await.unwrap()
    }

    fn record(id: &str, embedding: Vec<f32>) -> MemoryRecord {
        let now = Utc::now();
        MemoryRecord {
            id: id.into(),
            content: format!("Content for {id}"),
            embedding,
            token_count: 4,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn insert_and_get_round_trip() {
        let db = test_backend().await;
        let original = record("a", vec![0.25, -1.5, 3.0]);
        db.insert(original.clone()).await.unwrap();

        let fetched = db.get("a").await.unwrap().unwrap();
        assert_eq!(fetched.content, original.content);
        assert_eq!(fetched.embedding, original.embedding);
        assert_eq!(fetched.token_count, 4);
        assert_eq!(fetched.created_at.timestamp_micros(), original.created_at.timestamp_micros());
    }

    #[tokio::test]
    async fn get_missing_is_none() {
        let db = test_backend().await;
        assert!(db.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn count_empty() {
        let db = test_backend().await;
        assert_eq!(db.count().await.unwrap(), 0);
        assert_eq!(db.name(), "sqlite");
    }

    #[tokio::test]
    async fn duplicate_id_is_rejected() {
        let db = test_backend().await;
        db.insert(record("a", vec![1.0, 0.0, 0.0])).await.unwrap();
        assert!(db.insert(record("a", vec![1.0, 0.0, 0.0])).await.is_err());
        assert_eq!(db.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn wrong_dimension_is_rejected() {
        let db = test_backend().await;
        let err = db.insert(record("a", vec![1.0])).await.unwrap_err();
        assert!(matches!(err, MemoryError::DimensionMismatch { expected: 3, actual: 1 }));
    }

    #[tokio::test]
    async fn nearest_ranks_and_breaks_ties_by_insertion() {
        let db = test_backend().await;
        db.insert(record("orthogonal", vec![0.0, 1.0, 0.0])).await.unwrap();
        db.insert(record("first", vec![1.0, 0.0, 0.0])).await.unwrap();
        db.insert(record("second", vec![2.0, 0.0, 0.0])).await.unwrap();

        let results = db.nearest(&[1.0, 0.0, 0.0], 2).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|s| s.record.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second"]);
        assert!((results[0].similarity - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn nearest_on_empty_is_empty() {
        let db = test_backend().await;
        assert!(db.nearest(&[1.0, 0.0, 0.0], 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn touch_bumps_updated_at() {
        let db = test_backend().await;
        db.insert(record("a", vec![1.0, 0.0, 0.0])).await.unwrap();
        assert!(db.touch("a").await.unwrap());
        assert!(!db.touch("missing").await.unwrap());

        let fetched = db.get("a").await.unwrap().unwrap();
        assert!(fetched.updated_at >= fetched.created_at);
    }

    #[tokio::test]
    async fn persists_across_reopen_and_guards_dimension() {
        let dir = tempfile::tempdir().unwrap();
        let path = format!("sqlite://{}", dir.path().join("memory.sqlite").display());

        {
            let db = SqliteBackend::new(&path, 3).await.unwrap();
            db.insert(record("kept", vec![1.0, 2.0, 3.0])).await.unwrap();
        }

        let reopened = SqliteBackend::new(&path, 3).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);

        let err = SqliteBackend::new(&path, 256).await.err().unwrap();
        assert!(matches!(err, MemoryError::DimensionMismatch { expected: 3, actual: 256 }));
    }
}

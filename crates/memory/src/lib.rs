//! Vector memory for taskloop.
//!
//! [`VectorMemory`] embeds content through an [`Embedder`](taskloop_core::Embedder),
//! persists it in a [`MemoryBackend`](taskloop_core::MemoryBackend) and answers
//! k-nearest queries by cosine similarity.

pub mod hashing;
pub mod in_memory;
pub mod store;
pub mod tokens;
pub mod vector;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use hashing::HashingEmbedder;
pub use in_memory::InMemoryBackend;
pub use store::VectorMemory;
pub use tokens::count_tokens;
pub use vector::{cosine_similarity, rank_nearest};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;

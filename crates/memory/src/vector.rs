//! Vector similarity and nearest-neighbour ranking.
//!
//! A flat scan: every record is scored, then a stable sort orders them by
//! descending similarity so equal scores keep insertion order.

use taskloop_core::memory::{MemoryRecord, ScoredMemory};

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if either vector is zero-length or empty.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Rank records by cosine similarity to `query`, returning at most `k`.
///
/// `records` must be in insertion order; ties keep that order.
pub fn rank_nearest<'a, I>(records: I, query: &[f32], k: usize) -> Vec<ScoredMemory>
where
    I: IntoIterator<Item = &'a MemoryRecord>,
{
    if k == 0 {
        return Vec::new();
    }

    let mut scored: Vec<(f32, &MemoryRecord)> = records
        .into_iter()
        .map(|record| (cosine_similarity(&record.embedding, query), record))
        .collect();

    // sort_by is stable
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.truncate(k);
    scored
        .into_iter()
        .map(|(similarity, record)| ScoredMemory {
            record: record.clone(),
            similarity,
        })
        .collect()
}

//! Brute-force vector index.
//!
//! Holds `id -> embedding` for live memories only. Top-k queries do a
//! linear cosine-similarity scan with a size-k min-heap, which is the
//! right trade-off for the documented operating envelope (tens of
//! thousands of vectors). Iteration is over a `BTreeMap`, so scoring
//! order, and therefore tie-breaking, is deterministic.

use engram_core::error::{EngramError, Result};
use engram_core::types::MemoryId;
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, BTreeMap};

/// Cosine similarity between two equal-length vectors.
///
/// Returns 0.0 when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Heap entry ordered by score, ties broken by id so identical runs
/// produce identical results.
#[derive(Debug, Clone, PartialEq)]
struct Scored {
    score: f32,
    id: MemoryId,
}

impl Eq for Scored {}

impl Ord for Scored {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .partial_cmp(&other.score)
            .unwrap_or(Ordering::Equal)
            // Higher-sorting entry on equal score: the later id, so the
            // min-heap evicts it first and earlier ids survive
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for Scored {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// In-memory vector index for one store.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dimension: usize,
    vectors: BTreeMap<MemoryId, Vec<f32>>,
}

impl VectorIndex {
    /// Empty index for vectors of `dimension` components.
    pub fn new(dimension: usize) -> Self {
        VectorIndex {
            dimension,
            vectors: BTreeMap::new(),
        }
    }

    /// The fixed embedding dimension.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of indexed vectors.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// True when nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Insert or replace the vector for `id`.
    pub fn upsert(&mut self, id: MemoryId, embedding: Vec<f32>) -> Result<()> {
        if embedding.len() != self.dimension {
            return Err(EngramError::invalid_arg(format!(
                "embedding dimension mismatch: expected {}, got {}",
                self.dimension,
                embedding.len()
            )));
        }
        self.vectors.insert(id, embedding);
        Ok(())
    }

    /// Drop the vector for `id`. True when one was indexed.
    pub fn remove(&mut self, id: &MemoryId) -> bool {
        self.vectors.remove(id).is_some()
    }

    /// Top-k by cosine similarity, highest first, ties by id
    /// ascending. Entries below `threshold` are cut.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        threshold: Option<f32>,
    ) -> Result<Vec<(MemoryId, f32)>> {
        if query.len() != self.dimension {
            return Err(EngramError::invalid_arg(format!(
                "query dimension mismatch: expected {}, got {}",
                self.dimension,
                query.len()
            )));
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut heap: BinaryHeap<Reverse<Scored>> = BinaryHeap::with_capacity(k + 1);
        for (id, embedding) in &self.vectors {
            let score = cosine_similarity(query, embedding);
            if let Some(threshold) = threshold {
                if score < threshold {
                    continue;
                }
            }
            heap.push(Reverse(Scored {
                score,
                id: id.clone(),
            }));
            if heap.len() > k {
                heap.pop();
            }
        }

        let mut results: Vec<(MemoryId, f32)> = heap
            .into_iter()
            .map(|Reverse(s)| (s.id, s.score))
            .collect();
        results.sort_by(|(id_a, score_a), (id_b, score_b)| {
            score_b
                .partial_cmp(score_a)
                .unwrap_or(Ordering::Equal)
                .then_with(|| id_a.cmp(id_b))
        });
        Ok(results)
    }
}

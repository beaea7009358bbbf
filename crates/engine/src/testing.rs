//! Deterministic test embedder.
//!
//! Search and fork tests need an embedder that is fast, dependency
//! free, and stable across runs. `BagOfWordsEmbedder` hashes tokens
//! into a fixed number of buckets and L2-normalizes, so cosine
//! similarity tracks token overlap: texts sharing words land close
//! together, which is exactly what ranking tests need to assert.
//!
//! Not a real embedding model; production callers inject their own
//! [`Embedder`].

use engram_core::embed::Embedder;
use engram_core::error::Result;
use engram_search::tokenize;
use std::hash::{Hash, Hasher};

/// Token-bucket embedder with a fixed dimension.
#[derive(Debug, Clone)]
pub struct BagOfWordsEmbedder {
    dimension: usize,
}

impl BagOfWordsEmbedder {
    /// Embedder producing vectors of `dimension` components.
    pub fn new(dimension: usize) -> Self {
        BagOfWordsEmbedder { dimension }
    }
}

impl Default for BagOfWordsEmbedder {
    fn default() -> Self {
        BagOfWordsEmbedder { dimension: 64 }
    }
}

impl Embedder for BagOfWordsEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in tokenize(text) {
            // DefaultHasher with fixed keys: stable across runs
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            token.hash(&mut hasher);
            let bucket = (hasher.finish() % self.dimension as u64) as usize;
            vector[bucket] += 1.0;
        }
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        Ok(vector)
    }
}

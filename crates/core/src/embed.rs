//! Embedding provider contract.
//!
//! Embedding generation is external to the engine: callers inject an
//! `Embedder` when opening the registry, and every store in the process
//! shares it. The reported dimension is fixed for the process lifetime;
//! the engine rejects any vector of a different length.

use crate::error::Result;

/// Produces a fixed-dimension real-valued vector from text.
///
/// Implementations must be thread-safe: the engine calls `embed` from
/// whichever thread is executing the write path.
pub trait Embedder: Send + Sync {
    /// The dimension of every vector this embedder produces.
    fn dimension(&self) -> usize;

    /// Embed a text. The returned vector must have exactly
    /// [`dimension`](Self::dimension) components.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Constant;

    impl Embedder for Constant {
        fn dimension(&self) -> usize {
            3
        }

        fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0, 0.0])
        }
    }

    #[test]
    fn test_trait_object_usable() {
        let embedder: Box<dyn Embedder> = Box::new(Constant);
        assert_eq!(embedder.dimension(), 3);
        assert_eq!(embedder.embed("anything").unwrap().len(), 3);
    }
}

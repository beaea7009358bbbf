//! Hybrid score fusion.
//!
//! Vector and text queries run independently, each producing a top-K
//! list. Fusion maps both onto `[0, 1]` and blends them:
//!
//! - cosine similarity ranges `[-1, 1]`; mapped via `(s + 1) / 2`
//! - BM25 is unbounded; normalized by the query's top text score
//!   (1.0 fallback when the text side is empty)
//! - `combined = alpha * vector + (1 - alpha) * text`
//!
//! A document matched by only one side keeps the other component at
//! zero, so a hybrid score is never below either normalized component
//! times its weight. Ordering is stable by `(-score, id)`.

use engram_core::types::MemoryId;
use std::collections::BTreeMap;

/// Default blend weight toward the vector side.
pub const DEFAULT_ALPHA: f32 = 0.7;

/// Map a cosine similarity from `[-1, 1]` to `[0, 1]`.
pub fn normalize_cosine(similarity: f32) -> f32 {
    ((similarity + 1.0) / 2.0).clamp(0.0, 1.0)
}

/// Fuse vector and text results into a top-k hybrid ranking.
///
/// `vector` carries raw cosine similarities; `text` carries raw BM25
/// scores. `alpha` is clamped to `[0, 1]`.
pub fn fuse(
    vector: &[(MemoryId, f32)],
    text: &[(MemoryId, f32)],
    alpha: f32,
    k: usize,
) -> Vec<(MemoryId, f32)> {
    let alpha = alpha.clamp(0.0, 1.0);

    let top_text = text
        .iter()
        .map(|(_, s)| *s)
        .fold(0.0f32, f32::max)
        .max(1.0);

    let mut combined: BTreeMap<MemoryId, f32> = BTreeMap::new();
    for (id, similarity) in vector {
        *combined.entry(id.clone()).or_insert(0.0) += alpha * normalize_cosine(*similarity);
    }
    for (id, score) in text {
        *combined.entry(id.clone()).or_insert(0.0) += (1.0 - alpha) * (score / top_text);
    }

    let mut ranked: Vec<(MemoryId, f32)> = combined.into_iter().collect();
    ranked.sort_by(|(id_a, score_a), (id_b, score_b)| {
        score_b
            .partial_cmp(score_a)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| id_a.cmp(id_b))
    });
    ranked.truncate(k);
    ranked
}

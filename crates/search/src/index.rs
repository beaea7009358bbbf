//! Field-aware inverted index with BM25 ranking.
//!
//! Postings map `token -> { doc -> per-field term frequencies }`. The
//! map is a `BTreeMap` so prefix queries (`token*`) are range scans and
//! iteration order is deterministic. Scoring is BM25 (k1 = 1.2,
//! b = 0.75) computed per field, combined by field-weighted summation;
//! results are ordered by `(-score, id)` so ties are stable.

use crate::field::{Field, FIELD_COUNT};
use crate::tokenizer::{parse_query, tokenize, QueryTerm};
use engram_core::types::MemoryId;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

/// Default BM25 term-saturation parameter.
pub const DEFAULT_K1: f32 = 1.2;

/// Default BM25 length-normalization parameter.
pub const DEFAULT_B: f32 = 0.75;

// ============================================================================
// IndexedDoc
// ============================================================================

/// The searchable view of one memory, as handed to the index.
#[derive(Debug, Clone, Default)]
pub struct IndexedDoc {
    /// Content text
    pub content: String,
    /// Category
    pub category: String,
    /// Memory type
    pub kind: String,
    /// Tags
    pub tags: Vec<String>,
    /// Optional context
    pub context: Option<String>,
}

impl IndexedDoc {
    fn field_texts(&self) -> Vec<(Field, &str)> {
        let mut out = vec![
            (Field::Content, self.content.as_str()),
            (Field::Category, self.category.as_str()),
            (Field::Kind, self.kind.as_str()),
        ];
        for tag in &self.tags {
            out.push((Field::Tag, tag.as_str()));
        }
        if let Some(context) = &self.context {
            out.push((Field::Context, context.as_str()));
        }
        out
    }
}

// ============================================================================
// Postings
// ============================================================================

/// Per-document stats inside one posting list.
#[derive(Debug, Clone, Copy, Default)]
struct PostingStats {
    /// Term frequency per field
    tf: [u32; FIELD_COUNT],
    /// Bitmask of fields the term occurs in
    mask: u8,
}

#[derive(Debug, Clone, Default)]
struct Postings {
    docs: BTreeMap<MemoryId, PostingStats>,
}

/// Per-document bookkeeping for removal and length normalization.
#[derive(Debug, Clone, Default)]
struct DocEntry {
    /// Token count per field
    lens: [u32; FIELD_COUNT],
    /// Distinct tokens of the document (for O(tokens) removal)
    tokens: BTreeSet<String>,
}

// ============================================================================
// TextIndex
// ============================================================================

/// In-memory inverted index over live memories.
#[derive(Debug, Clone)]
pub struct TextIndex {
    k1: f32,
    b: f32,
    postings: BTreeMap<String, Postings>,
    docs: BTreeMap<MemoryId, DocEntry>,
    /// Total token count per field, for average-length normalization
    field_totals: [u64; FIELD_COUNT],
}

impl Default for TextIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl TextIndex {
    /// Index with default BM25 parameters.
    pub fn new() -> Self {
        Self::with_params(DEFAULT_K1, DEFAULT_B)
    }

    /// Index with explicit BM25 parameters.
    pub fn with_params(k1: f32, b: f32) -> Self {
        TextIndex {
            k1,
            b,
            postings: BTreeMap::new(),
            docs: BTreeMap::new(),
            field_totals: [0; FIELD_COUNT],
        }
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// True when nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Index (or re-index) a document.
    pub fn insert(&mut self, id: MemoryId, doc: &IndexedDoc) {
        self.remove(&id);

        let mut entry = DocEntry::default();
        for (field, text) in doc.field_texts() {
            let f = field.index();
            for token in tokenize(text) {
                entry.lens[f] += 1;
                self.field_totals[f] += 1;
                let stats = self
                    .postings
                    .entry(token.clone())
                    .or_default()
                    .docs
                    .entry(id.clone())
                    .or_default();
                stats.tf[f] += 1;
                stats.mask |= field.mask();
                entry.tokens.insert(token);
            }
        }
        self.docs.insert(id, entry);
    }

    /// Drop a document. True when it was indexed.
    pub fn remove(&mut self, id: &MemoryId) -> bool {
        let Some(entry) = self.docs.remove(id) else {
            return false;
        };
        for (f, len) in entry.lens.iter().enumerate() {
            self.field_totals[f] -= *len as u64;
        }
        for token in entry.tokens {
            if let Entry::Occupied(mut postings) = self.postings.entry(token) {
                postings.get_mut().docs.remove(id);
                if postings.get().docs.is_empty() {
                    postings.remove();
                }
            }
        }
        true
    }

    /// Top-k BM25 search. Returns `(id, score)` ordered by
    /// `(-score, id)`; empty for an empty or all-punctuation query.
    pub fn search(&self, query: &str, k: usize) -> Vec<(MemoryId, f32)> {
        let terms = parse_query(query);
        if terms.is_empty() || self.docs.is_empty() || k == 0 {
            return Vec::new();
        }

        let mut scores: BTreeMap<MemoryId, f32> = BTreeMap::new();
        for term in &terms {
            self.score_term(term, &mut scores);
        }

        let mut ranked: Vec<(MemoryId, f32)> =
            scores.into_iter().filter(|(_, s)| *s > 0.0).collect();
        ranked.sort_by(|(id_a, score_a), (id_b, score_b)| {
            score_b
                .partial_cmp(score_a)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| id_a.cmp(id_b))
        });
        ranked.truncate(k);
        ranked
    }

    fn score_term(&self, term: &QueryTerm, scores: &mut BTreeMap<MemoryId, f32>) {
        // Resolve the posting lists the term matches. A prefix term
        // unions every token sharing the prefix.
        let matched: Vec<&Postings> = if term.prefix {
            self.postings
                .range(term.token.clone()..)
                .take_while(|(token, _)| token.starts_with(&term.token))
                .map(|(_, p)| p)
                .collect()
        } else {
            self.postings.get(&term.token).into_iter().collect()
        };
        if matched.is_empty() {
            return;
        }

        // Document frequency over the union of matched tokens
        let mut term_docs: BTreeSet<&MemoryId> = BTreeSet::new();
        for postings in &matched {
            term_docs.extend(postings.docs.keys());
        }
        let df = term_docs.len() as f32;
        let n = self.docs.len() as f32;
        let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();

        for postings in &matched {
            for (id, stats) in &postings.docs {
                let Some(doc) = self.docs.get(id) else {
                    continue;
                };
                let mut doc_score = 0.0;
                for field in Field::ALL {
                    let f = field.index();
                    let tf = stats.tf[f] as f32;
                    if tf == 0.0 {
                        continue;
                    }
                    let dl = doc.lens[f] as f32;
                    let avg = (self.field_totals[f] as f32 / n).max(1.0);
                    let saturation = (tf * (self.k1 + 1.0))
                        / (tf + self.k1 * (1.0 - self.b + self.b * dl / avg));
                    doc_score += field.weight() * idf * saturation;
                }
                *scores.entry(id.clone()).or_insert(0.0) += doc_score;
            }
        }
    }
}

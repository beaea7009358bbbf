//! # engram-search
//!
//! Text retrieval for the Engram memory store: tokenizer, field-aware
//! inverted index with BM25 ranking, and hybrid score fusion for
//! combining text and vector results.
//!
//! The index holds live memories only; the engine feeds it documents
//! as mutations commit and rebuilds it from the latest-version index
//! on demand.

pub mod field;
pub mod hybrid;
pub mod index;
pub mod tokenizer;

pub use field::Field;
pub use hybrid::{fuse, normalize_cosine, DEFAULT_ALPHA};
pub use index::{IndexedDoc, TextIndex};
pub use tokenizer::{parse_query, tokenize, QueryTerm};

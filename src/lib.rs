//! # Engram
//!
//! A versioned, content-addressed, forkable memory store for
//! long-lived assistant context.
//!
//! Memories and their typed relationships live in an append-only,
//! hash-chained write-ahead log; an incremental Merkle tree anchors
//! the full history, so any store can be verified, snapshotted, and
//! forked, at the current head or at a past timestamp (PITR). Each
//! logical store ("main" and its forks) shares an immutable history
//! prefix with its source and evolves independently.
//!
//! # Quick Start
//!
//! ```no_run
//! use engram::{Engram, MemoryDraft};
//! use engram::testing::BagOfWordsEmbedder;
//! use std::sync::Arc;
//!
//! fn main() -> engram::Result<()> {
//!     let engram = Engram::open("./my-data", Arc::new(BagOfWordsEmbedder::default()))?;
//!     let main = Engram::main();
//!
//!     // Store a memory
//!     let memory = engram.add_memory(
//!         &main,
//!         MemoryDraft::new("preferences", "fact", "prefers dark roast coffee"),
//!     )?;
//!
//!     // Retrieve it by id, by text, or by meaning
//!     assert!(engram.get_memory(&main, &memory.id)?.is_some());
//!     let hits = engram.search_memories(&main, "coffee", "hybrid", None, None)?;
//!     assert!(!hits.is_empty());
//!
//!     // Fork the store and diverge without touching main
//!     let fork = engram.create_fork(&main, Some("experiment".into()), None)?;
//!     engram.delete_memory(&fork.store_id, &memory.id)?;
//!     assert!(engram.get_memory(&main, &memory.id)?.is_some());
//!
//!     // Verify the hash chain and Merkle root end to end
//!     assert!(engram.verify_integrity(&main)?.valid);
//!     Ok(())
//! }
//! ```
//!
//! # Surfaces
//!
//! | Concern | Entry points |
//! |---------|--------------|
//! | Memory CRUD | `add_memory`, `get_memory`, `update_memory`, `delete_memory`, `list_memories` |
//! | Retrieval | `search_memories` (semantic / text / hybrid), `memories_due` |
//! | Relationships | `add_relationship`, `get_relationships`, `get_related_memories` |
//! | Forks & PITR | `create_fork`, `create_fork_at_time`, `list_forks`, `delete_fork` |
//! | Snapshots | `create_snapshot`, `list_snapshots`, `restore_snapshot` |
//! | Integrity | `verify_integrity`, `rebuild_indexes`, `get_stats` |
//!
//! The [`Engram`] struct is the embeddable entry point; transports
//! (tool-call servers, REST) are thin mappings over it and live
//! outside this repository. Embedding generation is injected via the
//! [`Embedder`] trait and fixed for the process lifetime.

pub use engram_core::{
    Cadence, Embedder, EngramError, Hash256, Importance, Memory, MemoryId, RelationKind,
    Relationship, RelationshipId, Result, SnapshotId, StoreId, Timestamp,
};
pub use engram_engine::{
    CadenceSpec, Engram, IntegrityReport, ListFilter, MemoryDraft, MemoryPatch, MemoryRecord,
    Neighborhood, Registry, SearchHit, SearchMode, SearchRequest, StoreDescriptor, StoreStats,
};

/// Deterministic embedder for tests and examples.
pub mod testing {
    pub use engram_engine::testing::BagOfWordsEmbedder;
}

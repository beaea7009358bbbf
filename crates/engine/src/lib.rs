//! # engram-engine
//!
//! The storage and indexing engine of the Engram memory store: the
//! latest-version index, the vector index, the `Store` that binds one
//! logical store's log and indexes, the `Registry` that owns every
//! store and the fork graph, and the embeddable `Engram` facade.
//!
//! Writes within a store are serialized through one mutex and become
//! visible only after the WAL append succeeds; reads never observe a
//! partially applied mutation. Forks share an immutable history prefix
//! with their source and evolve independently from the cut.

pub mod api;
pub mod integrity;
pub mod latest;
pub mod registry;
pub mod store;
pub mod testing;
pub mod vector;

pub use api::{CadenceSpec, Engram, MemoryDraft, MemoryPatch};
pub use integrity::IntegrityReport;
pub use latest::{LatestIndex, MemoryEntry, RelationshipEntry};
pub use registry::{Registry, StoreDescriptor};
pub use store::{
    ListFilter, MemoryRecord, Neighborhood, SearchHit, SearchMode, SearchRequest, Store,
    StoreStats,
};
pub use vector::VectorIndex;

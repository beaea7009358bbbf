//! # engram-core
//!
//! Shared contracts for the Engram memory store: identifiers, record
//! types, the canonical byte encoding, SHA-256 content/chain hashing,
//! the incremental Merkle tree, cadence rules, and the embedder trait.
//!
//! Everything above this crate (durability, search, engine) speaks in
//! these types. Nothing here touches the filesystem.

pub mod cadence;
pub mod canonical;
pub mod embed;
pub mod error;
pub mod hash;
pub mod merkle;
pub mod record;
pub mod types;

pub use cadence::Cadence;
pub use embed::Embedder;
pub use error::{EngramError, Result};
pub use hash::Hash256;
pub use merkle::MerkleTree;
pub use record::{Memory, RecordKind, RecordPayload, Relationship, SnapshotMarker, WalRecord};
pub use types::{
    Importance, MemoryId, RelationKind, RelationshipId, SnapshotId, StoreId, Timestamp,
};

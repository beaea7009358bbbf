//! Entity records and the write-ahead log record that carries them.
//!
//! Every mutation in a store is an appended `WalRecord` holding a full
//! `Memory` or `Relationship` version (or a snapshot marker). Records
//! are content-addressed: the `content_hash` covers the canonical
//! encoding of the header and payload, and `prev_hash` chains each
//! record to its predecessor.
//!
//! `last_accessed` is deliberately absent from these types: recording a
//! read must not change a record's content hash, so access times live
//! in a mutable side table owned by the durability layer.

use crate::cadence::Cadence;
use crate::hash::Hash256;
use crate::types::{
    Importance, MemoryId, RelationKind, RelationshipId, SnapshotId, StoreId, Timestamp,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ============================================================================
// Memory
// ============================================================================

/// One version of a memory.
///
/// Versions start at 1 and advance by exactly 1 on every mutation within
/// a store. The embedding is computed at write time from the content and
/// is part of the canonical payload, so index rebuilds never re-embed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    /// Stable identity, unique across all stores
    pub id: MemoryId,
    /// Version within the owning store, starting at 1
    pub version: u64,
    /// Grouping category, e.g. "preferences"
    pub category: String,
    /// Memory type, e.g. "fact" or "decision"
    pub kind: String,
    /// The remembered text
    pub content: String,
    /// Tag set (sorted, deduplicated)
    pub tags: BTreeSet<String>,
    /// Importance 1..=10
    pub importance: Importance,
    /// Optional review cadence
    pub cadence: Option<Cadence>,
    /// Optional free-form context
    pub context: Option<String>,
    /// Embedding of `content`, fixed process-wide dimension
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub embedding: Option<Vec<f32>>,
    /// Creation time of version 1
    pub created_at: Timestamp,
    /// Time this version was written
    pub updated_at: Timestamp,
    /// Soft-archive flag (distinct from tombstoning)
    pub archived: bool,
}

// ============================================================================
// Relationship
// ============================================================================

/// A typed, directed edge between two memories.
///
/// At most one live relationship exists per ordered `(from, to)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    /// Stable identity, unique across all stores
    pub id: RelationshipId,
    /// Version within the owning store, starting at 1
    pub version: u64,
    /// Source memory
    pub from: MemoryId,
    /// Target memory
    pub to: MemoryId,
    /// Edge type
    pub kind: RelationKind,
    /// Creation time of version 1
    pub created_at: Timestamp,
}

// ============================================================================
// Snapshot marker
// ============================================================================

/// Lightweight record appended when a snapshot is captured, anchoring
/// the capture point in the log itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMarker {
    /// Identity of the captured snapshot
    pub snapshot_id: SnapshotId,
    /// Snapshot name (duplicates allowed; ids are unique)
    pub name: String,
}

// ============================================================================
// WAL record
// ============================================================================

/// Record kind discriminant, as written on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    /// Memory version
    Memory = 1,
    /// Relationship version
    Relationship = 2,
    /// Snapshot capture marker
    SnapshotMarker = 3,
}

impl RecordKind {
    /// Wire byte of the kind.
    pub fn as_byte(&self) -> u8 {
        *self as u8
    }

    /// Parse a wire byte.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(RecordKind::Memory),
            2 => Some(RecordKind::Relationship),
            3 => Some(RecordKind::SnapshotMarker),
            _ => None,
        }
    }
}

/// Payload of a WAL record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecordPayload {
    /// A full memory version
    Memory(Memory),
    /// A full relationship version
    Relationship(Relationship),
    /// A snapshot capture marker
    SnapshotMarker(SnapshotMarker),
}

impl RecordPayload {
    /// Kind discriminant of this payload.
    pub fn kind(&self) -> RecordKind {
        match self {
            RecordPayload::Memory(_) => RecordKind::Memory,
            RecordPayload::Relationship(_) => RecordKind::Relationship,
            RecordPayload::SnapshotMarker(_) => RecordKind::SnapshotMarker,
        }
    }

    /// Entity identity carried by this payload.
    pub fn entity_id(&self) -> &str {
        match self {
            RecordPayload::Memory(m) => m.id.as_str(),
            RecordPayload::Relationship(r) => r.id.as_str(),
            RecordPayload::SnapshotMarker(s) => s.snapshot_id.as_str(),
        }
    }

    /// Entity version carried by this payload (1 for markers).
    pub fn version(&self) -> u64 {
        match self {
            RecordPayload::Memory(m) => m.version,
            RecordPayload::Relationship(r) => r.version,
            RecordPayload::SnapshotMarker(_) => 1,
        }
    }
}

/// One record of a store's write-ahead log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalRecord {
    /// Monotonic log sequence within the store, starting at 1
    pub seq: u64,
    /// Wall-clock time the record was prepared
    pub timestamp: Timestamp,
    /// Store the record was written in
    pub store_id: StoreId,
    /// Content hash of the preceding record (`Hash256::ZERO` at genesis)
    pub prev_hash: Hash256,
    /// SHA-256 over the canonical header + payload (excluding `prev_hash`)
    pub content_hash: Hash256,
    /// Tombstone flag
    pub deleted: bool,
    /// The record body
    pub payload: RecordPayload,
}

impl WalRecord {
    /// Kind discriminant of this record.
    pub fn kind(&self) -> RecordKind {
        self.payload.kind()
    }

    /// Entity identity carried by this record.
    pub fn entity_id(&self) -> &str {
        self.payload.entity_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_memory() -> Memory {
        Memory {
            id: MemoryId::from_string("m-1"),
            version: 1,
            category: "notes".into(),
            kind: "fact".into(),
            content: "water boils at 100C".into(),
            tags: ["physics".to_string()].into_iter().collect(),
            importance: Importance::default(),
            cadence: None,
            context: None,
            embedding: None,
            created_at: Timestamp::from_millis(1),
            updated_at: Timestamp::from_millis(1),
            archived: false,
        }
    }

    #[test]
    fn test_record_kind_bytes() {
        assert_eq!(RecordKind::Memory.as_byte(), 1);
        assert_eq!(RecordKind::Relationship.as_byte(), 2);
        assert_eq!(RecordKind::SnapshotMarker.as_byte(), 3);
        for b in 1..=3u8 {
            assert_eq!(RecordKind::from_byte(b).unwrap().as_byte(), b);
        }
        assert!(RecordKind::from_byte(0).is_none());
        assert!(RecordKind::from_byte(4).is_none());
    }

    #[test]
    fn test_payload_accessors() {
        let payload = RecordPayload::Memory(sample_memory());
        assert_eq!(payload.kind(), RecordKind::Memory);
        assert_eq!(payload.entity_id(), "m-1");
        assert_eq!(payload.version(), 1);
    }

    #[test]
    fn test_marker_payload() {
        let payload = RecordPayload::SnapshotMarker(SnapshotMarker {
            snapshot_id: SnapshotId::from_string("s-1"),
            name: "pre".into(),
        });
        assert_eq!(payload.kind(), RecordKind::SnapshotMarker);
        assert_eq!(payload.entity_id(), "s-1");
        assert_eq!(payload.version(), 1);
    }
}

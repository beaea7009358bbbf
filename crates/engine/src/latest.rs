//! Latest-version index.
//!
//! In-memory projection of a store's log: exactly one entry per entity
//! id holding its most recent version. Rebuilt by replaying the log;
//! every record either initializes an entry, advances its version by
//! exactly one, or tombstones it; anything else is an integrity
//! violation and stops the replay.
//!
//! Alongside the primary map the index maintains the secondary
//! structures the read path needs: by-category and by-kind lists for
//! filtered listing, per-memory adjacency for relationships, the live
//! `(from, to)` pair set for duplicate detection, and the insertion
//! order for deterministic pagination.

use engram_core::error::{EngramError, Result};
use engram_core::hash::Hash256;
use engram_core::record::{Memory, RecordPayload, Relationship, WalRecord};
use engram_core::types::{MemoryId, RelationshipId};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Latest state of one memory id.
#[derive(Debug, Clone)]
pub struct MemoryEntry {
    /// The current version's full payload
    pub memory: Memory,
    /// Log sequence that wrote this version
    pub seq: u64,
    /// Content hash of this version
    pub content_hash: Hash256,
    /// Tombstone flag
    pub deleted: bool,
}

/// Latest state of one relationship id.
#[derive(Debug, Clone)]
pub struct RelationshipEntry {
    /// The current version's full payload
    pub relationship: Relationship,
    /// Log sequence that wrote this version
    pub seq: u64,
    /// Tombstone flag
    pub deleted: bool,
}

/// The per-store latest-version index.
#[derive(Debug, Clone, Default)]
pub struct LatestIndex {
    memories: HashMap<MemoryId, MemoryEntry>,
    relationships: HashMap<RelationshipId, RelationshipEntry>,
    /// Live memory ids per category
    by_category: HashMap<String, BTreeSet<MemoryId>>,
    /// Live memory ids per memory type
    by_kind: HashMap<String, BTreeSet<MemoryId>>,
    /// Live relationship ids by source memory
    outgoing: HashMap<MemoryId, Vec<RelationshipId>>,
    /// Live relationship ids by target memory
    incoming: HashMap<MemoryId, Vec<RelationshipId>>,
    /// Live ordered pairs, for duplicate rejection
    live_pairs: HashSet<(MemoryId, MemoryId)>,
    /// Memory ids in first-write order
    insertion_order: Vec<MemoryId>,
}

impl LatestIndex {
    /// Empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one log record.
    pub fn apply(&mut self, record: &WalRecord) -> Result<()> {
        match &record.payload {
            RecordPayload::Memory(memory) => self.apply_memory(record, memory),
            RecordPayload::Relationship(rel) => self.apply_relationship(record, rel),
            RecordPayload::SnapshotMarker(_) => Ok(()),
        }
    }

    fn apply_memory(&mut self, record: &WalRecord, memory: &Memory) -> Result<()> {
        match self.memories.get(&memory.id) {
            None => {
                if memory.version != 1 {
                    return Err(EngramError::integrity(format!(
                        "memory {} first appears at version {}",
                        memory.id, memory.version
                    )));
                }
                self.insertion_order.push(memory.id.clone());
            }
            Some(prev) => {
                if memory.version != prev.memory.version + 1 {
                    return Err(EngramError::integrity(format!(
                        "memory {} version jump: {} -> {}",
                        memory.id, prev.memory.version, memory.version
                    )));
                }
                if !prev.deleted {
                    unlist(&mut self.by_category, &prev.memory.category, &memory.id);
                    unlist(&mut self.by_kind, &prev.memory.kind, &memory.id);
                }
            }
        }

        if !record.deleted {
            self.by_category
                .entry(memory.category.clone())
                .or_default()
                .insert(memory.id.clone());
            self.by_kind
                .entry(memory.kind.clone())
                .or_default()
                .insert(memory.id.clone());
        }

        self.memories.insert(
            memory.id.clone(),
            MemoryEntry {
                memory: memory.clone(),
                seq: record.seq,
                content_hash: record.content_hash,
                deleted: record.deleted,
            },
        );
        Ok(())
    }

    fn apply_relationship(&mut self, record: &WalRecord, rel: &Relationship) -> Result<()> {
        let prev_entry = self
            .relationships
            .get(&rel.id)
            .map(|prev| (prev.relationship.clone(), prev.deleted));
        match prev_entry {
            None => {
                if rel.version != 1 {
                    return Err(EngramError::integrity(format!(
                        "relationship {} first appears at version {}",
                        rel.id, rel.version
                    )));
                }
            }
            Some((prev_relationship, prev_deleted)) => {
                if rel.version != prev_relationship.version + 1 {
                    return Err(EngramError::integrity(format!(
                        "relationship {} version jump: {} -> {}",
                        rel.id, prev_relationship.version, rel.version
                    )));
                }
                if !prev_deleted {
                    self.unlink(&prev_relationship);
                }
            }
        }

        if !record.deleted {
            self.outgoing
                .entry(rel.from.clone())
                .or_default()
                .push(rel.id.clone());
            self.incoming
                .entry(rel.to.clone())
                .or_default()
                .push(rel.id.clone());
            self.live_pairs.insert((rel.from.clone(), rel.to.clone()));
        }

        self.relationships.insert(
            rel.id.clone(),
            RelationshipEntry {
                relationship: rel.clone(),
                seq: record.seq,
                deleted: record.deleted,
            },
        );
        Ok(())
    }

    fn unlink(&mut self, rel: &Relationship) {
        if let Some(list) = self.outgoing.get_mut(&rel.from) {
            list.retain(|id| id != &rel.id);
        }
        if let Some(list) = self.incoming.get_mut(&rel.to) {
            list.retain(|id| id != &rel.id);
        }
        self.live_pairs.remove(&(rel.from.clone(), rel.to.clone()));
    }

    // ========================================================================
    // Memory reads
    // ========================================================================

    /// Live entry for `id`, if any.
    pub fn get(&self, id: &MemoryId) -> Option<&MemoryEntry> {
        self.memories.get(id).filter(|e| !e.deleted)
    }

    /// Entry for `id` including tombstoned state.
    pub fn get_including_deleted(&self, id: &MemoryId) -> Option<&MemoryEntry> {
        self.memories.get(id)
    }

    /// Live entries in insertion order.
    pub fn iterate_live(&self) -> impl Iterator<Item = &MemoryEntry> {
        self.insertion_order
            .iter()
            .filter_map(|id| self.memories.get(id))
            .filter(|e| !e.deleted)
    }

    /// All entries (tombstoned included) in insertion order.
    pub fn iterate_including_deleted(&self) -> impl Iterator<Item = &MemoryEntry> {
        self.insertion_order
            .iter()
            .filter_map(|id| self.memories.get(id))
    }

    /// Live memory count.
    pub fn count_live(&self) -> usize {
        self.iterate_live().count()
    }

    /// Total memory ids ever written (tombstoned included).
    pub fn count_including_deleted(&self) -> usize {
        self.memories.len()
    }

    /// Version the next write for `id` must carry.
    pub fn next_version_for(&self, id: &MemoryId) -> u64 {
        self.memories
            .get(id)
            .map(|e| e.memory.version + 1)
            .unwrap_or(1)
    }

    /// Live ids in `category`, if any.
    pub fn ids_in_category(&self, category: &str) -> Option<&BTreeSet<MemoryId>> {
        self.by_category.get(category)
    }

    /// Live ids of memory type `kind`, if any.
    pub fn ids_of_kind(&self, kind: &str) -> Option<&BTreeSet<MemoryId>> {
        self.by_kind.get(kind)
    }

    // ========================================================================
    // Relationship reads
    // ========================================================================

    /// Live relationship entry by id.
    pub fn relationship(&self, id: &RelationshipId) -> Option<&RelationshipEntry> {
        self.relationships.get(id).filter(|e| !e.deleted)
    }

    /// Next version for a relationship id.
    pub fn next_relationship_version(&self, id: &RelationshipId) -> u64 {
        self.relationships
            .get(id)
            .map(|e| e.relationship.version + 1)
            .unwrap_or(1)
    }

    /// True when a live relationship already links `(from, to)`.
    pub fn has_live_pair(&self, from: &MemoryId, to: &MemoryId) -> bool {
        self.live_pairs.contains(&(from.clone(), to.clone()))
    }

    /// Live outgoing relationships of `id`.
    pub fn outgoing(&self, id: &MemoryId) -> Vec<&Relationship> {
        self.neighbors(&self.outgoing, id)
    }

    /// Live incoming relationships of `id`.
    pub fn incoming(&self, id: &MemoryId) -> Vec<&Relationship> {
        self.neighbors(&self.incoming, id)
    }

    fn neighbors<'a>(
        &'a self,
        map: &'a HashMap<MemoryId, Vec<RelationshipId>>,
        id: &MemoryId,
    ) -> Vec<&'a Relationship> {
        map.get(id)
            .into_iter()
            .flatten()
            .filter_map(|rid| self.relationship(rid))
            .map(|e| &e.relationship)
            .collect()
    }

    /// Live relationship count.
    pub fn count_relationships(&self) -> usize {
        self.relationships.values().filter(|e| !e.deleted).count()
    }
}

fn unlist(map: &mut HashMap<String, BTreeSet<MemoryId>>, key: &str, id: &MemoryId) {
    if let Some(set) = map.get_mut(key) {
        set.remove(id);
        if set.is_empty() {
            map.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engram_core::canonical;
    use engram_core::types::{Importance, RelationKind, StoreId, Timestamp};

    fn memory_record(
        seq: u64,
        id: &str,
        version: u64,
        category: &str,
        deleted: bool,
    ) -> WalRecord {
        let memory = Memory {
            id: MemoryId::from_string(id),
            version,
            category: category.into(),
            kind: "fact".into(),
            content: format!("content v{}", version),
            tags: Default::default(),
            importance: Importance::default(),
            cadence: None,
            context: None,
            embedding: None,
            created_at: Timestamp::from_millis(1),
            updated_at: Timestamp::from_millis(seq),
            archived: false,
        };
        let payload = RecordPayload::Memory(memory);
        let store = StoreId::main();
        let content_hash =
            canonical::content_hash(&payload, &store, Timestamp::from_millis(seq), deleted);
        WalRecord {
            seq,
            timestamp: Timestamp::from_millis(seq),
            store_id: store,
            prev_hash: Hash256::ZERO,
            content_hash,
            deleted,
            payload,
        }
    }

    fn relationship_record(
        seq: u64,
        id: &str,
        version: u64,
        from: &str,
        to: &str,
        deleted: bool,
    ) -> WalRecord {
        let rel = Relationship {
            id: RelationshipId::from_string(id),
            version,
            from: MemoryId::from_string(from),
            to: MemoryId::from_string(to),
            kind: RelationKind::RelatedTo,
            created_at: Timestamp::from_millis(1),
        };
        let payload = RecordPayload::Relationship(rel);
        let store = StoreId::main();
        let content_hash =
            canonical::content_hash(&payload, &store, Timestamp::from_millis(seq), deleted);
        WalRecord {
            seq,
            timestamp: Timestamp::from_millis(seq),
            store_id: store,
            prev_hash: Hash256::ZERO,
            content_hash,
            deleted,
            payload,
        }
    }

    #[test]
    fn test_insert_and_get() {
        let mut index = LatestIndex::new();
        index.apply(&memory_record(1, "m-1", 1, "notes", false)).unwrap();

        let entry = index.get(&MemoryId::from_string("m-1")).unwrap();
        assert_eq!(entry.memory.version, 1);
        assert_eq!(index.next_version_for(&MemoryId::from_string("m-1")), 2);
        assert_eq!(index.next_version_for(&MemoryId::from_string("m-2")), 1);
    }

    #[test]
    fn test_version_must_start_at_one() {
        let mut index = LatestIndex::new();
        let err = index
            .apply(&memory_record(1, "m-1", 2, "notes", false))
            .unwrap_err();
        assert!(err.is_integrity());
    }

    #[test]
    fn test_version_must_advance_by_one() {
        let mut index = LatestIndex::new();
        index.apply(&memory_record(1, "m-1", 1, "notes", false)).unwrap();
        let err = index
            .apply(&memory_record(2, "m-1", 3, "notes", false))
            .unwrap_err();
        assert!(err.is_integrity());
    }

    #[test]
    fn test_tombstone_hides_from_live_reads() {
        let mut index = LatestIndex::new();
        let id = MemoryId::from_string("m-1");
        index.apply(&memory_record(1, "m-1", 1, "notes", false)).unwrap();
        index.apply(&memory_record(2, "m-1", 2, "notes", true)).unwrap();

        assert!(index.get(&id).is_none());
        let entry = index.get_including_deleted(&id).unwrap();
        assert!(entry.deleted);
        assert_eq!(index.count_live(), 0);
        assert_eq!(index.count_including_deleted(), 1);
        // A tombstoned id still versions forward
        assert_eq!(index.next_version_for(&id), 3);
    }

    #[test]
    fn test_category_list_follows_updates() {
        let mut index = LatestIndex::new();
        index.apply(&memory_record(1, "m-1", 1, "work", false)).unwrap();
        assert!(index.ids_in_category("work").is_some());

        // Move to another category
        index.apply(&memory_record(2, "m-1", 2, "home", false)).unwrap();
        assert!(index.ids_in_category("work").is_none());
        assert_eq!(index.ids_in_category("home").unwrap().len(), 1);

        // Tombstone clears the lists
        index.apply(&memory_record(3, "m-1", 3, "home", true)).unwrap();
        assert!(index.ids_in_category("home").is_none());
    }

    #[test]
    fn test_insertion_order_is_stable() {
        let mut index = LatestIndex::new();
        index.apply(&memory_record(1, "m-b", 1, "c", false)).unwrap();
        index.apply(&memory_record(2, "m-a", 1, "c", false)).unwrap();
        index.apply(&memory_record(3, "m-b", 2, "c", false)).unwrap();

        let order: Vec<&str> = index
            .iterate_live()
            .map(|e| e.memory.id.as_str())
            .collect();
        assert_eq!(order, vec!["m-b", "m-a"]);
    }

    #[test]
    fn test_relationship_adjacency() {
        let mut index = LatestIndex::new();
        index.apply(&memory_record(1, "m-a", 1, "c", false)).unwrap();
        index.apply(&memory_record(2, "m-b", 1, "c", false)).unwrap();
        index
            .apply(&relationship_record(3, "r-1", 1, "m-a", "m-b", false))
            .unwrap();

        let a = MemoryId::from_string("m-a");
        let b = MemoryId::from_string("m-b");
        assert_eq!(index.outgoing(&a).len(), 1);
        assert_eq!(index.incoming(&b).len(), 1);
        assert!(index.outgoing(&b).is_empty());
        assert!(index.has_live_pair(&a, &b));
        assert!(!index.has_live_pair(&b, &a));
        assert_eq!(index.count_relationships(), 1);
    }

    #[test]
    fn test_relationship_tombstone_unlinks() {
        let mut index = LatestIndex::new();
        index
            .apply(&relationship_record(1, "r-1", 1, "m-a", "m-b", false))
            .unwrap();
        index
            .apply(&relationship_record(2, "r-1", 2, "m-a", "m-b", true))
            .unwrap();

        let a = MemoryId::from_string("m-a");
        let b = MemoryId::from_string("m-b");
        assert!(index.outgoing(&a).is_empty());
        assert!(!index.has_live_pair(&a, &b));
        assert_eq!(index.count_relationships(), 0);
    }

    #[test]
    fn test_snapshot_marker_is_inert() {
        use engram_core::record::SnapshotMarker;
        use engram_core::types::SnapshotId;

        let mut index = LatestIndex::new();
        let payload = RecordPayload::SnapshotMarker(SnapshotMarker {
            snapshot_id: SnapshotId::from_string("s-1"),
            name: "pre".into(),
        });
        let store = StoreId::main();
        let content_hash =
            canonical::content_hash(&payload, &store, Timestamp::from_millis(1), false);
        index
            .apply(&WalRecord {
                seq: 1,
                timestamp: Timestamp::from_millis(1),
                store_id: store,
                prev_hash: Hash256::ZERO,
                content_hash,
                deleted: false,
                payload,
            })
            .unwrap();
        assert_eq!(index.count_including_deleted(), 0);
    }
}

//! Snapshot catalog.
//!
//! A snapshot is an O(1) capture of a store's visible history: its
//! Merkle root and log sequence at capture time. Restoring one forks
//! the owning store at that sequence; the catalog itself never holds
//! record data.

use crate::manifest::write_atomic;
use engram_core::error::Result;
use engram_core::hash::Hash256;
use engram_core::types::{SnapshotId, StoreId, Timestamp};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One captured snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// Unique snapshot id
    pub id: SnapshotId,
    /// Caller-chosen name; duplicates allowed (ids stay unique)
    pub name: String,
    /// Store the snapshot was captured in
    pub store_id: StoreId,
    /// Merkle root at capture time
    pub merkle_root: Hash256,
    /// Log sequence at capture time
    pub sequence: u64,
    /// Capture time (milliseconds)
    pub created_at_ms: u64,
}

/// Per-store snapshot catalog (`snapshots.json`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotCatalog {
    /// Snapshots in capture order
    pub snapshots: Vec<SnapshotEntry>,
}

impl SnapshotCatalog {
    /// Load from `path`; a missing file is an empty catalog.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(SnapshotCatalog::default());
        }
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Persist to `path` atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        write_atomic(path, &serde_json::to_vec_pretty(self)?)
    }

    /// Record a capture.
    pub fn add(&mut self, entry: SnapshotEntry) {
        self.snapshots.push(entry);
    }

    /// Look up by id.
    pub fn get(&self, id: &SnapshotId) -> Option<&SnapshotEntry> {
        self.snapshots.iter().find(|s| &s.id == id)
    }

    /// Remove by id; true when something was removed.
    pub fn remove(&mut self, id: &SnapshotId) -> bool {
        let before = self.snapshots.len();
        self.snapshots.retain(|s| &s.id != id);
        self.snapshots.len() != before
    }
}

/// Build a catalog entry for a capture happening now.
pub fn capture(
    store_id: &StoreId,
    name: impl Into<String>,
    merkle_root: Hash256,
    sequence: u64,
    at: Timestamp,
) -> SnapshotEntry {
    SnapshotEntry {
        id: SnapshotId::new(),
        name: name.into(),
        store_id: store_id.clone(),
        merkle_root,
        sequence,
        created_at_ms: at.as_millis(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engram_core::hash::sha256;

    fn entry(name: &str, seq: u64) -> SnapshotEntry {
        capture(
            &StoreId::main(),
            name,
            sha256(name.as_bytes()),
            seq,
            Timestamp::from_millis(seq),
        )
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshots.json");

        let mut catalog = SnapshotCatalog::default();
        catalog.add(entry("pre", 3));
        catalog.add(entry("post", 9));
        catalog.save(&path).unwrap();

        let loaded = SnapshotCatalog::load(&path).unwrap();
        assert_eq!(loaded, catalog);
    }

    #[test]
    fn test_duplicate_names_get_distinct_ids() {
        let a = entry("same", 1);
        let b = entry("same", 2);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_get_and_remove() {
        let mut catalog = SnapshotCatalog::default();
        let e = entry("pre", 1);
        let id = e.id.clone();
        catalog.add(e);

        assert!(catalog.get(&id).is_some());
        assert!(catalog.remove(&id));
        assert!(catalog.get(&id).is_none());
        assert!(!catalog.remove(&id));
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = SnapshotCatalog::load(&dir.path().join("none.json")).unwrap();
        assert!(loaded.snapshots.is_empty());
    }
}

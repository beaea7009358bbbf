//! Last-accessed side table.
//!
//! Recording a read must not change a record's content hash, or every
//! `get` would invalidate the Merkle root. Access times therefore live
//! in this mutable JSON table, loaded on open and excluded from
//! integrity verification. Updates are best-effort: losing the table
//! loses only review-cadence freshness, never memory data.

use crate::manifest::write_atomic;
use engram_core::error::Result;
use engram_core::types::{MemoryId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Mutable `memory id -> last accessed` table (`access.json`).
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AccessTable {
    #[serde(default)]
    entries: HashMap<String, u64>,
    #[serde(skip)]
    path: Option<PathBuf>,
}

impl AccessTable {
    /// Load from `path`; a missing file is an empty table.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut table = if path.exists() {
            let bytes = std::fs::read(&path)?;
            serde_json::from_slice::<AccessTable>(&bytes)?
        } else {
            AccessTable::default()
        };
        table.path = Some(path);
        Ok(table)
    }

    /// Last recorded access for `id`.
    pub fn get(&self, id: &MemoryId) -> Option<Timestamp> {
        self.entries
            .get(id.as_str())
            .map(|&ms| Timestamp::from_millis(ms))
    }

    /// Record an access and persist the table.
    pub fn touch(&mut self, id: &MemoryId, at: Timestamp) -> Result<()> {
        self.entries.insert(id.as_str().to_string(), at.as_millis());
        self.persist()
    }

    /// Drop a tombstoned memory's entry and persist.
    pub fn forget(&mut self, id: &MemoryId) -> Result<()> {
        if self.entries.remove(id.as_str()).is_some() {
            self.persist()?;
        }
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        if let Some(path) = &self.path {
            write_atomic(path, &serde_json::to_vec_pretty(self)?)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touch_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.json");
        let id = MemoryId::from_string("m-1");

        let mut table = AccessTable::load(&path).unwrap();
        assert!(table.get(&id).is_none());
        table.touch(&id, Timestamp::from_millis(123)).unwrap();

        let reloaded = AccessTable::load(&path).unwrap();
        assert_eq!(reloaded.get(&id), Some(Timestamp::from_millis(123)));
    }

    #[test]
    fn test_touch_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.json");
        let id = MemoryId::from_string("m-1");

        let mut table = AccessTable::load(&path).unwrap();
        table.touch(&id, Timestamp::from_millis(1)).unwrap();
        table.touch(&id, Timestamp::from_millis(2)).unwrap();
        assert_eq!(table.get(&id), Some(Timestamp::from_millis(2)));
    }

    #[test]
    fn test_forget() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.json");
        let id = MemoryId::from_string("m-1");

        let mut table = AccessTable::load(&path).unwrap();
        table.touch(&id, Timestamp::from_millis(1)).unwrap();
        table.forget(&id).unwrap();
        assert!(table.get(&id).is_none());

        let reloaded = AccessTable::load(&path).unwrap();
        assert!(reloaded.get(&id).is_none());
    }
}

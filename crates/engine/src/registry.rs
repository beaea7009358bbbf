//! The store registry: every store, the fork graph, and snapshots.
//!
//! One `Registry` owns the data directory. It bootstraps the reserved
//! "main" store, discovers forks from their manifests (opening sources
//! before their forks so overlays can be seeded), routes operations by
//! store id, and implements fork creation, PITR, deletion, and
//! snapshot restore.
//!
//! The process holds at most one in-memory instance of each store;
//! cross-store writes run concurrently because each store owns its own
//! write lock.

use crate::store::Store;
use engram_core::error::{EngramError, Result};
use engram_core::hash::Hash256;
use engram_core::types::{SnapshotId, StoreId, Timestamp};
use engram_core::Embedder;
use engram_durability::{SnapshotEntry, StoreManifest, StorePaths};
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Data roots currently owned by a live `Registry` in this process.
///
/// Two registries over the same root would fight over the same WAL
/// files, so a second open of an already-owned root is rejected.
static OPEN_ROOTS: Lazy<Mutex<HashSet<PathBuf>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Public description of a store, as listed by the registry.
#[derive(Debug, Clone, Serialize)]
pub struct StoreDescriptor {
    /// The store's id
    pub store_id: StoreId,
    /// Optional display name
    pub name: Option<String>,
    /// Optional note
    pub note: Option<String>,
    /// Source store when this is a fork
    pub source: Option<StoreId>,
    /// Fork cut sequence
    pub fork_sequence: Option<u64>,
    /// PITR cut time, when forked at a past timestamp
    pub fork_timestamp_ms: Option<u64>,
    /// Creation time (milliseconds)
    pub created_at_ms: u64,
}

impl From<&StoreManifest> for StoreDescriptor {
    fn from(manifest: &StoreManifest) -> Self {
        StoreDescriptor {
            store_id: manifest.store_id.clone(),
            name: manifest.name.clone(),
            note: manifest.note.clone(),
            source: manifest.source.clone(),
            fork_sequence: manifest.fork_sequence,
            fork_timestamp_ms: manifest.fork_timestamp_ms,
            created_at_ms: manifest.created_at_ms,
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").field("root", &self.root).finish()
    }
}

/// Owner of every open store under one data directory.
pub struct Registry {
    root: PathBuf,
    embedder: Arc<dyn Embedder>,
    stores: RwLock<HashMap<StoreId, Arc<Store>>>,
}

impl Registry {
    /// Open the registry: bootstrap "main" (creating it on first use)
    /// and every fork found on disk, sources before their forks.
    pub fn open(root: impl AsRef<Path>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        let root = root.canonicalize()?;

        {
            let mut open_roots = OPEN_ROOTS.lock();
            if !open_roots.insert(root.clone()) {
                return Err(EngramError::conflict(format!(
                    "data root {:?} is already open in this process",
                    root
                )));
            }
        }

        Self::open_inner(root.clone(), embedder).map_err(|e| {
            OPEN_ROOTS.lock().remove(&root);
            e
        })
    }

    fn open_inner(root: PathBuf, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let mut manifests: Vec<StoreManifest> = Vec::new();
        for entry in std::fs::read_dir(&root)? {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            let manifest_path = entry.path().join("manifest.json");
            if manifest_path.exists() {
                manifests.push(StoreManifest::load(&manifest_path)?);
            }
        }

        let registry = Registry {
            root,
            embedder,
            stores: RwLock::new(HashMap::new()),
        };

        // Main first
        match manifests.iter().find(|m| m.store_id.is_main()) {
            Some(manifest) => registry.open_store(manifest.clone(), Vec::new())?,
            None => {
                let manifest = StoreManifest::main(Timestamp::now());
                let paths = StorePaths::new(&registry.root, &manifest.store_id);
                paths.create_directories()?;
                manifest.save(&paths.manifest())?;
                info!("bootstrapping main store");
                registry.open_store(manifest, Vec::new())?;
            }
        }

        // Forks in dependency order: a fork opens only after its source
        let mut pending: Vec<StoreManifest> =
            manifests.into_iter().filter(|m| m.is_fork()).collect();
        loop {
            let opened: Vec<StoreId> = registry.stores.read().keys().cloned().collect();
            let (ready, rest): (Vec<_>, Vec<_>) = pending.into_iter().partition(|m| {
                m.source
                    .as_ref()
                    .map(|s| opened.contains(s))
                    .unwrap_or(false)
            });
            if ready.is_empty() {
                pending = rest;
                break;
            }
            for manifest in ready {
                let source_id = manifest.source.clone().ok_or_else(|| {
                    EngramError::internal("fork manifest without source")
                })?;
                let cut = manifest.fork_sequence.unwrap_or(0);
                let inherited = registry.get(&source_id)?.records_up_to_seq(cut)?;
                registry.open_store(manifest, inherited)?;
            }
            pending = rest;
        }
        for orphan in &pending {
            warn!(store = %orphan.store_id, "fork source missing, store not opened");
        }
        if !pending.is_empty() {
            return Err(EngramError::integrity(format!(
                "{} fork(s) reference a missing source store",
                pending.len()
            )));
        }

        Ok(registry)
    }

    fn open_store(&self, manifest: StoreManifest, inherited: Vec<engram_core::record::WalRecord>) -> Result<()> {
        let paths = StorePaths::new(&self.root, &manifest.store_id);
        let store_id = manifest.store_id.clone();
        let store = Store::open(paths, manifest, self.embedder.clone(), inherited)?;
        self.stores.write().insert(store_id, Arc::new(store));
        Ok(())
    }

    /// Resolve a store by id.
    pub fn get(&self, store_id: &StoreId) -> Result<Arc<Store>> {
        self.stores
            .read()
            .get(store_id)
            .cloned()
            .ok_or_else(|| EngramError::not_found("store", store_id.as_str()))
    }

    /// Every store, "main" included.
    pub fn list(&self) -> Vec<StoreDescriptor> {
        let mut out: Vec<StoreDescriptor> = self
            .stores
            .read()
            .values()
            .map(|s| StoreDescriptor::from(s.manifest()))
            .collect();
        out.sort_by(|a, b| a.store_id.cmp(&b.store_id));
        out
    }

    /// Forks only.
    pub fn list_forks(&self) -> Vec<StoreDescriptor> {
        self.list().into_iter().filter(|d| d.source.is_some()).collect()
    }

    // ========================================================================
    // Forks
    // ========================================================================

    /// Fork `source` at its current history head, or, with `at`, at
    /// the last record whose timestamp is `<= at` (PITR).
    pub fn create_fork(
        &self,
        source_id: &StoreId,
        name: Option<String>,
        note: Option<String>,
        at: Option<Timestamp>,
    ) -> Result<StoreDescriptor> {
        let source = self.get(source_id)?;
        let cut_seq = match at {
            // Freezes the source head briefly under its write lock
            None => source.current_cut().0,
            Some(t) => source.cut_at_timestamp(t)?.map(|(seq, _)| seq).unwrap_or(0),
        };
        self.fork_at_sequence(&source, source_id, cut_seq, at, name, note)
    }

    fn fork_at_sequence(
        &self,
        source: &Arc<Store>,
        source_id: &StoreId,
        cut_seq: u64,
        at: Option<Timestamp>,
        name: Option<String>,
        note: Option<String>,
    ) -> Result<StoreDescriptor> {
        let inherited = source.records_up_to_seq(cut_seq)?;
        let new_id = StoreId::new_fork();
        let paths = StorePaths::new(&self.root, &new_id);
        paths.create_directories()?;

        let manifest = StoreManifest::fork(
            new_id.clone(),
            source_id.clone(),
            cut_seq,
            at,
            name,
            note,
            Timestamp::now(),
        );
        manifest.save(&paths.manifest())?;

        let descriptor = StoreDescriptor::from(&manifest);
        let store = Store::open(paths, manifest, self.embedder.clone(), inherited)?;
        self.stores.write().insert(new_id.clone(), Arc::new(store));
        info!(fork = %new_id, source = %source_id, cut = cut_seq, "fork created");
        Ok(descriptor)
    }

    /// Delete a fork: its manifest, WAL, segments, and indexes. The
    /// source is never touched; "main" can never be deleted; a store
    /// that other forks still read through cannot be deleted either.
    pub fn delete_fork(&self, store_id: &StoreId) -> Result<()> {
        if store_id.is_main() {
            return Err(EngramError::forbidden("the main store cannot be deleted"));
        }
        let mut stores = self.stores.write();
        if !stores.contains_key(store_id) {
            return Err(EngramError::not_found("store", store_id.as_str()));
        }
        let dependents = stores
            .values()
            .filter(|s| s.manifest().source.as_ref() == Some(store_id))
            .count();
        if dependents > 0 {
            return Err(EngramError::conflict(format!(
                "store {} still has {} dependent fork(s)",
                store_id, dependents
            )));
        }
        stores.remove(store_id);
        drop(stores);

        let paths = StorePaths::new(&self.root, store_id);
        std::fs::remove_dir_all(paths.root())?;
        info!(store = %store_id, "fork deleted");
        Ok(())
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    /// Capture a snapshot of `store_id`.
    pub fn create_snapshot(&self, store_id: &StoreId, name: &str) -> Result<SnapshotEntry> {
        self.get(store_id)?.create_snapshot(name)
    }

    /// Snapshot catalog of `store_id`.
    pub fn list_snapshots(&self, store_id: &StoreId) -> Result<Vec<SnapshotEntry>> {
        Ok(self.get(store_id)?.list_snapshots())
    }

    /// Restore a snapshot as a new fork of its owning store, cut at
    /// the snapshot's sequence. The owning store is not mutated.
    pub fn restore_snapshot(
        &self,
        snapshot_id: &SnapshotId,
        new_name: Option<String>,
    ) -> Result<StoreDescriptor> {
        let found = {
            let stores = self.stores.read();
            stores.values().find_map(|store| {
                store
                    .find_snapshot(snapshot_id)
                    .map(|entry| (store.store_id().clone(), entry))
            })
        };
        let (owner_id, entry) = found
            .ok_or_else(|| EngramError::not_found("snapshot", snapshot_id.as_str()))?;
        let owner = self.get(&owner_id)?;
        let note = Some(format!("restored from snapshot {:?}", entry.name));
        self.fork_at_sequence(&owner, &owner_id, entry.sequence, None, new_name, note)
    }

    // ========================================================================
    // Maintenance routing
    // ========================================================================

    /// Verify a store's integrity.
    pub fn verify_integrity(&self, store_id: &StoreId) -> Result<crate::IntegrityReport> {
        self.get(store_id)?.verify_integrity()
    }

    /// Rebuild a store's in-memory indexes from its log.
    pub fn rebuild_indexes(&self, store_id: &StoreId) -> Result<()> {
        self.get(store_id)?.rebuild_indexes()
    }

    /// Merge a store's sealed segments.
    pub fn compact(&self, store_id: &StoreId) -> Result<bool> {
        self.get(store_id)?.compact()
    }

    /// Store counters.
    pub fn stats(&self, store_id: &StoreId) -> Result<crate::StoreStats> {
        Ok(self.get(store_id)?.stats())
    }

    /// The folded chain-hash tail of a store, for diagnostics.
    pub fn chain_tail(&self, store_id: &StoreId) -> Result<Hash256> {
        Ok(self.get(store_id)?.chain_tail())
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        OPEN_ROOTS.lock().remove(&self.root);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ListFilter, MemoryChange, NewMemory};
    use crate::testing::BagOfWordsEmbedder;
    use engram_core::types::Importance;

    fn open_registry(dir: &Path) -> Registry {
        Registry::open(dir, Arc::new(BagOfWordsEmbedder::default())).unwrap()
    }

    fn draft(content: &str) -> NewMemory {
        NewMemory {
            category: "x".into(),
            kind: "fact".into(),
            content: content.into(),
            tags: Default::default(),
            importance: Importance::default(),
            cadence: None,
            context: None,
        }
    }

    #[test]
    fn test_bootstrap_creates_main() {
        let dir = tempfile::tempdir().unwrap();
        let registry = open_registry(dir.path());
        let stores = registry.list();
        assert_eq!(stores.len(), 1);
        assert!(stores[0].store_id.is_main());
        assert!(registry.list_forks().is_empty());
    }

    #[test]
    fn test_double_open_rejected_until_drop() {
        let dir = tempfile::tempdir().unwrap();
        let first = open_registry(dir.path());
        let err =
            Registry::open(dir.path(), Arc::new(BagOfWordsEmbedder::default())).unwrap_err();
        assert!(err.is_conflict());

        drop(first);
        let _second = open_registry(dir.path());
    }

    #[test]
    fn test_fork_isolation() {
        let dir = tempfile::tempdir().unwrap();
        let registry = open_registry(dir.path());
        let main = registry.get(&StoreId::main()).unwrap();

        let memory = main.add_memory(draft("A")).unwrap();
        let fork = registry
            .create_fork(&StoreId::main(), Some("f".into()), None, None)
            .unwrap();
        let fork_store = registry.get(&fork.store_id).unwrap();

        // Update in the fork only
        fork_store
            .update_memory(
                &memory.id,
                MemoryChange {
                    content: Some("B".into()),
                    ..Default::default()
                },
            )
            .unwrap();

        let in_main = main.get_memory(&memory.id).unwrap();
        assert_eq!(in_main.content, "A");
        assert_eq!(in_main.version, 1);

        let in_fork = fork_store.get_memory(&memory.id).unwrap();
        assert_eq!(in_fork.content, "B");
        assert_eq!(in_fork.version, 2);
    }

    #[test]
    fn test_fork_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let (fork_id, memory_id) = {
            let registry = open_registry(dir.path());
            let main = registry.get(&StoreId::main()).unwrap();
            let memory = main.add_memory(draft("shared")).unwrap();
            let fork = registry
                .create_fork(&StoreId::main(), None, None, None)
                .unwrap();
            let fork_store = registry.get(&fork.store_id).unwrap();
            fork_store.add_memory(draft("fork only")).unwrap();
            (fork.store_id, memory.id)
        };

        let registry = open_registry(dir.path());
        let fork_store = registry.get(&fork_id).unwrap();
        assert!(fork_store.get_memory(&memory_id).is_some());
        assert_eq!(fork_store.stats().live_memories, 2);
        assert!(fork_store.verify_integrity().unwrap().valid);
    }

    #[test]
    fn test_delete_main_forbidden() {
        let dir = tempfile::tempdir().unwrap();
        let registry = open_registry(dir.path());
        let err = registry.delete_fork(&StoreId::main()).unwrap_err();
        assert!(matches!(err, EngramError::Forbidden { .. }));
    }

    #[test]
    fn test_delete_fork_leaves_source() {
        let dir = tempfile::tempdir().unwrap();
        let registry = open_registry(dir.path());
        let main = registry.get(&StoreId::main()).unwrap();
        let memory = main.add_memory(draft("keep me")).unwrap();

        let fork = registry
            .create_fork(&StoreId::main(), None, None, None)
            .unwrap();
        registry.delete_fork(&fork.store_id).unwrap();

        assert!(registry.get(&fork.store_id).is_err());
        assert!(main.get_memory(&memory.id).is_some());
        assert!(!StorePaths::new(dir.path(), &fork.store_id).exists());
    }

    #[test]
    fn test_delete_fork_with_dependents_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let registry = open_registry(dir.path());
        let f1 = registry
            .create_fork(&StoreId::main(), None, None, None)
            .unwrap();
        let _f2 = registry.create_fork(&f1.store_id, None, None, None).unwrap();

        let err = registry.delete_fork(&f1.store_id).unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_snapshot_restore() {
        let dir = tempfile::tempdir().unwrap();
        let registry = open_registry(dir.path());
        let main = registry.get(&StoreId::main()).unwrap();

        let m1 = main.add_memory(draft("M1")).unwrap();
        let snapshot = registry.create_snapshot(&StoreId::main(), "pre").unwrap();
        main.add_memory(draft("M2")).unwrap();

        let restored = registry
            .restore_snapshot(&snapshot.id, Some("rewind".into()))
            .unwrap();
        let fork = registry.get(&restored.store_id).unwrap();

        let listed = fork.list_memories(&ListFilter::default());
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].memory.id, m1.id);
        // The source still has both
        assert_eq!(main.stats().live_memories, 2);
    }

    #[test]
    fn test_restore_unknown_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let registry = open_registry(dir.path());
        let err = registry
            .restore_snapshot(&SnapshotId::new(), None)
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_pitr_fork() {
        let dir = tempfile::tempdir().unwrap();
        let registry = open_registry(dir.path());
        let main = registry.get(&StoreId::main()).unwrap();

        let before = main.add_memory(draft("before")).unwrap();
        let t_cut = Timestamp::now().plus_millis(5);
        std::thread::sleep(std::time::Duration::from_millis(10));
        main.add_memory(draft("after")).unwrap();

        let fork = registry
            .create_fork(&StoreId::main(), None, None, Some(t_cut))
            .unwrap();
        let fork_store = registry.get(&fork.store_id).unwrap();
        let listed = fork_store.list_memories(&ListFilter::default());
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].memory.id, before.id);
    }
}

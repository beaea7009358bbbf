//! The embeddable public API.
//!
//! `Engram` is the single entry point callers hold: it owns the
//! [`Registry`] and exposes every operation of the public surface with
//! wire-level argument types (string cadence kinds, string relation
//! kinds, string search modes). All validation happens here, before
//! any mutation; the store layer below only sees well-formed input.
//!
//! Transports (tool-call servers, REST) are thin mappings over these
//! methods and live outside this crate.

use crate::registry::{Registry, StoreDescriptor};
use crate::store::{
    ListFilter, MemoryChange, MemoryRecord, Neighborhood, NewMemory, SearchHit, SearchMode,
    SearchRequest,
};
use crate::{IntegrityReport, StoreStats};
use engram_core::error::{EngramError, Result};
use engram_core::record::{Memory, Relationship};
use engram_core::types::{
    Importance, MemoryId, RelationKind, SnapshotId, StoreId, Timestamp,
};
use engram_core::{Cadence, Embedder};
use engram_durability::SnapshotEntry;
use engram_search::DEFAULT_ALPHA;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

/// Environment variable naming the data directory.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

/// Default data directory when `DATA_DIR` is unset.
pub const DEFAULT_DATA_DIR: &str = "./data";

// ============================================================================
// Wire-level argument types
// ============================================================================

/// Cadence as it arrives on the wire: a kind plus an optional value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CadenceSpec {
    /// "daily" | "weekly" | "monthly" | "day_of_week" | "day_of_month"
    pub kind: String,
    /// Weekday name or day number, for the kinds that take one
    pub value: Option<String>,
}

/// Input for `add_memory`.
#[derive(Debug, Clone, Default)]
pub struct MemoryDraft {
    /// Required category
    pub category: String,
    /// Required memory type
    pub kind: String,
    /// Required content
    pub content: String,
    /// Optional tags
    pub tags: Vec<String>,
    /// Optional importance (1..=10, default 5)
    pub importance: Option<u8>,
    /// Optional review cadence
    pub cadence: Option<CadenceSpec>,
    /// Optional context
    pub context: Option<String>,
}

impl MemoryDraft {
    /// Draft with the three required fields.
    pub fn new(
        category: impl Into<String>,
        kind: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        MemoryDraft {
            category: category.into(),
            kind: kind.into(),
            content: content.into(),
            ..Default::default()
        }
    }
}

/// Input for `update_memory`: any subset of fields.
#[derive(Debug, Clone, Default)]
pub struct MemoryPatch {
    /// New category
    pub category: Option<String>,
    /// New memory type
    pub kind: Option<String>,
    /// New content
    pub content: Option<String>,
    /// Replacement tag list
    pub tags: Option<Vec<String>>,
    /// New importance
    pub importance: Option<u8>,
    /// New cadence
    pub cadence: Option<CadenceSpec>,
    /// New context
    pub context: Option<String>,
    /// Archive / unarchive
    pub archived: Option<bool>,
}

// ============================================================================
// Validation helpers
// ============================================================================

fn require_text(field: &'static str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngramError::invalid_arg(format!(
            "{} must not be empty",
            field
        )));
    }
    Ok(trimmed.to_string())
}

fn validate_tags(tags: Vec<String>) -> Result<BTreeSet<String>> {
    let mut out = BTreeSet::new();
    for tag in tags {
        out.insert(require_text("tag", &tag)?);
    }
    Ok(out)
}

fn parse_cadence(spec: &CadenceSpec) -> Result<Cadence> {
    Cadence::parse(&spec.kind, spec.value.as_deref())
}

fn validate_alpha(alpha: f32) -> Result<f32> {
    if !(0.0..=1.0).contains(&alpha) {
        return Err(EngramError::invalid_arg(format!(
            "alpha must be within 0.0..=1.0, got {}",
            alpha
        )));
    }
    Ok(alpha)
}

// ============================================================================
// Engram
// ============================================================================

/// The embeddable memory store.
pub struct Engram {
    registry: Registry,
}

impl Engram {
    /// Open (or create) a store root at `root` with the injected
    /// embedder. The embedder is fixed for the process lifetime.
    pub fn open(root: impl AsRef<Path>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        Ok(Engram {
            registry: Registry::open(root, embedder)?,
        })
    }

    /// Open using `DATA_DIR` (default `./data`).
    pub fn open_from_env(embedder: Arc<dyn Embedder>) -> Result<Self> {
        let root = std::env::var(DATA_DIR_ENV).unwrap_or_else(|_| DEFAULT_DATA_DIR.to_string());
        Self::open(root, embedder)
    }

    /// The reserved "main" store id.
    pub fn main() -> StoreId {
        StoreId::main()
    }

    /// Direct registry access, for embedders with advanced needs.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    // ========================================================================
    // Memory CRUD
    // ========================================================================

    /// Add a memory. Fails with `InvalidArg` on empty required fields,
    /// bad importance, or an unknown cadence kind.
    pub fn add_memory(&self, store: &StoreId, draft: MemoryDraft) -> Result<Memory> {
        let new = NewMemory {
            category: require_text("category", &draft.category)?,
            kind: require_text("type", &draft.kind)?,
            content: require_text("content", &draft.content)?,
            tags: validate_tags(draft.tags)?,
            importance: match draft.importance {
                Some(v) => Importance::new(v)?,
                None => Importance::default(),
            },
            cadence: draft.cadence.as_ref().map(parse_cadence).transpose()?,
            context: draft.context,
        };
        self.registry.get(store)?.add_memory(new)
    }

    /// The live version of a memory, or `None`.
    pub fn get_memory(&self, store: &StoreId, id: &MemoryId) -> Result<Option<Memory>> {
        Ok(self.registry.get(store)?.get_memory(id))
    }

    /// Record a review access for cadence tracking. Returns `false`
    /// for absent ids; never writes to the WAL.
    pub fn touch_memory(&self, store: &StoreId, id: &MemoryId) -> Result<bool> {
        self.registry.get(store)?.touch_memory(id)
    }

    /// Update any subset of a memory's fields, producing version + 1.
    pub fn update_memory(
        &self,
        store: &StoreId,
        id: &MemoryId,
        patch: MemoryPatch,
    ) -> Result<Memory> {
        let change = MemoryChange {
            category: patch
                .category
                .as_deref()
                .map(|v| require_text("category", v))
                .transpose()?,
            kind: patch
                .kind
                .as_deref()
                .map(|v| require_text("type", v))
                .transpose()?,
            content: patch
                .content
                .as_deref()
                .map(|v| require_text("content", v))
                .transpose()?,
            tags: patch.tags.map(validate_tags).transpose()?,
            importance: patch.importance.map(Importance::new).transpose()?,
            cadence: patch.cadence.as_ref().map(parse_cadence).transpose()?,
            context: patch.context,
            archived: patch.archived,
        };
        if change.is_empty() {
            return Err(EngramError::invalid_arg("update carries no fields"));
        }
        self.registry.get(store)?.update_memory(id, change)
    }

    /// Tombstone a memory. Idempotent: `false` when nothing was live.
    pub fn delete_memory(&self, store: &StoreId, id: &MemoryId) -> Result<bool> {
        self.registry.get(store)?.delete_memory(id)
    }

    /// Filtered, paginated listing in insertion order.
    pub fn list_memories(&self, store: &StoreId, filter: ListFilter) -> Result<Vec<MemoryRecord>> {
        Ok(self.registry.get(store)?.list_memories(&filter))
    }

    // ========================================================================
    // Search and review
    // ========================================================================

    /// Ranked search. `mode` is "semantic", "text", or "hybrid";
    /// `alpha` (hybrid only) defaults to 0.7.
    pub fn search_memories(
        &self,
        store: &StoreId,
        query: &str,
        mode: &str,
        limit: Option<usize>,
        alpha: Option<f32>,
    ) -> Result<Vec<SearchHit>> {
        let query = require_text("query", query)?;
        let request = SearchRequest {
            query,
            mode: SearchMode::parse(mode)?,
            limit: limit.unwrap_or(10),
            alpha: validate_alpha(alpha.unwrap_or(DEFAULT_ALPHA))?,
            min_score: None,
        };
        self.registry.get(store)?.search(&request)
    }

    /// Live memories due for review now, importance-descending.
    pub fn memories_due(&self, store: &StoreId) -> Result<Vec<Memory>> {
        self.memories_due_at(store, Timestamp::now())
    }

    /// Review-due evaluation at an explicit time.
    pub fn memories_due_at(&self, store: &StoreId, now: Timestamp) -> Result<Vec<Memory>> {
        Ok(self.registry.get(store)?.memories_due(now))
    }

    // ========================================================================
    // Relationships
    // ========================================================================

    /// Link two memories. `kind` is one of the wire names
    /// (`related_to`, `supersedes`, `contradicts`, `elaborates`,
    /// `references`).
    pub fn add_relationship(
        &self,
        store: &StoreId,
        from: &MemoryId,
        to: &MemoryId,
        kind: &str,
    ) -> Result<Relationship> {
        let kind = RelationKind::parse(kind)?;
        self.registry.get(store)?.add_relationship(from, to, kind)
    }

    /// Live adjacency of a memory.
    pub fn get_relationships(&self, store: &StoreId, id: &MemoryId) -> Result<Neighborhood> {
        Ok(self.registry.get(store)?.get_relationships(id))
    }

    /// Memories reachable within `depth` hops (cycle-safe BFS).
    pub fn get_related_memories(
        &self,
        store: &StoreId,
        id: &MemoryId,
        depth: usize,
    ) -> Result<Vec<Memory>> {
        Ok(self.registry.get(store)?.related_memories(id, depth))
    }

    // ========================================================================
    // Forks, snapshots, PITR
    // ========================================================================

    /// Fork a store at its current history head.
    pub fn create_fork(
        &self,
        source: &StoreId,
        name: Option<String>,
        note: Option<String>,
    ) -> Result<StoreDescriptor> {
        self.registry.create_fork(source, name, note, None)
    }

    /// Fork a store at a past time (point-in-time recovery).
    pub fn create_fork_at_time(
        &self,
        source: &StoreId,
        name: Option<String>,
        note: Option<String>,
        at: Timestamp,
    ) -> Result<StoreDescriptor> {
        self.registry.create_fork(source, name, note, Some(at))
    }

    /// Every store, "main" included.
    pub fn list_stores(&self) -> Vec<StoreDescriptor> {
        self.registry.list()
    }

    /// Forks only.
    pub fn list_forks(&self) -> Vec<StoreDescriptor> {
        self.registry.list_forks()
    }

    /// Delete a fork. `Forbidden` for "main".
    pub fn delete_fork(&self, store: &StoreId) -> Result<()> {
        self.registry.delete_fork(store)
    }

    /// Capture a named snapshot of a store.
    pub fn create_snapshot(&self, store: &StoreId, name: &str) -> Result<SnapshotEntry> {
        let name = require_text("snapshot name", name)?;
        self.registry.create_snapshot(store, &name)
    }

    /// Snapshot catalog of a store.
    pub fn list_snapshots(&self, store: &StoreId) -> Result<Vec<SnapshotEntry>> {
        self.registry.list_snapshots(store)
    }

    /// Restore a snapshot as a new fork of its owning store.
    pub fn restore_snapshot(
        &self,
        snapshot: &SnapshotId,
        new_name: Option<String>,
    ) -> Result<StoreDescriptor> {
        self.registry.restore_snapshot(snapshot, new_name)
    }

    // ========================================================================
    // Integrity and maintenance
    // ========================================================================

    /// Recompute hashes, chain, and Merkle root; compare to the live
    /// root.
    pub fn verify_integrity(&self, store: &StoreId) -> Result<IntegrityReport> {
        self.registry.verify_integrity(store)
    }

    /// Rebuild a store's in-memory indexes from its log.
    pub fn rebuild_indexes(&self, store: &StoreId) -> Result<()> {
        self.registry.rebuild_indexes(store)
    }

    /// Merge a store's sealed segments.
    pub fn compact(&self, store: &StoreId) -> Result<bool> {
        self.registry.compact(store)
    }

    /// Store counters and root hash.
    pub fn get_stats(&self, store: &StoreId) -> Result<StoreStats> {
        self.registry.stats(store)
    }
}

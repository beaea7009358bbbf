//! One logical store: log, indexes, and the serialized write path.
//!
//! A `Store` binds a [`StoreLog`], the latest-version index, the
//! vector and text indexes, the incremental Merkle tree, the snapshot
//! catalog, and the last-accessed side table for a single logical
//! store ("main" or a fork).
//!
//! # Write path
//!
//! Every mutation flows through one path: prepare the next record
//! (next version, prev-hash from the log tail, content hash), append
//! it to the WAL, and only then apply it to the in-memory indexes.
//! A fair mutex serializes writers; index state sits behind a RwLock
//! and is published only after the append succeeded, so readers never
//! observe a record whose WAL write failed (publish-before-visible).
//!
//! # Forks
//!
//! A fork holds the source's records up to the cut as an immutable
//! `inherited` prefix replayed at open. Its own log continues the
//! sequence numbering and hash chain from the cut record, and its
//! Merkle tree extends the inherited leaves, so snapshots and
//! integrity checks span the full visible history.

use crate::integrity::{self, IntegrityReport};
use crate::latest::LatestIndex;
use crate::vector::VectorIndex;
use engram_core::canonical;
use engram_core::embed::Embedder;
use engram_core::error::{EngramError, Result};
use engram_core::hash::Hash256;
use engram_core::merkle::MerkleTree;
use engram_core::record::{
    Memory, RecordPayload, Relationship, SnapshotMarker, WalRecord,
};
use engram_core::types::{
    Importance, MemoryId, RelationKind, SnapshotId, StoreId, Timestamp,
};
use engram_core::Cadence;
use engram_durability::{
    AccessTable, LogBase, SnapshotCatalog, SnapshotEntry, StoreLog, StoreManifest, StorePaths,
};
use engram_search::{fuse, IndexedDoc, TextIndex, DEFAULT_ALPHA};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

/// Hard cap on relationship BFS depth, cycles notwithstanding.
pub const MAX_TRAVERSAL_DEPTH: usize = 16;

/// Candidate pool size for each side of a hybrid query.
fn raw_candidates(k: usize) -> usize {
    k.saturating_mul(4).max(32)
}

// ============================================================================
// Request / response types
// ============================================================================

/// Validated input for a new memory (version 1).
#[derive(Debug, Clone)]
pub struct NewMemory {
    /// Grouping category
    pub category: String,
    /// Memory type
    pub kind: String,
    /// Content text
    pub content: String,
    /// Tag set
    pub tags: BTreeSet<String>,
    /// Importance 1..=10
    pub importance: Importance,
    /// Optional review cadence
    pub cadence: Option<Cadence>,
    /// Optional context
    pub context: Option<String>,
}

/// Validated field changes for an update. `None` leaves a field as is.
#[derive(Debug, Clone, Default)]
pub struct MemoryChange {
    /// New category
    pub category: Option<String>,
    /// New memory type
    pub kind: Option<String>,
    /// New content (triggers re-embedding)
    pub content: Option<String>,
    /// Replacement tag set
    pub tags: Option<BTreeSet<String>>,
    /// New importance
    pub importance: Option<Importance>,
    /// New cadence
    pub cadence: Option<Cadence>,
    /// New context
    pub context: Option<String>,
    /// Archive / unarchive
    pub archived: Option<bool>,
}

impl MemoryChange {
    /// True when no field is set.
    pub fn is_empty(&self) -> bool {
        self.category.is_none()
            && self.kind.is_none()
            && self.content.is_none()
            && self.tags.is_none()
            && self.importance.is_none()
            && self.cadence.is_none()
            && self.context.is_none()
            && self.archived.is_none()
    }
}

/// Listing filters. All present filters must match.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    /// Only this category
    pub category: Option<String>,
    /// Only this memory type
    pub kind: Option<String>,
    /// Only memories carrying this tag
    pub tag: Option<String>,
    /// Include archived and tombstoned records
    pub include_archived: bool,
    /// Page size (unlimited when `None`)
    pub limit: Option<usize>,
    /// Records skipped before the page starts
    pub offset: usize,
}

/// Search execution mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Vector similarity only
    Semantic,
    /// BM25 text only
    Text,
    /// Blend of both
    Hybrid,
}

impl SearchMode {
    /// Parse a wire name.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "semantic" => Ok(SearchMode::Semantic),
            "text" => Ok(SearchMode::Text),
            "hybrid" => Ok(SearchMode::Hybrid),
            other => Err(EngramError::invalid_arg(format!(
                "unknown search mode: {:?}",
                other
            ))),
        }
    }
}

/// A validated search request.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// Non-empty query text
    pub query: String,
    /// Execution mode
    pub mode: SearchMode,
    /// Maximum results
    pub limit: usize,
    /// Hybrid blend weight toward the vector side
    pub alpha: f32,
    /// Optional similarity floor for semantic mode
    pub min_score: Option<f32>,
}

impl SearchRequest {
    /// Hybrid request with defaults (limit 10, alpha 0.7).
    pub fn hybrid(query: impl Into<String>) -> Self {
        SearchRequest {
            query: query.into(),
            mode: SearchMode::Hybrid,
            limit: 10,
            alpha: DEFAULT_ALPHA,
            min_score: None,
        }
    }
}

/// One ranked search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    /// The matching memory
    pub memory: Memory,
    /// Mode-dependent relevance score
    pub score: f32,
}

/// A listed record, tombstone state included.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryRecord {
    /// The latest version's payload
    pub memory: Memory,
    /// Tombstone flag
    pub deleted: bool,
}

/// Live adjacency of one memory.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Neighborhood {
    /// Relationships where the memory is the source
    pub outgoing: Vec<Relationship>,
    /// Relationships where the memory is the target
    pub incoming: Vec<Relationship>,
}

/// Store counters and the current root hash.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    /// The store
    pub store_id: StoreId,
    /// Live memory count
    pub live_memories: usize,
    /// Memory ids including tombstoned ones
    pub total_memories: usize,
    /// Live relationship count
    pub live_relationships: usize,
    /// Records in the visible history (inherited + own)
    pub total_records: u64,
    /// Sealed segment count (own history only)
    pub segments: usize,
    /// Current Merkle root
    pub merkle_root: Hash256,
    /// Chain hash folded left over every content hash from genesis
    pub chain_tail: Hash256,
    /// Last log sequence (0 when empty)
    pub last_seq: u64,
}

// ============================================================================
// Store
// ============================================================================

struct StoreState {
    log: StoreLog,
    /// Fork prefix: the source's records up to the cut (empty for main)
    inherited: Vec<WalRecord>,
    latest: LatestIndex,
    vectors: VectorIndex,
    text: TextIndex,
    merkle: MerkleTree,
    access: AccessTable,
    snapshots: SnapshotCatalog,
    /// Folded chain hash over every content hash from genesis
    chain_tail: Hash256,
    /// Timestamp high-water mark; keeps record times monotonic per store
    last_timestamp: Timestamp,
}

/// One logical store.
pub struct Store {
    store_id: StoreId,
    manifest: StoreManifest,
    paths: StorePaths,
    base: LogBase,
    embedder: Arc<dyn Embedder>,
    /// Serializes mutations; parking_lot mutexes are fair enough that
    /// writers drain in arrival order
    write_lock: Mutex<()>,
    state: RwLock<StoreState>,
}

impl Store {
    /// Open a store from disk, replaying the inherited prefix (for
    /// forks) and its own log into fresh indexes.
    pub fn open(
        paths: StorePaths,
        manifest: StoreManifest,
        embedder: Arc<dyn Embedder>,
        inherited: Vec<WalRecord>,
    ) -> Result<Self> {
        paths.create_directories()?;
        let store_id = manifest.store_id.clone();
        let base = match inherited.last() {
            Some(last) => LogBase {
                next_seq: last.seq + 1,
                prev_hash: last.content_hash,
            },
            None => LogBase::genesis(),
        };

        let log = StoreLog::open(&paths, &store_id, base)?;
        let own = log.records()?;
        let (latest, merkle, vectors, text, chain_tail, last_timestamp) =
            build_indexes(&inherited, &own, embedder.dimension())?;
        let access = AccessTable::load(paths.access())?;
        let snapshots = SnapshotCatalog::load(&paths.snapshots())?;

        info!(
            store = %store_id,
            inherited = inherited.len(),
            own = own.len(),
            "store opened"
        );

        Ok(Store {
            store_id,
            manifest,
            paths,
            base,
            embedder,
            write_lock: Mutex::new(()),
            state: RwLock::new(StoreState {
                log,
                inherited,
                latest,
                vectors,
                text,
                merkle,
                access,
                snapshots,
                chain_tail,
                last_timestamp,
            }),
        })
    }

    /// Chain hash folded left over the visible history's content
    /// hashes, starting from the genesis zero value.
    pub fn chain_tail(&self) -> Hash256 {
        self.state.read().chain_tail
    }

    /// The store's id.
    pub fn store_id(&self) -> &StoreId {
        &self.store_id
    }

    /// The store's manifest (identity and fork lineage).
    pub fn manifest(&self) -> &StoreManifest {
        &self.manifest
    }

    /// Current Merkle root over the visible history.
    pub fn merkle_root(&self) -> Hash256 {
        self.state.read().merkle.root()
    }

    // ========================================================================
    // Write path
    // ========================================================================

    fn next_timestamp(state: &StoreState) -> Timestamp {
        Timestamp::now().max(state.last_timestamp)
    }

    /// Append a prepared payload and publish its index effects.
    /// Caller must hold `write_lock`.
    fn commit_locked(
        &self,
        payload: RecordPayload,
        deleted: bool,
        timestamp: Timestamp,
    ) -> Result<WalRecord> {
        let record = {
            let state = self.state.read();
            let content_hash =
                canonical::content_hash(&payload, &self.store_id, timestamp, deleted);
            WalRecord {
                seq: state.log.next_seq(),
                timestamp,
                store_id: self.store_id.clone(),
                prev_hash: state.log.tail_hash(),
                content_hash,
                deleted,
                payload,
            }
        };

        let mut state = self.state.write();
        // WAL append is the commit point: failure here leaves every
        // index untouched and surfaces as Unavailable.
        state.log.append(&record)?;
        // The WAL is the source of truth; an index failure past the
        // commit point is a bug and the store must be reopened.
        apply_to_indexes(&mut state, &record)
            .map_err(|e| EngramError::internal(format!("post-append index update failed: {}", e)))?;
        // The record is committed either way; a failed seal leaves it
        // in the tail, where the next open or seal picks it up again
        if let Err(e) = state.log.seal_if_needed() {
            warn!(store = %self.store_id, error = %e, "segment seal failed, tail retained");
        }
        Ok(record)
    }

    /// Add a new memory (version 1).
    pub fn add_memory(&self, new: NewMemory) -> Result<Memory> {
        let _guard = self.write_lock.lock();
        let embedding = self.embedder.embed(&new.content)?;
        let (payload, timestamp) = {
            let state = self.state.read();
            let timestamp = Self::next_timestamp(&state);
            let memory = Memory {
                id: MemoryId::new(),
                version: 1,
                category: new.category,
                kind: new.kind,
                content: new.content,
                tags: new.tags,
                importance: new.importance,
                cadence: new.cadence,
                context: new.context,
                embedding: Some(embedding),
                created_at: timestamp,
                updated_at: timestamp,
                archived: false,
            };
            (RecordPayload::Memory(memory), timestamp)
        };
        let record = self.commit_locked(payload, false, timestamp)?;
        match record.payload {
            RecordPayload::Memory(memory) => Ok(memory),
            _ => Err(EngramError::internal("memory append produced non-memory")),
        }
    }

    /// Apply a change set to a live memory, producing version + 1.
    pub fn update_memory(&self, id: &MemoryId, change: MemoryChange) -> Result<Memory> {
        let _guard = self.write_lock.lock();
        let (mut memory, timestamp) = {
            let state = self.state.read();
            let entry = state
                .latest
                .get(id)
                .ok_or_else(|| EngramError::not_found("memory", id.as_str()))?;
            (entry.memory.clone(), Self::next_timestamp(&state))
        };

        let content_changed = matches!(&change.content, Some(c) if *c != memory.content);
        if let Some(category) = change.category {
            memory.category = category;
        }
        if let Some(kind) = change.kind {
            memory.kind = kind;
        }
        if let Some(content) = change.content {
            memory.content = content;
        }
        if let Some(tags) = change.tags {
            memory.tags = tags;
        }
        if let Some(importance) = change.importance {
            memory.importance = importance;
        }
        if let Some(cadence) = change.cadence {
            memory.cadence = Some(cadence);
        }
        if let Some(context) = change.context {
            memory.context = Some(context);
        }
        if let Some(archived) = change.archived {
            memory.archived = archived;
        }
        if content_changed {
            memory.embedding = Some(self.embedder.embed(&memory.content)?);
        }
        memory.version += 1;
        memory.updated_at = timestamp;

        let record = self.commit_locked(RecordPayload::Memory(memory), false, timestamp)?;
        match record.payload {
            RecordPayload::Memory(memory) => Ok(memory),
            _ => Err(EngramError::internal("memory append produced non-memory")),
        }
    }

    /// Tombstone a memory. Idempotent: deleting an absent or already
    /// tombstoned id returns `false` without writing anything.
    pub fn delete_memory(&self, id: &MemoryId) -> Result<bool> {
        let _guard = self.write_lock.lock();
        let (mut memory, timestamp) = {
            let state = self.state.read();
            match state.latest.get(id) {
                Some(entry) => (entry.memory.clone(), Self::next_timestamp(&state)),
                None => return Ok(false),
            }
        };
        memory.version += 1;
        memory.updated_at = timestamp;
        // History keeps the text; the tombstone does not need the vector
        memory.embedding = None;

        self.commit_locked(RecordPayload::Memory(memory), true, timestamp)?;
        Ok(true)
    }

    /// Link two live memories. At most one live relationship may exist
    /// per ordered `(from, to)` pair.
    pub fn add_relationship(
        &self,
        from: &MemoryId,
        to: &MemoryId,
        kind: RelationKind,
    ) -> Result<Relationship> {
        if from == to {
            return Err(EngramError::invalid_arg(
                "a memory cannot relate to itself",
            ));
        }
        let _guard = self.write_lock.lock();
        let (payload, timestamp) = {
            let state = self.state.read();
            if state.latest.get(from).is_none() {
                return Err(EngramError::not_found("memory", from.as_str()));
            }
            if state.latest.get(to).is_none() {
                return Err(EngramError::not_found("memory", to.as_str()));
            }
            if state.latest.has_live_pair(from, to) {
                return Err(EngramError::conflict(format!(
                    "a live relationship {} -> {} already exists",
                    from, to
                )));
            }
            let timestamp = Self::next_timestamp(&state);
            let rel = Relationship {
                id: engram_core::types::RelationshipId::new(),
                version: 1,
                from: from.clone(),
                to: to.clone(),
                kind,
                created_at: timestamp,
            };
            (RecordPayload::Relationship(rel), timestamp)
        };
        let record = self.commit_locked(payload, false, timestamp)?;
        match record.payload {
            RecordPayload::Relationship(rel) => Ok(rel),
            _ => Err(EngramError::internal(
                "relationship append produced non-relationship",
            )),
        }
    }

    /// Capture a snapshot: append a marker record, then record the
    /// resulting Merkle root and sequence in the catalog.
    pub fn create_snapshot(&self, name: &str) -> Result<SnapshotEntry> {
        let _guard = self.write_lock.lock();
        let snapshot_id = SnapshotId::new();
        let (payload, timestamp) = {
            let state = self.state.read();
            let marker = SnapshotMarker {
                snapshot_id: snapshot_id.clone(),
                name: name.to_string(),
            };
            (
                RecordPayload::SnapshotMarker(marker),
                Self::next_timestamp(&state),
            )
        };
        let record = self.commit_locked(payload, false, timestamp)?;

        let mut state = self.state.write();
        let entry = SnapshotEntry {
            id: snapshot_id,
            name: name.to_string(),
            store_id: self.store_id.clone(),
            merkle_root: state.merkle.root(),
            sequence: record.seq,
            created_at_ms: timestamp.as_millis(),
        };
        state.snapshots.add(entry.clone());
        state.snapshots.save(&self.paths.snapshots())?;
        info!(store = %self.store_id, snapshot = %entry.id, seq = entry.sequence, "snapshot captured");
        Ok(entry)
    }

    /// Record a read in the last-accessed side table. Never touches
    /// the WAL or the content hashes. Returns `false` for absent ids.
    pub fn touch_memory(&self, id: &MemoryId) -> Result<bool> {
        let mut state = self.state.write();
        if state.latest.get(id).is_none() {
            return Ok(false);
        }
        state.access.touch(id, Timestamp::now())?;
        Ok(true)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// The live version of a memory, or `None`.
    pub fn get_memory(&self, id: &MemoryId) -> Option<Memory> {
        self.state.read().latest.get(id).map(|e| e.memory.clone())
    }

    /// Filtered, paginated listing in insertion order.
    pub fn list_memories(&self, filter: &ListFilter) -> Vec<MemoryRecord> {
        let state = self.state.read();
        let latest = &state.latest;

        // The by-category / by-kind lists pre-restrict live listings
        let mut allowed: Option<BTreeSet<MemoryId>> = None;
        if !filter.include_archived {
            if let Some(category) = &filter.category {
                allowed = Some(
                    latest
                        .ids_in_category(category)
                        .cloned()
                        .unwrap_or_default(),
                );
            }
            if let Some(kind) = &filter.kind {
                let of_kind = latest.ids_of_kind(kind).cloned().unwrap_or_default();
                allowed = Some(match allowed {
                    Some(a) => a.intersection(&of_kind).cloned().collect(),
                    None => of_kind,
                });
            }
        }

        let entries: Vec<&crate::latest::MemoryEntry> = if filter.include_archived {
            latest.iterate_including_deleted().collect()
        } else {
            latest.iterate_live().collect()
        };

        entries
            .into_iter()
            .filter(|entry| {
                if let Some(allowed) = &allowed {
                    if !allowed.contains(&entry.memory.id) {
                        return false;
                    }
                }
                if !filter.include_archived && entry.memory.archived {
                    return false;
                }
                if let Some(category) = &filter.category {
                    if &entry.memory.category != category {
                        return false;
                    }
                }
                if let Some(kind) = &filter.kind {
                    if &entry.memory.kind != kind {
                        return false;
                    }
                }
                if let Some(tag) = &filter.tag {
                    if !entry.memory.tags.contains(tag) {
                        return false;
                    }
                }
                true
            })
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(usize::MAX))
            .map(|entry| MemoryRecord {
                memory: entry.memory.clone(),
                deleted: entry.deleted,
            })
            .collect()
    }

    /// Ranked search in the requested mode.
    pub fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>> {
        let state = self.state.read();
        let k = request.limit;
        let ranked: Vec<(MemoryId, f32)> = match request.mode {
            SearchMode::Text => state.text.search(&request.query, k),
            SearchMode::Semantic => {
                let query = self.embedder.embed(&request.query)?;
                state.vectors.search(&query, k, request.min_score)?
            }
            SearchMode::Hybrid => {
                let raw = raw_candidates(k);
                let query = self.embedder.embed(&request.query)?;
                let vector = state.vectors.search(&query, raw, request.min_score)?;
                let text = state.text.search(&request.query, raw);
                fuse(&vector, &text, request.alpha, k)
            }
        };

        Ok(ranked
            .into_iter()
            .filter_map(|(id, score)| {
                state.latest.get(&id).map(|entry| SearchHit {
                    memory: entry.memory.clone(),
                    score,
                })
            })
            .collect())
    }

    /// Live memories due for review at `now`, importance-descending.
    pub fn memories_due(&self, now: Timestamp) -> Vec<Memory> {
        let state = self.state.read();
        let mut due: Vec<Memory> = state
            .latest
            .iterate_live()
            .filter(|entry| !entry.memory.archived)
            .filter(|entry| match &entry.memory.cadence {
                Some(cadence) => cadence.is_due(now, state.access.get(&entry.memory.id)),
                None => false,
            })
            .map(|entry| entry.memory.clone())
            .collect();
        due.sort_by(|a, b| {
            b.importance
                .cmp(&a.importance)
                .then_with(|| a.id.cmp(&b.id))
        });
        due
    }

    /// Live adjacency of `id` (empty for unknown ids).
    pub fn get_relationships(&self, id: &MemoryId) -> Neighborhood {
        let state = self.state.read();
        Neighborhood {
            outgoing: state.latest.outgoing(id).into_iter().cloned().collect(),
            incoming: state.latest.incoming(id).into_iter().cloned().collect(),
        }
    }

    /// Memories reachable from `id` within `depth` hops, following
    /// relationships in both directions. Cycle-safe via a visited set;
    /// depth is capped at [`MAX_TRAVERSAL_DEPTH`].
    pub fn related_memories(&self, id: &MemoryId, depth: usize) -> Vec<Memory> {
        let state = self.state.read();
        let latest = &state.latest;
        if latest.get(id).is_none() {
            return Vec::new();
        }

        let depth = depth.min(MAX_TRAVERSAL_DEPTH);
        let mut visited: HashSet<MemoryId> = HashSet::from([id.clone()]);
        let mut frontier = vec![id.clone()];
        let mut reached = Vec::new();

        for _ in 0..depth {
            let mut next = Vec::new();
            for node in &frontier {
                let neighbors = latest
                    .outgoing(node)
                    .into_iter()
                    .map(|rel| rel.to.clone())
                    .chain(latest.incoming(node).into_iter().map(|rel| rel.from.clone()));
                for neighbor in neighbors {
                    if visited.insert(neighbor.clone()) {
                        if let Some(entry) = latest.get(&neighbor) {
                            reached.push(entry.memory.clone());
                            next.push(neighbor);
                        }
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        reached
    }

    /// Snapshot catalog entries for this store.
    pub fn list_snapshots(&self) -> Vec<SnapshotEntry> {
        self.state.read().snapshots.snapshots.clone()
    }

    /// Look up a snapshot owned by this store.
    pub fn find_snapshot(&self, id: &SnapshotId) -> Option<SnapshotEntry> {
        self.state.read().snapshots.get(id).cloned()
    }

    /// Counters and the live root.
    pub fn stats(&self) -> StoreStats {
        let state = self.state.read();
        let last_seq = state
            .log
            .last_seq()
            .or_else(|| state.inherited.last().map(|r| r.seq))
            .unwrap_or(0);
        StoreStats {
            store_id: self.store_id.clone(),
            live_memories: state.latest.count_live(),
            total_memories: state.latest.count_including_deleted(),
            live_relationships: state.latest.count_relationships(),
            total_records: state.merkle.leaf_count() as u64,
            segments: state.log.segments().len(),
            merkle_root: state.merkle.root(),
            chain_tail: state.chain_tail,
            last_seq,
        }
    }

    // ========================================================================
    // Fork support
    // ========================================================================

    /// Freeze the current history head: the last sequence and its
    /// content hash. Takes the write lock briefly so no append can
    /// race the capture.
    pub fn current_cut(&self) -> (u64, Hash256) {
        let _guard = self.write_lock.lock();
        let state = self.state.read();
        let seq = state
            .log
            .last_seq()
            .or_else(|| state.inherited.last().map(|r| r.seq))
            .unwrap_or(0);
        (seq, state.log.tail_hash())
    }

    /// Cut point for a PITR fork: the last record (inherited or own)
    /// with `timestamp <= at`. `None` when the whole history is newer.
    pub fn cut_at_timestamp(&self, at: Timestamp) -> Result<Option<(u64, Hash256)>> {
        let state = self.state.read();
        let mut cut = None;
        for record in &state.inherited {
            if record.timestamp <= at {
                cut = Some((record.seq, record.content_hash));
            } else {
                return Ok(cut);
            }
        }
        if let Some(own_cut) = state.log.cut_at_timestamp(at)? {
            cut = Some(own_cut);
        }
        Ok(cut)
    }

    /// Full visible history up to `seq` (inclusive): the inherited
    /// prefix plus own records. Used to seed a fork's overlay.
    pub fn records_up_to_seq(&self, seq: u64) -> Result<Vec<WalRecord>> {
        let state = self.state.read();
        let mut out: Vec<WalRecord> = state
            .inherited
            .iter()
            .filter(|r| r.seq <= seq)
            .cloned()
            .collect();
        out.extend(state.log.records_up_to_seq(seq)?);
        Ok(out)
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Recompute hashes, chain, and Merkle root from disk and compare
    /// to the live root.
    pub fn verify_integrity(&self) -> Result<IntegrityReport> {
        let state = self.state.read();
        integrity::verify_store(&state.inherited, &state.log, self.base, state.merkle.root())
    }

    /// Rebuild every in-memory index by replaying the log.
    pub fn rebuild_indexes(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut state = self.state.write();
        let own = state.log.records()?;
        let (latest, merkle, vectors, text, chain_tail, last_timestamp) =
            build_indexes(&state.inherited, &own, self.embedder.dimension())?;
        state.latest = latest;
        state.merkle = merkle;
        state.vectors = vectors;
        state.text = text;
        state.chain_tail = chain_tail;
        state.last_timestamp = last_timestamp;
        info!(store = %self.store_id, records = own.len(), "indexes rebuilt");
        Ok(())
    }

    /// Merge sealed segments (registry maintenance entry point).
    pub fn compact(&self) -> Result<bool> {
        let _guard = self.write_lock.lock();
        self.state.write().log.compact_sealed()
    }
}

// ============================================================================
// Replay helpers
// ============================================================================

fn to_indexed_doc(memory: &Memory) -> IndexedDoc {
    IndexedDoc {
        content: memory.content.clone(),
        category: memory.category.clone(),
        kind: memory.kind.clone(),
        tags: memory.tags.iter().cloned().collect(),
        context: memory.context.clone(),
    }
}

fn apply_to_indexes(state: &mut StoreState, record: &WalRecord) -> Result<()> {
    state.latest.apply(record)?;
    state.merkle.append(record.content_hash);
    state.chain_tail = engram_core::hash::chain_hash(&state.chain_tail, &record.content_hash);
    state.last_timestamp = record.timestamp;
    if let RecordPayload::Memory(memory) = &record.payload {
        if record.deleted {
            state.vectors.remove(&memory.id);
            state.text.remove(&memory.id);
            // Access freshness is advisory; a failed side-table write
            // must not fail the committed mutation
            let _ = state.access.forget(&memory.id);
        } else {
            if let Some(embedding) = &memory.embedding {
                state.vectors.upsert(memory.id.clone(), embedding.clone())?;
            }
            state.text.insert(memory.id.clone(), &to_indexed_doc(memory));
        }
    }
    Ok(())
}

type BuiltIndexes = (
    LatestIndex,
    MerkleTree,
    VectorIndex,
    TextIndex,
    Hash256,
    Timestamp,
);

fn build_indexes(
    inherited: &[WalRecord],
    own: &[WalRecord],
    dimension: usize,
) -> Result<BuiltIndexes> {
    let mut latest = LatestIndex::new();
    let mut merkle = MerkleTree::new();
    let mut chain_tail = Hash256::ZERO;
    let mut last_timestamp = Timestamp::from_millis(0);
    for record in inherited.iter().chain(own.iter()) {
        latest.apply(record)?;
        merkle.append(record.content_hash);
        chain_tail = engram_core::hash::chain_hash(&chain_tail, &record.content_hash);
        last_timestamp = last_timestamp.max(record.timestamp);
    }

    let mut vectors = VectorIndex::new(dimension);
    let mut text = TextIndex::new();
    for entry in latest.iterate_live() {
        if let Some(embedding) = &entry.memory.embedding {
            vectors.upsert(entry.memory.id.clone(), embedding.clone())?;
        }
        text.insert(entry.memory.id.clone(), &to_indexed_doc(&entry.memory));
    }
    Ok((latest, merkle, vectors, text, chain_tail, last_timestamp))
}

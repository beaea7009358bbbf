//! Store and segment manifests.
//!
//! Manifests are small JSON files rewritten atomically via
//! write-then-rename; a crash mid-rewrite leaves the previous manifest
//! intact. The store manifest records identity and fork lineage; the
//! segment catalog lists the sealed segments in order.

use crate::segment::SegmentMeta;
use engram_core::error::Result;
use engram_core::types::{StoreId, Timestamp};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

/// Atomically replace `path` with `bytes` (temp file + rename).
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

// ============================================================================
// Store manifest
// ============================================================================

/// Identity and lineage of one store (`manifest.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreManifest {
    /// The store's id ("main" or a fork UUID)
    pub store_id: StoreId,
    /// Optional display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Optional free-form note
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Source store when this is a fork
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<StoreId>,
    /// Log sequence in the source at which the fork was cut
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fork_sequence: Option<u64>,
    /// PITR cut time, when the fork was taken at a past timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fork_timestamp_ms: Option<u64>,
    /// Creation time (milliseconds)
    pub created_at_ms: u64,
}

impl StoreManifest {
    /// Manifest of the bootstrap "main" store.
    pub fn main(created_at: Timestamp) -> Self {
        StoreManifest {
            store_id: StoreId::main(),
            name: None,
            note: None,
            source: None,
            fork_sequence: None,
            fork_timestamp_ms: None,
            created_at_ms: created_at.as_millis(),
        }
    }

    /// Manifest of a fork cut from `source` at `fork_sequence`.
    pub fn fork(
        store_id: StoreId,
        source: StoreId,
        fork_sequence: u64,
        fork_timestamp: Option<Timestamp>,
        name: Option<String>,
        note: Option<String>,
        created_at: Timestamp,
    ) -> Self {
        StoreManifest {
            store_id,
            name,
            note,
            source: Some(source),
            fork_sequence: Some(fork_sequence),
            fork_timestamp_ms: fork_timestamp.map(|t| t.as_millis()),
            created_at_ms: created_at.as_millis(),
        }
    }

    /// True when this store is a fork of another.
    pub fn is_fork(&self) -> bool {
        self.source.is_some()
    }

    /// Load from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Persist to `path` atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        write_atomic(path, &serde_json::to_vec_pretty(self)?)
    }
}

// ============================================================================
// Segment catalog
// ============================================================================

/// Ordered list of a store's sealed segments
/// (`segments/manifest.json`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentCatalog {
    /// Sealed segments in log order
    pub segments: Vec<SegmentMeta>,
}

impl SegmentCatalog {
    /// Load from `path`; a missing file is an empty catalog.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(SegmentCatalog::default());
        }
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Persist to `path` atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        write_atomic(path, &serde_json::to_vec_pretty(self)?)
    }

    /// The last sealed segment, if any.
    pub fn last(&self) -> Option<&SegmentMeta> {
        self.segments.last()
    }

    /// Next unused segment id.
    pub fn next_segment_id(&self) -> u64 {
        self.segments.iter().map(|s| s.id).max().unwrap_or(0) + 1
    }
}

//! On-disk layout of a store directory.
//!
//! Every logical store owns one directory under the data root:
//!
//! ```text
//! <root>/<store-id>/
//! ├── manifest.json    # store identity and fork lineage
//! ├── wal.log          # open WAL tail
//! ├── segments/        # sealed, immutable segments
//! │   ├── 000001.seg
//! │   └── manifest.json
//! ├── snapshots.json   # snapshot catalog for this store
//! └── access.json      # last-accessed side table (not hashed)
//! ```

use engram_core::types::StoreId;
use std::path::{Path, PathBuf};

/// Paths within one store directory.
#[derive(Debug, Clone)]
pub struct StorePaths {
    root: PathBuf,
}

impl StorePaths {
    /// Paths for `store_id` under the data directory `data_root`.
    pub fn new(data_root: impl AsRef<Path>, store_id: &StoreId) -> Self {
        StorePaths {
            root: data_root.as_ref().join(store_id.as_str()),
        }
    }

    /// The store directory itself.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `manifest.json`: store identity and fork lineage.
    pub fn manifest(&self) -> PathBuf {
        self.root.join("manifest.json")
    }

    /// `wal.log`: the open WAL tail.
    pub fn wal(&self) -> PathBuf {
        self.root.join("wal.log")
    }

    /// `segments/`: sealed segment files.
    pub fn segments_dir(&self) -> PathBuf {
        self.root.join("segments")
    }

    /// `snapshots.json`: snapshot catalog.
    pub fn snapshots(&self) -> PathBuf {
        self.root.join("snapshots.json")
    }

    /// `access.json`: last-accessed side table.
    pub fn access(&self) -> PathBuf {
        self.root.join("access.json")
    }

    /// True when a store has been initialized here.
    pub fn exists(&self) -> bool {
        self.manifest().exists()
    }

    /// Create the directory structure.
    pub fn create_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.segments_dir())?;
        Ok(())
    }
}

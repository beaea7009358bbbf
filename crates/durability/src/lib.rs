//! # engram-durability
//!
//! Persistence layer for the Engram memory store: the per-store
//! write-ahead log, sealed segments, manifests, the snapshot catalog,
//! and the last-accessed side table.
//!
//! The WAL is the source of truth. Everything else in the process
//! (latest-version index, vector index, text index, Merkle tree) is a
//! deterministic function of the log and can be rebuilt by replay.

pub mod access;
pub mod frame;
pub mod log;
pub mod manifest;
pub mod paths;
pub mod segment;
pub mod snapshot;
pub mod wal;

pub use access::AccessTable;
pub use frame::{decode_frame, encode_frame, FrameDecode};
pub use log::{LogBase, StoreLog};
pub use manifest::{write_atomic, SegmentCatalog, StoreManifest};
pub use paths::StorePaths;
pub use segment::SegmentMeta;
pub use snapshot::{SnapshotCatalog, SnapshotEntry};
pub use wal::WalTail;

//! The per-store log: sealed segments plus the open WAL tail.
//!
//! `StoreLog` owns everything under `segments/` and `wal.log` for one
//! store. Appends go to the tail; once the tail accumulates
//! [`SEAL_RECORD_LIMIT`] records or [`SEAL_BYTE_LIMIT`] bytes it is
//! sealed into an immutable segment and the tail restarts empty.
//!
//! A fork's log holds only the store's *own* records; the inherited
//! prefix stays in the source's files and is overlaid by the engine at
//! replay time. `LogBase` carries the chain state at the boundary.

use crate::manifest::SegmentCatalog;
use crate::paths::StorePaths;
use crate::segment::{self, SegmentMeta};
use crate::wal::WalTail;
use engram_core::error::{EngramError, Result};
use engram_core::hash::Hash256;
use engram_core::record::WalRecord;
use engram_core::types::{StoreId, Timestamp};
use std::path::PathBuf;
use tracing::{debug, info};

/// Seal the tail after this many records.
pub const SEAL_RECORD_LIMIT: usize = 1024;

/// Seal the tail after this many bytes.
pub const SEAL_BYTE_LIMIT: u64 = 4 * 1024 * 1024;

/// Chain state at the start of a store's own history.
///
/// `main` starts at `{ next_seq: 1, prev_hash: ZERO }`; a fork cut at
/// source sequence S starts at `{ next_seq: S + 1, prev_hash: <content
/// hash of the source record at S> }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogBase {
    /// Sequence the first own record must carry
    pub next_seq: u64,
    /// Prev-hash the first own record must carry
    pub prev_hash: Hash256,
}

impl LogBase {
    /// Genesis base for a brand-new "main" store.
    pub fn genesis() -> Self {
        LogBase {
            next_seq: 1,
            prev_hash: Hash256::ZERO,
        }
    }
}

/// Sealed segments + open tail for one store.
pub struct StoreLog {
    store_id: StoreId,
    segments_dir: PathBuf,
    catalog_path: PathBuf,
    wal_path: PathBuf,
    catalog: SegmentCatalog,
    tail: WalTail,
    /// In-memory copy of the tail records; bounded by the seal limits.
    tail_records: Vec<WalRecord>,
    next_seq: u64,
    tail_hash: Hash256,
}

impl StoreLog {
    /// Open the log, verifying catalog continuity and recovering the
    /// tail (torn or corrupt suffixes are truncated).
    pub fn open(paths: &StorePaths, store_id: &StoreId, base: LogBase) -> Result<Self> {
        let segments_dir = paths.segments_dir();
        let catalog_path = segments_dir.join("manifest.json");
        let catalog = SegmentCatalog::load(&catalog_path)?;

        // Chain state at the start of the tail
        let (mut expect_seq, mut expect_prev) = (base.next_seq, base.prev_hash);
        if let Some(first) = catalog.segments.first() {
            if first.first_seq != base.next_seq {
                return Err(EngramError::integrity(format!(
                    "segment catalog starts at seq {}, log base expects {}",
                    first.first_seq, base.next_seq
                )));
            }
        }
        for pair in catalog.segments.windows(2) {
            if pair[1].first_seq != pair[0].last_seq + 1 {
                return Err(EngramError::integrity(format!(
                    "segment gap between {} and {}",
                    pair[0].id, pair[1].id
                )));
            }
        }
        if let Some(last) = catalog.last() {
            expect_seq = last.last_seq + 1;
            expect_prev = last.last_content_hash;
        }

        let (tail, tail_records) = WalTail::open(paths.wal(), store_id, expect_seq, expect_prev)?;
        let (next_seq, tail_hash) = match tail_records.last() {
            Some(last) => (last.seq + 1, last.content_hash),
            None => (expect_seq, expect_prev),
        };

        debug!(
            store = %store_id,
            segments = catalog.segments.len(),
            tail_records = tail_records.len(),
            next_seq,
            "log opened"
        );

        Ok(StoreLog {
            store_id: store_id.clone(),
            segments_dir,
            catalog_path,
            wal_path: paths.wal(),
            catalog,
            tail,
            tail_records,
            next_seq,
            tail_hash,
        })
    }

    /// Sequence the next appended record must carry.
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Content hash of the last record (the next record's prev-hash).
    pub fn tail_hash(&self) -> Hash256 {
        self.tail_hash
    }

    /// Sequence of the last record, if the log has any own records.
    pub fn last_seq(&self) -> Option<u64> {
        if let Some(last) = self.tail_records.last() {
            return Some(last.seq);
        }
        self.catalog.last().map(|s| s.last_seq)
    }

    /// Sealed segment metadata, in order.
    pub fn segments(&self) -> &[SegmentMeta] {
        &self.catalog.segments
    }

    /// Append a prepared record. The record's seq and prev-hash must
    /// match the log head; a mismatch is an engine bug.
    pub fn append(&mut self, record: &WalRecord) -> Result<u64> {
        if record.seq != self.next_seq || record.prev_hash != self.tail_hash {
            return Err(EngramError::internal(format!(
                "append out of order: record seq {} prev {:?}, log expects seq {} prev {:?}",
                record.seq, record.prev_hash, self.next_seq, self.tail_hash
            )));
        }
        self.tail.append(record)?;
        self.next_seq = record.seq + 1;
        self.tail_hash = record.content_hash;
        self.tail_records.push(record.clone());
        Ok(record.seq)
    }

    /// Seal the tail into a segment when it crossed a limit.
    pub fn seal_if_needed(&mut self) -> Result<bool> {
        if self.tail_records.len() < SEAL_RECORD_LIMIT
            && self.tail.byte_len() < SEAL_BYTE_LIMIT
        {
            return Ok(false);
        }
        self.seal_now()
    }

    /// Seal the tail unconditionally (no-op when empty).
    pub fn seal_now(&mut self) -> Result<bool> {
        if self.tail_records.is_empty() {
            return Ok(false);
        }
        let id = self.catalog.next_segment_id();
        let meta = segment::write_segment(&self.segments_dir, id, &self.tail_records)?;
        info!(
            store = %self.store_id,
            segment = id,
            first_seq = meta.first_seq,
            last_seq = meta.last_seq,
            "sealed WAL tail into segment"
        );
        self.catalog.segments.push(meta);
        self.catalog.save(&self.catalog_path)?;
        self.tail.reset()?;
        self.tail_records.clear();
        Ok(true)
    }

    /// Merge all sealed segments into one. Record bytes are never
    /// rewritten; frames are concatenated into a new segment file and
    /// the catalog swapped atomically. Tombstones are preserved.
    pub fn compact_sealed(&mut self) -> Result<bool> {
        if self.catalog.segments.len() < 2 {
            return Ok(false);
        }
        let mut all = Vec::new();
        for meta in &self.catalog.segments {
            all.extend(segment::read_segment(&self.segments_dir, meta.id, &self.store_id)?);
        }
        let new_id = self.catalog.next_segment_id();
        let merged = segment::write_segment(&self.segments_dir, new_id, &all)?;
        let old: Vec<u64> = self.catalog.segments.iter().map(|s| s.id).collect();

        self.catalog.segments = vec![merged];
        self.catalog.save(&self.catalog_path)?;
        for id in old {
            let _ = std::fs::remove_file(segment::segment_path(&self.segments_dir, id));
        }
        info!(store = %self.store_id, segment = new_id, "compacted sealed segments");
        Ok(true)
    }

    /// All own records: sealed segments (read and verified from disk)
    /// followed by the tail.
    pub fn records(&self) -> Result<Vec<WalRecord>> {
        let mut out = Vec::new();
        for meta in &self.catalog.segments {
            out.extend(segment::read_segment(&self.segments_dir, meta.id, &self.store_id)?);
        }
        out.extend(self.tail_records.iter().cloned());
        Ok(out)
    }

    /// Own records with `seq <= max_seq`.
    pub fn records_up_to_seq(&self, max_seq: u64) -> Result<Vec<WalRecord>> {
        let mut out = self.records()?;
        out.retain(|r| r.seq <= max_seq);
        Ok(out)
    }

    /// Re-read and verify the store's own records straight from disk.
    ///
    /// Unlike [`records`](Self::records), a divergence does not abort:
    /// the scan stops at the first frame that fails decoding, hash
    /// verification, or chain continuity, and reports the sequence
    /// where the log diverged. Used by integrity verification, which
    /// reports rather than errors.
    pub fn scan_verified(&self, base: LogBase) -> Result<(Vec<WalRecord>, Option<u64>)> {
        use crate::frame::{decode_frame, FrameDecode};

        let mut records: Vec<WalRecord> = Vec::new();
        let mut expect_seq = base.next_seq;
        let mut expect_prev = base.prev_hash;

        let mut scan_frames = |frames: &[u8],
                               records: &mut Vec<WalRecord>,
                               expect_seq: &mut u64,
                               expect_prev: &mut Hash256|
         -> Option<u64> {
            let mut offset = 0usize;
            while offset < frames.len() {
                match decode_frame(&frames[offset..], &self.store_id) {
                    Ok(FrameDecode::Complete(record, consumed)) => {
                        if record.seq != *expect_seq || record.prev_hash != *expect_prev {
                            return Some(*expect_seq);
                        }
                        *expect_seq = record.seq + 1;
                        *expect_prev = record.content_hash;
                        offset += consumed;
                        records.push(*record);
                    }
                    _ => return Some(*expect_seq),
                }
            }
            None
        };

        for meta in &self.catalog.segments {
            let path = segment::segment_path(&self.segments_dir, meta.id);
            let bytes = std::fs::read(&path)?;
            if bytes.len() < segment::FOOTER_LEN {
                return Ok((records, Some(expect_seq)));
            }
            let frames = &bytes[..bytes.len() - segment::FOOTER_LEN];
            if let Some(bad) =
                scan_frames(frames, &mut records, &mut expect_seq, &mut expect_prev)
            {
                return Ok((records, Some(bad)));
            }
        }

        if self.wal_path.exists() {
            let bytes = std::fs::read(&self.wal_path)?;
            if let Some(bad) =
                scan_frames(&bytes, &mut records, &mut expect_seq, &mut expect_prev)
            {
                return Ok((records, Some(bad)));
            }
        }

        Ok((records, None))
    }

    /// The cut point for a fork at `at`: sequence and content hash of
    /// the last own record with `timestamp <= at`, or `None` when every
    /// own record is newer.
    pub fn cut_at_timestamp(&self, at: Timestamp) -> Result<Option<(u64, Hash256)>> {
        let mut cut = None;
        for record in self.records()? {
            if record.timestamp <= at {
                cut = Some((record.seq, record.content_hash));
            } else {
                break;
            }
        }
        Ok(cut)
    }
}

//! Sealed, immutable WAL segments.
//!
//! A segment is a run of consecutive WAL frames with a trailing footer
//! that makes the file self-describing:
//!
//! ```text
//! ┌─────────┬─────────┬─────┬────────────────────────────────────────┐
//! │ Frame 1 │ Frame 2 │ ... │ Footer (64 bytes)                      │
//! └─────────┴─────────┴─────┴────────────────────────────────────────┘
//!
//! Footer: magic (4) | first-seq (8) | last-seq (8) | last-ts (8)
//!       | root-hash (32) | frame-count (4)
//! ```
//!
//! `root-hash` is the Merkle root over the segment's frame content
//! hashes. Segments are written once via write-then-rename and never
//! modified; compaction only concatenates the frames of adjacent
//! segments into a new file, it never rewrites record bytes.

use crate::frame::{decode_frame, encode_frame, FrameDecode};
use byteorder::{ByteOrder, LittleEndian};
use engram_core::error::{EngramError, Result};
use engram_core::hash::Hash256;
use engram_core::merkle::merkle_root;
use engram_core::record::WalRecord;
use engram_core::types::{StoreId, Timestamp};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Magic bytes identifying a segment footer: "EGSG".
pub const SEGMENT_MAGIC: [u8; 4] = *b"EGSG";

/// Footer size in bytes.
pub const FOOTER_LEN: usize = 4 + 8 + 8 + 8 + 32 + 4;

/// Catalog entry describing one sealed segment.
///
/// `last_content_hash` is catalog-only state (not in the footer): it
/// lets the log verify chain continuity into the next segment or the
/// tail without re-reading this file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentMeta {
    /// Segment number, monotonically increasing per store
    pub id: u64,
    /// First log sequence in the segment
    pub first_seq: u64,
    /// Last log sequence in the segment
    pub last_seq: u64,
    /// Timestamp of the last record (milliseconds)
    pub last_timestamp_ms: u64,
    /// Merkle root over the segment's frame content hashes
    pub root_hash: Hash256,
    /// Content hash of the last record
    pub last_content_hash: Hash256,
}

/// Path of segment `id` inside the segments directory.
pub fn segment_path(dir: &Path, id: u64) -> PathBuf {
    dir.join(format!("{:06}.seg", id))
}

fn encode_footer(meta: &SegmentMeta) -> [u8; FOOTER_LEN] {
    let mut buf = [0u8; FOOTER_LEN];
    buf[..4].copy_from_slice(&SEGMENT_MAGIC);
    LittleEndian::write_u64(&mut buf[4..12], meta.first_seq);
    LittleEndian::write_u64(&mut buf[12..20], meta.last_seq);
    LittleEndian::write_u64(&mut buf[20..28], meta.last_timestamp_ms);
    buf[28..60].copy_from_slice(meta.root_hash.as_bytes());
    let count = meta.last_seq - meta.first_seq + 1;
    LittleEndian::write_u32(&mut buf[60..64], count as u32);
    buf
}

fn decode_footer(buf: &[u8]) -> Result<(u64, u64, u64, Hash256, u32)> {
    if buf.len() != FOOTER_LEN || buf[..4] != SEGMENT_MAGIC {
        return Err(EngramError::integrity("bad segment footer"));
    }
    let first_seq = LittleEndian::read_u64(&buf[4..12]);
    let last_seq = LittleEndian::read_u64(&buf[12..20]);
    let last_ts = LittleEndian::read_u64(&buf[20..28]);
    let mut root = [0u8; 32];
    root.copy_from_slice(&buf[28..60]);
    let count = LittleEndian::read_u32(&buf[60..64]);
    Ok((first_seq, last_seq, last_ts, Hash256::from_bytes(root), count))
}

/// Seal `records` (a non-empty, chain-consecutive run) into segment
/// `id`, atomically via write-then-rename.
pub fn write_segment(dir: &Path, id: u64, records: &[WalRecord]) -> Result<SegmentMeta> {
    if records.is_empty() {
        return Err(EngramError::internal("refusing to seal an empty segment"));
    }

    let hashes: Vec<Hash256> = records.iter().map(|r| r.content_hash).collect();
    let last = records.last().unwrap();
    let meta = SegmentMeta {
        id,
        first_seq: records[0].seq,
        last_seq: last.seq,
        last_timestamp_ms: last.timestamp.as_millis(),
        root_hash: merkle_root(&hashes),
        last_content_hash: last.content_hash,
    };

    let final_path = segment_path(dir, id);
    let tmp_path = final_path.with_extension("seg.tmp");
    {
        let mut file = File::create(&tmp_path)?;
        for record in records {
            file.write_all(&encode_frame(record))?;
        }
        file.write_all(&encode_footer(&meta))?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp_path, &final_path)?;
    Ok(meta)
}

/// Read and fully verify a sealed segment.
///
/// Checks the footer, every frame's content hash (via frame decode),
/// intra-segment prev-hash continuity, the sequence range, and the
/// Merkle root. Any divergence is an `Integrity` error.
pub fn read_segment(dir: &Path, id: u64, store_id: &StoreId) -> Result<Vec<WalRecord>> {
    let path = segment_path(dir, id);
    let mut buf = Vec::new();
    OpenOptions::new()
        .read(true)
        .open(&path)?
        .read_to_end(&mut buf)?;

    if buf.len() < FOOTER_LEN {
        return Err(EngramError::integrity(format!(
            "segment {} too short for a footer",
            id
        )));
    }
    let (first_seq, last_seq, last_ts, root, count) =
        decode_footer(&buf[buf.len() - FOOTER_LEN..])?;

    let frames = &buf[..buf.len() - FOOTER_LEN];
    let mut records: Vec<WalRecord> = Vec::with_capacity(count as usize);
    let mut offset = 0usize;
    while offset < frames.len() {
        match decode_frame(&frames[offset..], store_id)? {
            FrameDecode::Complete(record, consumed) => {
                if let Some(prev) = records.last() {
                    if record.prev_hash != prev.content_hash || record.seq != prev.seq + 1 {
                        return Err(EngramError::integrity(format!(
                            "chain break inside segment {} at seq {}",
                            id, record.seq
                        )));
                    }
                }
                offset += consumed;
                records.push(*record);
            }
            FrameDecode::Incomplete => {
                return Err(EngramError::integrity(format!(
                    "segment {} ends mid-frame",
                    id
                )));
            }
        }
    }

    if records.len() != count as usize
        || records.first().map(|r| r.seq) != Some(first_seq)
        || records.last().map(|r| r.seq) != Some(last_seq)
        || records.last().map(|r| r.timestamp) != Some(Timestamp::from_millis(last_ts))
    {
        return Err(EngramError::integrity(format!(
            "segment {} footer disagrees with its frames",
            id
        )));
    }

    let hashes: Vec<Hash256> = records.iter().map(|r| r.content_hash).collect();
    if merkle_root(&hashes) != root {
        return Err(EngramError::integrity(format!(
            "segment {} Merkle root mismatch",
            id
        )));
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use engram_core::canonical;
    use engram_core::record::{Memory, RecordPayload};
    use engram_core::types::{Importance, MemoryId};

    fn chain(store: &StoreId, first_seq: u64, n: u64) -> Vec<WalRecord> {
        let mut prev = Hash256::ZERO;
        let mut out = Vec::new();
        for i in 0..n {
            let seq = first_seq + i;
            let memory = Memory {
                id: MemoryId::from_string(format!("m-{}", seq)),
                version: 1,
                category: "seg".into(),
                kind: "fact".into(),
                content: format!("record {}", seq),
                tags: Default::default(),
                importance: Importance::default(),
                cadence: None,
                context: None,
                embedding: None,
                created_at: Timestamp::from_millis(seq * 10),
                updated_at: Timestamp::from_millis(seq * 10),
                archived: false,
            };
            let payload = RecordPayload::Memory(memory);
            let content_hash =
                canonical::content_hash(&payload, store, Timestamp::from_millis(seq * 10), false);
            let record = WalRecord {
                seq,
                timestamp: Timestamp::from_millis(seq * 10),
                store_id: store.clone(),
                prev_hash: prev,
                content_hash,
                deleted: false,
                payload,
            };
            prev = content_hash;
            out.push(record);
        }
        out
    }

    #[test]
    fn test_write_and_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = StoreId::main();
        let records = chain(&store, 1, 5);

        let meta = write_segment(dir.path(), 1, &records).unwrap();
        assert_eq!(meta.first_seq, 1);
        assert_eq!(meta.last_seq, 5);
        assert_eq!(meta.last_content_hash, records[4].content_hash);

        let read = read_segment(dir.path(), 1, &store).unwrap();
        assert_eq!(read, records);
    }

    #[test]
    fn test_empty_seal_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(write_segment(dir.path(), 1, &[]).is_err());
    }

    #[test]
    fn test_flipped_byte_detected() {
        let dir = tempfile::tempdir().unwrap();
        let store = StoreId::main();
        let records = chain(&store, 1, 3);
        write_segment(dir.path(), 1, &records).unwrap();

        let path = segment_path(dir.path(), 1);
        let mut bytes = std::fs::read(&path).unwrap();
        // Flip a byte in the middle of the frame area
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xff;
        std::fs::write(&path, &bytes).unwrap();

        let err = read_segment(dir.path(), 1, &store).unwrap_err();
        assert!(err.is_integrity());
    }

    #[test]
    fn test_truncated_footer_detected() {
        let dir = tempfile::tempdir().unwrap();
        let store = StoreId::main();
        write_segment(dir.path(), 1, &chain(&store, 1, 2)).unwrap();

        let path = segment_path(dir.path(), 1);
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 10]).unwrap();

        assert!(read_segment(dir.path(), 1, &store).is_err());
    }

    #[test]
    fn test_no_tmp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = StoreId::main();
        write_segment(dir.path(), 7, &chain(&store, 1, 2)).unwrap();
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map(|x| x == "tmp").unwrap_or(false))
            .collect();
        assert!(leftovers.is_empty());
    }
}

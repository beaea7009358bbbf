//! The open WAL tail.
//!
//! One `wal.log` file per store holds the records written since the
//! last seal. Appends are atomic at frame granularity: a frame is
//! either fully persisted (write + fsync succeeded) or, after a crash,
//! detected as torn and truncated away on the next open.

use crate::frame::{decode_frame, encode_frame, FrameDecode};
use engram_core::error::{EngramError, Result};
use engram_core::hash::Hash256;
use engram_core::record::WalRecord;
use engram_core::types::StoreId;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Writable handle to a store's open WAL tail.
pub struct WalTail {
    file: File,
    path: PathBuf,
    store_id: StoreId,
    bytes: u64,
    records: u64,
}

impl WalTail {
    /// Open (or create) the tail, replaying and verifying its frames.
    ///
    /// `expect_seq` / `expect_prev` describe the chain state at the end
    /// of the sealed history: the first tail record must carry exactly
    /// that sequence and prev-hash. Scanning stops at the first frame
    /// that fails length, content-hash, or chain checks; everything
    /// from that point on is truncated (a torn or corrupt tail never
    /// poisons the store, it just loses the uncommitted suffix).
    ///
    /// Returns the handle and the valid records, in order.
    pub fn open(
        path: impl AsRef<Path>,
        store_id: &StoreId,
        mut expect_seq: u64,
        mut expect_prev: Hash256,
    ) -> Result<(Self, Vec<WalRecord>)> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)?;

        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;

        let mut records = Vec::new();
        let mut valid_bytes = 0usize;
        let mut offset = 0usize;
        loop {
            match decode_frame(&buf[offset..], store_id) {
                Ok(FrameDecode::Complete(record, consumed)) => {
                    if record.seq != expect_seq || record.prev_hash != expect_prev {
                        warn!(
                            store = %store_id,
                            seq = record.seq,
                            expected = expect_seq,
                            "WAL tail chain break, truncating"
                        );
                        break;
                    }
                    expect_seq += 1;
                    expect_prev = record.content_hash;
                    offset += consumed;
                    valid_bytes = offset;
                    records.push(*record);
                }
                Ok(FrameDecode::Incomplete) => {
                    if offset < buf.len() {
                        warn!(
                            store = %store_id,
                            bytes = buf.len() - offset,
                            "torn frame at WAL tail, truncating"
                        );
                    }
                    break;
                }
                Err(e) => {
                    warn!(store = %store_id, error = %e, "corrupt WAL tail frame, truncating");
                    break;
                }
            }
        }

        if valid_bytes < buf.len() {
            file.set_len(valid_bytes as u64)?;
        }
        file.seek(SeekFrom::End(0))?;

        Ok((
            WalTail {
                file,
                path,
                store_id: store_id.clone(),
                bytes: valid_bytes as u64,
                records: records.len() as u64,
            },
            records,
        ))
    }

    /// Append one record and fsync.
    ///
    /// On any failure the frame is rolled back (best effort) and the
    /// record is NOT committed: the caller must not touch its indexes.
    pub fn append(&mut self, record: &WalRecord) -> Result<()> {
        let frame = encode_frame(record);
        let prior_len = self.bytes;

        let result = self
            .file
            .write_all(&frame)
            .and_then(|_| self.file.sync_data());
        if let Err(e) = result {
            // Roll the partial frame back so the on-disk tail stays clean
            let _ = self.file.set_len(prior_len);
            let _ = self.file.seek(SeekFrom::End(0));
            return Err(EngramError::unavailable_with_source(
                format!("WAL append failed for store {}", self.store_id),
                e,
            ));
        }

        self.bytes += frame.len() as u64;
        self.records += 1;
        Ok(())
    }

    /// Drop every tail frame. Called after the records were sealed into
    /// a segment.
    pub fn reset(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.sync_data()?;
        self.bytes = 0;
        self.records = 0;
        Ok(())
    }

    /// Bytes currently in the tail.
    pub fn byte_len(&self) -> u64 {
        self.bytes
    }

    /// Records currently in the tail.
    pub fn record_count(&self) -> u64 {
        self.records
    }

    /// Path of the tail file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

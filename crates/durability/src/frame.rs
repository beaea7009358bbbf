//! WAL frame wire format.
//!
//! # Frame Layout
//!
//! ```text
//! ┌──────────────────┬──────────┬─────────┬──────────────┬───────────┬──────────────┬─────────┬─────────┐
//! │ frame-length (4) │ kind (1) │ seq (8) │ timestamp (8)│ prev (32) │ content (32) │ del (1) │ payload │
//! └──────────────────┴──────────┴─────────┴──────────────┴───────────┴──────────────┴─────────┴─────────┘
//! ```
//!
//! All integers little-endian. `frame-length` counts the bytes that
//! follow it. The payload is the canonical encoding of the record body;
//! the store id is not written (it is implied by the log's owner) and
//! is re-attached on decode.
//!
//! Decoding recomputes the content hash from the payload and rejects
//! any mismatch, so a flipped byte anywhere in the frame is detected.

use byteorder::{ByteOrder, LittleEndian};
use engram_core::canonical;
use engram_core::error::{EngramError, Result};
use engram_core::hash::Hash256;
use engram_core::record::WalRecord;
use engram_core::types::{StoreId, Timestamp};

/// Fixed bytes after the length prefix, before the payload.
pub const FRAME_HEADER_LEN: usize = 1 + 8 + 8 + 32 + 32 + 1;

/// Upper bound on `frame-length`. Anything larger is corruption.
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// Outcome of attempting to decode one frame from a buffer.
#[derive(Debug)]
pub enum FrameDecode {
    /// A verified record and the total bytes consumed.
    Complete(Box<WalRecord>, usize),
    /// The buffer ends mid-frame: a torn tail write, not corruption.
    Incomplete,
}

/// Encode a record into a wire frame.
pub fn encode_frame(record: &WalRecord) -> Vec<u8> {
    let payload = canonical::encode_payload(&record.payload);
    let frame_len = FRAME_HEADER_LEN + payload.len();
    let mut buf = Vec::with_capacity(4 + frame_len);

    let mut len_bytes = [0u8; 4];
    LittleEndian::write_u32(&mut len_bytes, frame_len as u32);
    buf.extend_from_slice(&len_bytes);

    buf.push(record.kind().as_byte());

    let mut u64_bytes = [0u8; 8];
    LittleEndian::write_u64(&mut u64_bytes, record.seq);
    buf.extend_from_slice(&u64_bytes);
    LittleEndian::write_u64(&mut u64_bytes, record.timestamp.as_millis());
    buf.extend_from_slice(&u64_bytes);

    buf.extend_from_slice(record.prev_hash.as_bytes());
    buf.extend_from_slice(record.content_hash.as_bytes());
    buf.push(record.deleted as u8);
    buf.extend_from_slice(&payload);
    buf
}

/// Decode one frame from the front of `buf`.
///
/// `store_id` is the owner of the log being read; it is re-attached to
/// the record and participates in content-hash verification.
///
/// Returns `Incomplete` when the buffer ends before the frame does,
/// and an error when the frame is malformed or fails hash verification.
pub fn decode_frame(buf: &[u8], store_id: &StoreId) -> Result<FrameDecode> {
    if buf.len() < 4 {
        return Ok(FrameDecode::Incomplete);
    }
    let frame_len = LittleEndian::read_u32(&buf[..4]);
    if frame_len > MAX_FRAME_LEN || (frame_len as usize) < FRAME_HEADER_LEN {
        return Err(EngramError::integrity(format!(
            "implausible frame length {}",
            frame_len
        )));
    }
    let total = 4 + frame_len as usize;
    if buf.len() < total {
        return Ok(FrameDecode::Incomplete);
    }

    let frame = &buf[4..total];
    let seq = LittleEndian::read_u64(&frame[1..9]);
    let timestamp = Timestamp::from_millis(LittleEndian::read_u64(&frame[9..17]));
    let mut prev = [0u8; 32];
    prev.copy_from_slice(&frame[17..49]);
    let mut content = [0u8; 32];
    content.copy_from_slice(&frame[49..81]);
    let deleted = match frame[81] {
        0 => false,
        1 => true,
        other => {
            return Err(EngramError::integrity(format!(
                "bad deleted flag: {}",
                other
            )))
        }
    };

    let payload = canonical::decode_payload(&frame[FRAME_HEADER_LEN..])
        .map_err(|e| EngramError::integrity(format!("frame payload: {}", e)))?;
    if payload.kind().as_byte() != frame[0] {
        return Err(EngramError::integrity(format!(
            "frame kind byte {} disagrees with payload kind {}",
            frame[0],
            payload.kind().as_byte()
        )));
    }

    let record = WalRecord {
        seq,
        timestamp,
        store_id: store_id.clone(),
        prev_hash: Hash256::from_bytes(prev),
        content_hash: Hash256::from_bytes(content),
        deleted,
        payload,
    };

    // Verify the stored content hash against a recomputation
    let expected = canonical::content_hash(
        &record.payload,
        &record.store_id,
        record.timestamp,
        record.deleted,
    );
    if expected != record.content_hash {
        return Err(EngramError::integrity(format!(
            "content hash mismatch at seq {}",
            record.seq
        )));
    }

    Ok(FrameDecode::Complete(Box::new(record), total))
}

//! Canonical byte encoding for hashed payloads.
//!
//! Content hashes must be identical across processes and platforms, so
//! hashed data goes through this codec rather than a general-purpose
//! serializer. Rules:
//!
//! - struct fields are emitted in lexicographic field-name order
//! - strings: u32 big-endian byte length, then UTF-8 bytes
//! - integers: fixed-width big-endian
//! - booleans: one byte, 0 or 1
//! - options: presence byte, then the value when present
//! - sets: u32 big-endian count, then elements in sorted order
//! - embedding vectors: u32 big-endian dimension, then raw
//!   little-endian IEEE-754 f32 components
//!
//! The encoding is decodable: WAL frames carry canonical payload bytes,
//! and decode-then-encode reproduces the exact input (and therefore the
//! content hash).

use crate::cadence::Cadence;
use crate::error::{EngramError, Result};
use crate::hash::{sha256, Hash256};
use crate::record::{Memory, RecordKind, RecordPayload, Relationship, SnapshotMarker};
use crate::types::{
    Importance, MemoryId, RelationshipId, SnapshotId, StoreId, Timestamp,
};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::collections::BTreeSet;

// ============================================================================
// Writer
// ============================================================================

/// Append-only canonical byte writer.
#[derive(Debug, Default)]
pub struct CanonicalWriter {
    buf: Vec<u8>,
}

impl CanonicalWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        CanonicalWriter { buf: Vec::new() }
    }

    /// Consume the writer, yielding the canonical bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn u32(&mut self, v: u32) {
        let mut b = [0u8; 4];
        BigEndian::write_u32(&mut b, v);
        self.buf.extend_from_slice(&b);
    }

    fn u64(&mut self, v: u64) {
        let mut b = [0u8; 8];
        BigEndian::write_u64(&mut b, v);
        self.buf.extend_from_slice(&b);
    }

    fn bool(&mut self, v: bool) {
        self.u8(v as u8);
    }

    fn str(&mut self, s: &str) {
        self.u32(s.len() as u32);
        self.buf.extend_from_slice(s.as_bytes());
    }

    fn opt_str(&mut self, s: Option<&str>) {
        match s {
            Some(s) => {
                self.u8(1);
                self.str(s);
            }
            None => self.u8(0),
        }
    }

    fn string_set(&mut self, set: &BTreeSet<String>) {
        // BTreeSet iterates sorted, which is the canonical order
        self.u32(set.len() as u32);
        for s in set {
            self.str(s);
        }
    }

    fn f32_vec(&mut self, v: &[f32]) {
        self.u32(v.len() as u32);
        let mut b = [0u8; 4];
        for &x in v {
            LittleEndian::write_f32(&mut b, x);
            self.buf.extend_from_slice(&b);
        }
    }

    fn opt_f32_vec(&mut self, v: Option<&Vec<f32>>) {
        match v {
            Some(v) => {
                self.u8(1);
                self.f32_vec(v);
            }
            None => self.u8(0),
        }
    }

    fn opt_cadence(&mut self, c: Option<&Cadence>) {
        match c {
            Some(c) => {
                let (kind, value) = c.as_tag();
                self.u8(1);
                self.u8(kind);
                self.u8(value);
            }
            None => self.u8(0),
        }
    }
}

// ============================================================================
// Reader
// ============================================================================

/// Bounds-checked reader over canonical bytes.
pub struct CanonicalReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> CanonicalReader<'a> {
    /// Wrap a canonical byte slice.
    pub fn new(buf: &'a [u8]) -> Self {
        CanonicalReader { buf, pos: 0 }
    }

    /// True when every byte has been consumed.
    pub fn is_exhausted(&self) -> bool {
        self.pos == self.buf.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.buf.len() {
            return Err(EngramError::serialization(format!(
                "canonical payload truncated at byte {} (wanted {} more)",
                self.pos, n
            )));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(BigEndian::read_u32(self.take(4)?))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(BigEndian::read_u64(self.take(8)?))
    }

    fn bool(&mut self) -> Result<bool> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(EngramError::serialization(format!(
                "bad boolean byte: {}",
                other
            ))),
        }
    }

    fn str(&mut self) -> Result<String> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| EngramError::serialization("canonical string is not UTF-8"))
    }

    fn opt_str(&mut self) -> Result<Option<String>> {
        match self.u8()? {
            0 => Ok(None),
            1 => Ok(Some(self.str()?)),
            other => Err(EngramError::serialization(format!(
                "bad option byte: {}",
                other
            ))),
        }
    }

    fn string_set(&mut self) -> Result<BTreeSet<String>> {
        let count = self.u32()? as usize;
        let mut set = BTreeSet::new();
        for _ in 0..count {
            set.insert(self.str()?);
        }
        Ok(set)
    }

    fn f32_vec(&mut self) -> Result<Vec<f32>> {
        let dim = self.u32()? as usize;
        let bytes = self.take(dim.saturating_mul(4))?;
        let mut v = Vec::with_capacity(dim);
        for chunk in bytes.chunks_exact(4) {
            v.push(LittleEndian::read_f32(chunk));
        }
        Ok(v)
    }

    fn opt_f32_vec(&mut self) -> Result<Option<Vec<f32>>> {
        match self.u8()? {
            0 => Ok(None),
            1 => Ok(Some(self.f32_vec()?)),
            other => Err(EngramError::serialization(format!(
                "bad option byte: {}",
                other
            ))),
        }
    }

    fn opt_cadence(&mut self) -> Result<Option<Cadence>> {
        match self.u8()? {
            0 => Ok(None),
            1 => {
                let kind = self.u8()?;
                let value = self.u8()?;
                Ok(Some(Cadence::from_tag(kind, value)?))
            }
            other => Err(EngramError::serialization(format!(
                "bad option byte: {}",
                other
            ))),
        }
    }
}

// ============================================================================
// Payload encoding
// ============================================================================

fn encode_memory(w: &mut CanonicalWriter, m: &Memory) {
    // Lexicographic field order: archived, cadence, category, content,
    // context, created_at, embedding, id, importance, kind, tags,
    // updated_at, version
    w.bool(m.archived);
    w.opt_cadence(m.cadence.as_ref());
    w.str(&m.category);
    w.str(&m.content);
    w.opt_str(m.context.as_deref());
    w.u64(m.created_at.as_millis());
    w.opt_f32_vec(m.embedding.as_ref());
    w.str(m.id.as_str());
    w.u8(m.importance.get());
    w.str(&m.kind);
    w.string_set(&m.tags);
    w.u64(m.updated_at.as_millis());
    w.u64(m.version);
}

fn decode_memory(r: &mut CanonicalReader<'_>) -> Result<Memory> {
    let archived = r.bool()?;
    let cadence = r.opt_cadence()?;
    let category = r.str()?;
    let content = r.str()?;
    let context = r.opt_str()?;
    let created_at = Timestamp::from_millis(r.u64()?);
    let embedding = r.opt_f32_vec()?;
    let id = MemoryId::from_string(r.str()?);
    let importance = Importance::new(r.u8()?)
        .map_err(|_| EngramError::serialization("importance out of range"))?;
    let kind = r.str()?;
    let tags = r.string_set()?;
    let updated_at = Timestamp::from_millis(r.u64()?);
    let version = r.u64()?;
    Ok(Memory {
        id,
        version,
        category,
        kind,
        content,
        tags,
        importance,
        cadence,
        context,
        embedding,
        created_at,
        updated_at,
        archived,
    })
}

fn encode_relationship(w: &mut CanonicalWriter, rel: &Relationship) {
    // Field order: created_at, from, id, kind, to, version
    w.u64(rel.created_at.as_millis());
    w.str(rel.from.as_str());
    w.str(rel.id.as_str());
    w.u8(rel.kind.as_tag());
    w.str(rel.to.as_str());
    w.u64(rel.version);
}

fn decode_relationship(r: &mut CanonicalReader<'_>) -> Result<Relationship> {
    let created_at = Timestamp::from_millis(r.u64()?);
    let from = MemoryId::from_string(r.str()?);
    let id = RelationshipId::from_string(r.str()?);
    let kind = crate::types::RelationKind::from_tag(r.u8()?)?;
    let to = MemoryId::from_string(r.str()?);
    let version = r.u64()?;
    Ok(Relationship {
        id,
        version,
        from,
        to,
        kind,
        created_at,
    })
}

fn encode_marker(w: &mut CanonicalWriter, marker: &SnapshotMarker) {
    // Field order: name, snapshot_id
    w.str(&marker.name);
    w.str(marker.snapshot_id.as_str());
}

fn decode_marker(r: &mut CanonicalReader<'_>) -> Result<SnapshotMarker> {
    let name = r.str()?;
    let snapshot_id = SnapshotId::from_string(r.str()?);
    Ok(SnapshotMarker { snapshot_id, name })
}

/// Encode a record payload to canonical bytes (kind byte + body).
pub fn encode_payload(payload: &RecordPayload) -> Vec<u8> {
    let mut w = CanonicalWriter::new();
    w.u8(payload.kind().as_byte());
    match payload {
        RecordPayload::Memory(m) => encode_memory(&mut w, m),
        RecordPayload::Relationship(rel) => encode_relationship(&mut w, rel),
        RecordPayload::SnapshotMarker(marker) => encode_marker(&mut w, marker),
    }
    w.into_bytes()
}

/// Decode canonical payload bytes. Rejects trailing garbage.
pub fn decode_payload(bytes: &[u8]) -> Result<RecordPayload> {
    let mut r = CanonicalReader::new(bytes);
    let kind = r.u8()?;
    let kind = RecordKind::from_byte(kind)
        .ok_or_else(|| EngramError::serialization(format!("unknown record kind: {}", kind)))?;
    let payload = match kind {
        RecordKind::Memory => RecordPayload::Memory(decode_memory(&mut r)?),
        RecordKind::Relationship => RecordPayload::Relationship(decode_relationship(&mut r)?),
        RecordKind::SnapshotMarker => RecordPayload::SnapshotMarker(decode_marker(&mut r)?),
    };
    if !r.is_exhausted() {
        return Err(EngramError::serialization(
            "trailing bytes after canonical payload",
        ));
    }
    Ok(payload)
}

// ============================================================================
// Content hash input
// ============================================================================

/// Compute the content hash of a record from its hashed parts:
/// `(kind, id, version, payload, store_id, timestamp, deleted)`,
/// emitted in lexicographic field order. `prev_hash` and the log
/// sequence are excluded by design.
pub fn content_hash(
    payload: &RecordPayload,
    store_id: &StoreId,
    timestamp: Timestamp,
    deleted: bool,
) -> Hash256 {
    let mut w = CanonicalWriter::new();
    // Field order: deleted, id, kind, payload, store_id, timestamp, version
    w.bool(deleted);
    w.str(payload.entity_id());
    w.u8(payload.kind().as_byte());
    let body = encode_payload(payload);
    w.u32(body.len() as u32);
    w.buf.extend_from_slice(&body);
    w.str(store_id.as_str());
    w.u64(timestamp.as_millis());
    w.u64(payload.version());
    sha256(&w.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RelationKind;
    use proptest::prelude::*;

    fn sample_memory() -> Memory {
        Memory {
            id: MemoryId::from_string("11111111-2222-3333-4444-555555555555"),
            version: 3,
            category: "preferences".into(),
            kind: "fact".into(),
            content: "prefers dark roast coffee".into(),
            tags: ["coffee".to_string(), "food".to_string()].into_iter().collect(),
            importance: Importance::new(7).unwrap(),
            cadence: Some(Cadence::Weekly),
            context: Some("mentioned during standup".into()),
            embedding: Some(vec![0.25, -0.5, 1.0]),
            created_at: Timestamp::from_millis(1_700_000_000_000),
            updated_at: Timestamp::from_millis(1_700_000_060_000),
            archived: false,
        }
    }

    fn sample_relationship() -> Relationship {
        Relationship {
            id: RelationshipId::from_string("r-1"),
            version: 1,
            from: MemoryId::from_string("m-a"),
            to: MemoryId::from_string("m-b"),
            kind: RelationKind::Supersedes,
            created_at: Timestamp::from_millis(42),
        }
    }

    #[test]
    fn test_memory_round_trip() {
        let payload = RecordPayload::Memory(sample_memory());
        let bytes = encode_payload(&payload);
        let decoded = decode_payload(&bytes).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_relationship_round_trip() {
        let payload = RecordPayload::Relationship(sample_relationship());
        let bytes = encode_payload(&payload);
        assert_eq!(decode_payload(&bytes).unwrap(), payload);
    }

    #[test]
    fn test_marker_round_trip() {
        let payload = RecordPayload::SnapshotMarker(SnapshotMarker {
            snapshot_id: SnapshotId::from_string("s-9"),
            name: "before-cleanup".into(),
        });
        let bytes = encode_payload(&payload);
        assert_eq!(decode_payload(&bytes).unwrap(), payload);
    }

    #[test]
    fn test_round_trip_preserves_content_hash() {
        let payload = RecordPayload::Memory(sample_memory());
        let store = StoreId::main();
        let ts = Timestamp::from_millis(123);
        let before = content_hash(&payload, &store, ts, false);

        let decoded = decode_payload(&encode_payload(&payload)).unwrap();
        let after = content_hash(&decoded, &store, ts, false);
        assert_eq!(before, after);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let payload = RecordPayload::Memory(sample_memory());
        assert_eq!(encode_payload(&payload), encode_payload(&payload));
    }

    #[test]
    fn test_content_hash_covers_deleted_flag() {
        let payload = RecordPayload::Memory(sample_memory());
        let store = StoreId::main();
        let ts = Timestamp::from_millis(5);
        assert_ne!(
            content_hash(&payload, &store, ts, false),
            content_hash(&payload, &store, ts, true)
        );
    }

    #[test]
    fn test_content_hash_covers_store_id() {
        let payload = RecordPayload::Memory(sample_memory());
        let ts = Timestamp::from_millis(5);
        assert_ne!(
            content_hash(&payload, &StoreId::main(), ts, false),
            content_hash(&payload, &StoreId::from_string("fork-1"), ts, false)
        );
    }

    #[test]
    fn test_decode_rejects_truncation() {
        let bytes = encode_payload(&RecordPayload::Memory(sample_memory()));
        let err = decode_payload(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, EngramError::Serialization { .. }));
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let mut bytes = encode_payload(&RecordPayload::Relationship(sample_relationship()));
        bytes.push(0);
        assert!(decode_payload(&bytes).is_err());
    }

    #[test]
    fn test_decode_rejects_unknown_kind() {
        assert!(decode_payload(&[9]).is_err());
    }

    proptest! {
        #[test]
        fn prop_memory_round_trip(
            content in ".{0,64}",
            category in "[a-z]{1,12}",
            kind in "[a-z]{1,12}",
            tags in proptest::collection::btree_set("[a-z]{1,8}", 0..5),
            importance in 1u8..=10,
            version in 1u64..1000,
            archived in any::<bool>(),
            embedding in proptest::option::of(proptest::collection::vec(-1.0f32..1.0, 0..8)),
        ) {
            let memory = Memory {
                id: MemoryId::new(),
                version,
                category,
                kind,
                content,
                tags,
                importance: Importance::new(importance).unwrap(),
                cadence: None,
                context: None,
                embedding,
                created_at: Timestamp::from_millis(1),
                updated_at: Timestamp::from_millis(2),
                archived,
            };
            let payload = RecordPayload::Memory(memory);
            let decoded = decode_payload(&encode_payload(&payload)).unwrap();
            prop_assert_eq!(&decoded, &payload);

            let store = StoreId::main();
            let ts = Timestamp::from_millis(77);
            prop_assert_eq!(
                content_hash(&payload, &store, ts, false),
                content_hash(&decoded, &store, ts, false)
            );
        }
    }
}

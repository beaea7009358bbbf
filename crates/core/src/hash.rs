//! SHA-256 content and chain hashing.
//!
//! - Content hash: SHA-256 over the canonical bytes of a record's
//!   header and payload (excluding `prev_hash`).
//! - Chain hash: SHA-256 over `prev_hash || content_hash`, linking each
//!   record to its predecessor.
//!
//! The genesis `prev_hash` is the fixed all-zero value.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

/// A 32-byte SHA-256 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The all-zero genesis value.
    pub const ZERO: Hash256 = Hash256([0u8; 32]);

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Wrap raw digest bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Hash256(bytes)
    }

    /// Lowercase hex rendering of the digest.
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(64);
        for b in self.0 {
            out.push(char::from_digit((b >> 4) as u32, 16).unwrap());
            out.push(char::from_digit((b & 0xf) as u32, 16).unwrap());
        }
        out
    }

    /// Parse a 64-character hex digest.
    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 64 {
            return None;
        }
        let mut bytes = [0u8; 32];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let hi = (chunk[0] as char).to_digit(16)?;
            let lo = (chunk[1] as char).to_digit(16)?;
            bytes[i] = ((hi << 4) | lo) as u8;
        }
        Some(Hash256(bytes))
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short prefix is enough to tell digests apart in logs
        write!(f, "Hash256({}..)", &self.to_hex()[..12])
    }
}

// Manifests and snapshot catalogs are JSON; digests travel as hex text.
impl Serialize for Hash256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Hash256::from_hex(&s).ok_or_else(|| D::Error::custom("invalid hex digest"))
    }
}

/// SHA-256 of an arbitrary byte string.
pub fn sha256(bytes: &[u8]) -> Hash256 {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    Hash256(hasher.finalize().into())
}

/// Chain hash linking a record to its predecessor:
/// `SHA-256(prev_hash || content_hash)`.
pub fn chain_hash(prev: &Hash256, content: &Hash256) -> Hash256 {
    let mut hasher = Sha256::new();
    hasher.update(prev.as_bytes());
    hasher.update(content.as_bytes());
    Hash256(hasher.finalize().into())
}

/// Fold a sequence of content hashes into the chain tail, starting from
/// the genesis zero value. Used by integrity verification.
pub fn fold_chain<'a>(hashes: impl IntoIterator<Item = &'a Hash256>) -> Hash256 {
    let mut tail = Hash256::ZERO;
    for h in hashes {
        tail = chain_hash(&tail, h);
    }
    tail
}

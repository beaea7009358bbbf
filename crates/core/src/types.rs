//! Identifiers and small value types shared across the engine.
//!
//! All entity identifiers are opaque strings backed by UUID v4, unique
//! across every store in a deployment. Stores are addressed by
//! `StoreId`, where `"main"` is reserved for the bootstrap store.

use crate::error::{EngramError, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Timestamp
// ============================================================================

/// Milliseconds since the Unix epoch.
///
/// All record timestamps, fork points, and snapshot times use this
/// representation. Conversion to `chrono` is provided for cadence math.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Current wall-clock time.
    pub fn now() -> Self {
        let ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Timestamp(ms)
    }

    /// Construct from raw milliseconds.
    pub fn from_millis(ms: u64) -> Self {
        Timestamp(ms)
    }

    /// Raw milliseconds since epoch.
    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Convert to a UTC datetime. Out-of-range values clamp to epoch.
    pub fn to_datetime(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.0 as i64)
            .single()
            .unwrap_or_else(|| Utc.timestamp_millis_opt(0).single().unwrap())
    }

    /// This timestamp shifted forward by `ms` milliseconds.
    pub fn plus_millis(&self, ms: u64) -> Self {
        Timestamp(self.0.saturating_add(ms))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_datetime().to_rfc3339())
    }
}

// ============================================================================
// Entity identifiers
// ============================================================================

/// Opaque memory identifier (UUID v4 text).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryId(String);

impl MemoryId {
    /// Allocate a fresh identifier.
    pub fn new() -> Self {
        MemoryId(Uuid::new_v4().to_string())
    }

    /// Wrap an existing identifier string.
    pub fn from_string(s: impl Into<String>) -> Self {
        MemoryId(s.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MemoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for MemoryId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(MemoryId(s.to_string()))
    }
}

/// Opaque relationship identifier (UUID v4 text).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationshipId(String);

impl RelationshipId {
    /// Allocate a fresh identifier.
    pub fn new() -> Self {
        RelationshipId(Uuid::new_v4().to_string())
    }

    /// Wrap an existing identifier string.
    pub fn from_string(s: impl Into<String>) -> Self {
        RelationshipId(s.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RelationshipId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RelationshipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque snapshot identifier (UUID v4 text).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(String);

impl SnapshotId {
    /// Allocate a fresh identifier.
    pub fn new() -> Self {
        SnapshotId(Uuid::new_v4().to_string())
    }

    /// Wrap an existing identifier string.
    pub fn from_string(s: impl Into<String>) -> Self {
        SnapshotId(s.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// StoreId
// ============================================================================

/// Reserved identifier of the bootstrap store.
pub const MAIN_STORE: &str = "main";

/// Identifier of a logical store: `"main"` or a fork UUID.
///
/// `"main"` is reserved; it is created at bootstrap and can never be
/// deleted. Forks are addressed by the UUID allocated at fork time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreId(String);

impl StoreId {
    /// The reserved "main" store.
    pub fn main() -> Self {
        StoreId(MAIN_STORE.to_string())
    }

    /// Allocate a fresh fork identifier.
    pub fn new_fork() -> Self {
        StoreId(Uuid::new_v4().to_string())
    }

    /// Wrap an existing identifier string.
    pub fn from_string(s: impl Into<String>) -> Self {
        StoreId(s.into())
    }

    /// True when this is the reserved "main" store.
    pub fn is_main(&self) -> bool {
        self.0 == MAIN_STORE
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for StoreId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(StoreId(s.to_string()))
    }
}

// ============================================================================
// RelationKind
// ============================================================================

/// Typed relationship between two memories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// General association
    RelatedTo,
    /// The `from` memory replaces the `to` memory
    Supersedes,
    /// The two memories disagree
    Contradicts,
    /// The `from` memory adds detail to the `to` memory
    Elaborates,
    /// The `from` memory cites the `to` memory
    References,
}

impl RelationKind {
    /// All kinds, in wire order.
    pub const ALL: [RelationKind; 5] = [
        RelationKind::RelatedTo,
        RelationKind::Supersedes,
        RelationKind::Contradicts,
        RelationKind::Elaborates,
        RelationKind::References,
    ];

    /// Wire name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::RelatedTo => "related_to",
            RelationKind::Supersedes => "supersedes",
            RelationKind::Contradicts => "contradicts",
            RelationKind::Elaborates => "elaborates",
            RelationKind::References => "references",
        }
    }

    /// Parse a wire name. Unknown kinds are an `InvalidArg` error.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "related_to" => Ok(RelationKind::RelatedTo),
            "supersedes" => Ok(RelationKind::Supersedes),
            "contradicts" => Ok(RelationKind::Contradicts),
            "elaborates" => Ok(RelationKind::Elaborates),
            "references" => Ok(RelationKind::References),
            other => Err(EngramError::invalid_arg(format!(
                "unknown relationship kind: {:?}",
                other
            ))),
        }
    }

    /// Stable numeric tag for canonical encoding.
    pub fn as_tag(&self) -> u8 {
        match self {
            RelationKind::RelatedTo => 0,
            RelationKind::Supersedes => 1,
            RelationKind::Contradicts => 2,
            RelationKind::Elaborates => 3,
            RelationKind::References => 4,
        }
    }

    /// Inverse of [`as_tag`](Self::as_tag).
    pub fn from_tag(tag: u8) -> Result<Self> {
        RelationKind::ALL
            .get(tag as usize)
            .copied()
            .ok_or_else(|| {
                EngramError::serialization(format!("unknown relationship tag: {}", tag))
            })
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Importance
// ============================================================================

/// Memory importance in the inclusive range 1..=10.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Importance(u8);

impl Importance {
    /// Validate and construct. Values outside 1..=10 are rejected.
    pub fn new(value: u8) -> Result<Self> {
        if (1..=10).contains(&value) {
            Ok(Importance(value))
        } else {
            Err(EngramError::invalid_arg(format!(
                "importance must be 1..=10, got {}",
                value
            )))
        }
    }

    /// The raw value.
    pub fn get(&self) -> u8 {
        self.0
    }
}

impl Default for Importance {
    fn default() -> Self {
        Importance(5)
    }
}

impl fmt::Display for Importance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(MemoryId::new(), MemoryId::new());
        assert_ne!(RelationshipId::new(), RelationshipId::new());
        assert_ne!(StoreId::new_fork(), StoreId::new_fork());
    }

    #[test]
    fn test_main_store_id() {
        let main = StoreId::main();
        assert!(main.is_main());
        assert_eq!(main.as_str(), "main");
        assert!(!StoreId::new_fork().is_main());
    }

    #[test]
    fn test_timestamp_ordering() {
        let a = Timestamp::from_millis(1_000);
        let b = Timestamp::from_millis(2_000);
        assert!(a < b);
        assert_eq!(a.plus_millis(1_000), b);
    }

    #[test]
    fn test_timestamp_now_advances() {
        let t = Timestamp::now();
        assert!(t.as_millis() > 1_600_000_000_000); // after 2020
    }

    #[test]
    fn test_relation_kind_round_trip() {
        for kind in RelationKind::ALL {
            assert_eq!(RelationKind::parse(kind.as_str()).unwrap(), kind);
            assert_eq!(RelationKind::from_tag(kind.as_tag()).unwrap(), kind);
        }
    }

    #[test]
    fn test_relation_kind_unknown() {
        let err = RelationKind::parse("follows").unwrap_err();
        assert!(err.is_invalid_arg());
    }

    #[test]
    fn test_importance_bounds() {
        assert!(Importance::new(0).is_err());
        assert!(Importance::new(11).is_err());
        assert_eq!(Importance::new(1).unwrap().get(), 1);
        assert_eq!(Importance::new(10).unwrap().get(), 10);
        assert_eq!(Importance::default().get(), 5);
    }

    #[test]
    fn test_memory_id_serde_transparent() {
        let id = MemoryId::from_string("m-1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"m-1\"");
        let back: MemoryId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}

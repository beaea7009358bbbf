//! Integrity verification.
//!
//! Recomputes every content hash, the prev-hash chain, and the Merkle
//! root by streaming a store's full visible history (inherited prefix
//! plus its own segments and WAL tail, re-read from disk), then
//! compares against the live in-memory root. Divergence is reported,
//! never repaired; `rebuild_indexes` is the explicit recovery command.

use engram_core::canonical;
use engram_core::hash::Hash256;
use engram_core::merkle::merkle_root;
use engram_core::record::WalRecord;
use engram_durability::{LogBase, StoreLog};
use serde::Serialize;

/// Result of a verification pass.
#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    /// True when every record verified and the roots agree
    pub valid: bool,
    /// Merkle root recomputed from the verified records
    pub merkle_root: Hash256,
    /// Number of records that verified cleanly
    pub records_verified: u64,
    /// Sequence of the first divergent record, when locatable
    pub first_bad_seq: Option<u64>,
}

/// Verify a store's history against its live Merkle root.
///
/// `inherited` is the fork prefix (empty for "main"); `base` is the
/// chain state where the store's own log begins; `live_root` is the
/// root the in-memory tree currently reports.
pub fn verify_store(
    inherited: &[WalRecord],
    log: &StoreLog,
    base: LogBase,
    live_root: Hash256,
) -> engram_core::Result<IntegrityReport> {
    let mut leaves: Vec<Hash256> = Vec::new();

    // Inherited prefix: recompute each content hash and re-check the
    // chain from genesis.
    let mut expect_seq = inherited.first().map(|r| r.seq).unwrap_or(1);
    let mut expect_prev = Hash256::ZERO;
    for record in inherited {
        let recomputed = canonical::content_hash(
            &record.payload,
            &record.store_id,
            record.timestamp,
            record.deleted,
        );
        if record.seq != expect_seq
            || record.prev_hash != expect_prev
            || recomputed != record.content_hash
        {
            return Ok(IntegrityReport {
                valid: false,
                merkle_root: merkle_root(&leaves),
                records_verified: leaves.len() as u64,
                first_bad_seq: Some(expect_seq),
            });
        }
        leaves.push(record.content_hash);
        expect_seq = record.seq + 1;
        expect_prev = record.content_hash;
    }

    // Own history, re-read and re-verified from disk
    let (own, first_bad_seq) = log.scan_verified(base)?;
    leaves.extend(own.iter().map(|r| r.content_hash));

    let recomputed_root = merkle_root(&leaves);
    let valid = first_bad_seq.is_none() && recomputed_root == live_root;
    Ok(IntegrityReport {
        valid,
        merkle_root: recomputed_root,
        records_verified: leaves.len() as u64,
        first_bad_seq,
    })
}

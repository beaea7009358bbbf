//! Incremental Merkle tree over WAL content hashes.
//!
//! Leaves are record content-hashes in log order. Internal nodes are
//! SHA-256 of the concatenated children; a level with an odd count
//! duplicates its last node. The root is defined at any prefix length,
//! which is what makes snapshots and fork points O(1) captures.
//!
//! The builder is incremental: `append` does O(log N) work by
//! propagating completed pairs upward, and `root` folds the pending
//! odd tails in O(log N) without touching stored levels.

use crate::hash::{sha256, Hash256};

/// Hash of an internal node: SHA-256 of the two child digests.
pub fn node_hash(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut bytes = [0u8; 64];
    bytes[..32].copy_from_slice(left.as_bytes());
    bytes[32..].copy_from_slice(right.as_bytes());
    sha256(&bytes)
}

/// Incremental Merkle tree builder.
///
/// `levels[0]` holds the leaves; `levels[k + 1]` holds the parents of
/// the *completed* pairs of `levels[k]`. Unpaired tail nodes are not
/// stored upward; `root` folds them on the fly with duplicate-last
/// semantics.
#[derive(Debug, Clone, Default)]
pub struct MerkleTree {
    levels: Vec<Vec<Hash256>>,
}

impl MerkleTree {
    /// Create an empty tree. The empty root is `Hash256::ZERO`.
    pub fn new() -> Self {
        MerkleTree { levels: Vec::new() }
    }

    /// Number of leaves appended so far.
    pub fn leaf_count(&self) -> usize {
        self.levels.first().map(|l| l.len()).unwrap_or(0)
    }

    /// Append a leaf (a record content hash).
    pub fn append(&mut self, leaf: Hash256) {
        if self.levels.is_empty() {
            self.levels.push(Vec::new());
        }
        self.levels[0].push(leaf);

        // Propagate every pair completed by this append
        let mut level = 0;
        while self.levels[level].len() % 2 == 0 {
            let parent = {
                let nodes = &self.levels[level];
                node_hash(&nodes[nodes.len() - 2], &nodes[nodes.len() - 1])
            };
            if self.levels.len() == level + 1 {
                self.levels.push(Vec::new());
            }
            self.levels[level + 1].push(parent);
            level += 1;
        }
    }

    /// Current root. O(log N); does not mutate the tree.
    pub fn root(&self) -> Hash256 {
        if self.leaf_count() == 0 {
            return Hash256::ZERO;
        }
        // `carry` is the ephemeral node produced below the current
        // level by unpaired tails.
        let mut carry: Option<Hash256> = None;
        let mut level = 0;
        loop {
            let stored: &[Hash256] = self
                .levels
                .get(level)
                .map(|v| v.as_slice())
                .unwrap_or(&[]);
            let virtual_len = stored.len() + usize::from(carry.is_some());
            if virtual_len == 1 {
                return carry.unwrap_or(stored[0]);
            }
            carry = match (stored.len() % 2 == 1, carry) {
                // Unpaired stored tail joins the carry from below
                (true, Some(c)) => Some(node_hash(stored.last().unwrap(), &c)),
                // Unpaired stored tail duplicates itself
                (true, None) => {
                    let last = stored.last().unwrap();
                    Some(node_hash(last, last))
                }
                // Carry alone on an odd virtual level duplicates itself
                (false, Some(c)) => Some(node_hash(&c, &c)),
                (false, None) => None,
            };
            level += 1;
        }
    }
}

/// One-shot root over a leaf sequence. Used by integrity verification
/// to recompute the expected root while streaming the log.
pub fn merkle_root(leaves: &[Hash256]) -> Hash256 {
    if leaves.is_empty() {
        return Hash256::ZERO;
    }
    let mut level: Vec<Hash256> = leaves.to_vec();
    while level.len() > 1 {
        let mut next = Vec::with_capacity((level.len() + 1) / 2);
        for pair in level.chunks(2) {
            let left = &pair[0];
            let right = pair.get(1).unwrap_or(left);
            next.push(node_hash(left, right));
        }
        level = next;
    }
    level[0]
}

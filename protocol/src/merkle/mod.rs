//! # Merkle Tree
//!
//! Content-addressed integrity for any ordered sequence of strings. This
//! one primitive backs three different commitments in the protocol:
//!
//! - the transaction merkle root in every block header,
//! - the validator-set root each validator proves membership against,
//! - the per-period vote root the voting engine maintains.
//!
//! ## Construction
//!
//! ```text
//!            root = H(n01 || n23)
//!           /                    \
//!   n01 = H(l0 || l1)      n23 = H(l2 || l2)   <- lone node pairs with itself
//!    /        \              |
//!  l0=H(a)   l1=H(b)      l2=H(c)
//! ```
//!
//! Leaves are the domain-separated SHA3-256 of each item; every internal
//! node hashes the concatenation of its children. A lone trailing node at
//! any layer is paired with itself, so the tree is always binary.
//!
//! ## Proofs
//!
//! A proof for leaf `i` carries one sibling per layer. Verification climbs
//! from the leaf using the bit pattern of `i`: bit `k` set means the
//! running hash is the *right* child at layer `k`, so the sibling goes on
//! the left. An empty sibling list degenerates to `leaf == root`.
//!
//! ## Caching
//!
//! Hashing dominates tree construction, and vote sets re-build trees with
//! heavily overlapping content every period. A bounded LRU maps leaf bytes
//! and `left:right` pairs to their digests. The cache is content-addressed,
//! so eviction can cost speed but never correctness.

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::hash::domain_hash;

/// Maximum number of memoized digests before the LRU starts evicting.
pub const MAX_CACHE_SIZE: usize = 10_000;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from merkle tree operations.
#[derive(Debug, Error)]
pub enum MerkleError {
    /// Input sequence was empty or contained an empty string.
    #[error("invalid merkle input: {0}")]
    InvalidInput(&'static str),

    /// Requested a proof for a leaf index outside the tree.
    #[error("leaf index {index} out of range (tree has {leaves} leaves)")]
    IndexOutOfRange { index: usize, leaves: usize },

    /// Proof or root string was not valid 32-byte hex.
    #[error("malformed hash encoding: {0}")]
    MalformedHash(String),
}

// ---------------------------------------------------------------------------
// Proof
// ---------------------------------------------------------------------------

/// An inclusion proof for a single leaf.
///
/// Serializable because validators embed their set-membership proofs in
/// blocks. All hashes travel hex-encoded, matching the JSON persistence
/// convention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// Index of the proven leaf in the original sequence.
    pub index: usize,
    /// Hex digest of the proven leaf.
    pub hash: String,
    /// One sibling digest per layer, leaf layer first.
    pub siblings: Vec<String>,
}

// ---------------------------------------------------------------------------
// MerkleTree
// ---------------------------------------------------------------------------

/// A merkle tree over an ordered sequence of strings, with a bounded
/// digest cache.
///
/// Not internally synchronized beyond the cache: concurrent use goes
/// through the storage layer's shard mutex; standalone use needs external
/// locking around `create_root`/`generate_proof` pairs.
pub struct MerkleTree {
    /// Leaf digests of the most recent `create_root` call.
    leaves: Vec<[u8; 32]>,
    /// All layers, leaves first, root layer last.
    layers: Vec<Vec<[u8; 32]>>,
    /// Memoized digests keyed by hash preimage.
    cache: Mutex<LruCache<Vec<u8>, [u8; 32]>>,
}

impl Default for MerkleTree {
    fn default() -> Self {
        Self::new()
    }
}

impl MerkleTree {
    /// Creates an empty tree with a fresh cache.
    pub fn new() -> Self {
        Self {
            leaves: Vec::new(),
            layers: Vec::new(),
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(MAX_CACHE_SIZE).expect("cache size is nonzero"),
            )),
        }
    }

    /// Builds the tree over `data` and returns the hex-encoded root.
    ///
    /// The input must be a non-empty sequence of non-empty strings; votes,
    /// transactions, and validator records all serialize to non-empty JSON,
    /// so an empty item here means the caller fed us garbage.
    pub fn create_root<S: AsRef<str>>(&mut self, data: &[S]) -> Result<String, MerkleError> {
        if data.is_empty() {
            return Err(MerkleError::InvalidInput("empty input sequence"));
        }
        if data.iter().any(|item| item.as_ref().is_empty()) {
            return Err(MerkleError::InvalidInput("empty item in sequence"));
        }

        let leaves: Vec<[u8; 32]> = data
            .iter()
            .map(|item| self.leaf_hash(item.as_ref().as_bytes()))
            .collect();

        let mut layers = vec![leaves.clone()];
        while layers.last().expect("at least one layer").len() > 1 {
            let current = layers.last().expect("at least one layer");
            let mut next = Vec::with_capacity((current.len() + 1) / 2);
            for chunk in current.chunks(2) {
                let left = &chunk[0];
                // A lone trailing node is paired with itself.
                let right = chunk.get(1).unwrap_or(left);
                next.push(self.node_hash(left, right));
            }
            layers.push(next);
        }

        let root = layers.last().expect("at least one layer")[0];
        self.leaves = leaves;
        self.layers = layers;
        Ok(hex::encode(root))
    }

    /// Generates an inclusion proof for the leaf at `index`.
    ///
    /// Requires a prior successful `create_root` on this tree instance.
    /// Each layer contributes the node's sibling; where the sibling is
    /// missing (lone trailing node), the node's own digest stands in.
    pub fn generate_proof(&self, index: usize) -> Result<MerkleProof, MerkleError> {
        if index >= self.leaves.len() {
            return Err(MerkleError::IndexOutOfRange {
                index,
                leaves: self.leaves.len(),
            });
        }

        let mut siblings = Vec::with_capacity(self.layers.len());
        let mut cursor = index;
        // Walk every layer except the root layer.
        for layer in &self.layers[..self.layers.len() - 1] {
            let sibling_index = cursor ^ 1;
            let sibling = layer.get(sibling_index).unwrap_or(&layer[cursor]);
            siblings.push(hex::encode(sibling));
            cursor /= 2;
        }

        Ok(MerkleProof {
            index,
            hash: hex::encode(self.leaves[index]),
            siblings,
        })
    }

    /// Verifies `proof` for `data` against a hex-encoded `root`.
    ///
    /// Re-derives the leaf digest from `data` (a proof whose stored hash
    /// disagrees with the data is rejected immediately), then climbs the
    /// sibling list using the bit pattern of `proof.index`: bit `k` set
    /// means the running hash was the right child at layer `k`.
    ///
    /// An empty sibling list is the single-leaf degenerate case: accept
    /// iff the leaf digest equals the root.
    pub fn verify_proof(
        &self,
        proof: &MerkleProof,
        data: &str,
        root: &str,
    ) -> Result<bool, MerkleError> {
        let root = decode_digest(root)?;
        let leaf = self.leaf_hash(data.as_bytes());
        if hex::encode(leaf) != proof.hash {
            return Ok(false);
        }
        if proof.siblings.is_empty() {
            return Ok(leaf == root);
        }

        let mut current = leaf;
        for (layer, sibling_hex) in proof.siblings.iter().enumerate() {
            let sibling = decode_digest(sibling_hex)?;
            let bit = (proof.index >> layer) & 1;
            current = if bit == 1 {
                self.node_hash(&sibling, &current)
            } else {
                self.node_hash(&current, &sibling)
            };
        }

        Ok(current == root)
    }

    /// Number of leaves in the last-built tree.
    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Resets leaves, layers, and the digest cache.
    pub fn clear_state(&mut self) {
        self.leaves.clear();
        self.layers.clear();
        self.cache.lock().clear();
    }

    // -- Hashing ------------------------------------------------------------

    fn leaf_hash(&self, data: &[u8]) -> [u8; 32] {
        let mut key = Vec::with_capacity(data.len() + 1);
        key.push(b'L');
        key.extend_from_slice(data);
        self.cached_hash(key, "merkle.leaf", data.to_vec())
    }

    fn node_hash(&self, left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
        let mut preimage = Vec::with_capacity(64);
        preimage.extend_from_slice(left);
        preimage.extend_from_slice(right);
        let mut key = Vec::with_capacity(65);
        key.push(b'N');
        key.extend_from_slice(&preimage);
        self.cached_hash(key, "merkle.node", preimage)
    }

    fn cached_hash(&self, key: Vec<u8>, context: &str, preimage: Vec<u8>) -> [u8; 32] {
        let mut cache = self.cache.lock();
        if let Some(digest) = cache.get(&key) {
            return *digest;
        }
        let digest = domain_hash(context, &preimage);
        cache.put(key, digest);
        digest
    }
}

/// One-shot root computation over a string sequence.
///
/// Convenience for call sites that only need the root and no proofs (vote
/// aggregation, block building).
pub fn compute_root<S: AsRef<str>>(data: &[S]) -> Result<String, MerkleError> {
    MerkleTree::new().create_root(data)
}

fn decode_digest(hex_str: &str) -> Result<[u8; 32], MerkleError> {
    let bytes = hex::decode(hex_str).map_err(|_| MerkleError::MalformedHash(hex_str.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| MerkleError::MalformedHash(hex_str.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

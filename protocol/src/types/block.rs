//! # Blocks
//!
//! A block commits to three independent merkle trees: the transactions it
//! applies, the validator set that attested to it, and the votes it
//! carries. The header is the only thing that gets hashed and mined; the
//! bodies are verified against the header's commitments.
//!
//! ## Canonical hash
//!
//! `hash = SHA3-256(canonical(header with hash = ""))`, domain-separated.
//! The canonical form is the JSON serialization of [`BlockHeader`] with
//! the `hash` field set to the empty string. serde_json emits struct
//! fields in declaration order with no extra whitespace, so the field
//! order below is consensus-critical and FROZEN — reordering fields is a
//! hard fork, and the `canonical_form_is_frozen` test will catch you.

use serde::{Deserialize, Serialize};

use crate::config::INITIAL_SUPPLY;
use crate::crypto::hash::domain_hash;
use crate::merkle;
use crate::types::amount::tag_to_units;
use crate::types::transaction::{Transaction, TransactionBuilder, TransactionType};
use crate::types::validator::Validator;
use crate::types::vote::Vote;

/// Coinbase message embedded in the genesis block. A timestamped,
/// tamper-evident record of when and why the network was created.
/// (Satoshi had "The Times 03/Jan/2009"; we have this.)
pub const GENESIS_COINBASE_MESSAGE: &str = "H3TAG/2026: one person, one sqrt(coin), one vote";

/// Well-known address holding the genesis allocation.
pub const GENESIS_ADDRESS: &str =
    "h3:0000000000000000000000000000000000000000000000000000000000000000";

/// All-zero hash marking "no predecessor".
pub const ZERO_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

// ---------------------------------------------------------------------------
// BlockHeader
// ---------------------------------------------------------------------------

/// Block metadata and chain linkage. Field order is consensus-critical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Header format version.
    pub version: u32,
    /// Block height (0-indexed, genesis = 0).
    pub height: u64,
    /// Hash of the predecessor's header. [`ZERO_HASH`] for genesis.
    pub previous_hash: String,
    /// Merkle root over transaction hashes.
    pub merkle_root: String,
    /// Merkle root over the canonical validator records.
    pub validator_merkle_root: String,
    /// Merkle root over the canonical vote records.
    pub votes_merkle_root: String,
    /// Production time, milliseconds since epoch.
    pub timestamp: u64,
    /// PoW difficulty this block was mined at.
    pub difficulty: u64,
    /// PoW nonce.
    pub nonce: u64,
    /// Address of the miner that produced this block.
    pub miner: String,
    /// SHA3-256 of the canonical header with this field emptied.
    pub hash: String,
}

impl BlockHeader {
    /// Recompute the canonical hash of this header.
    pub fn compute_hash(&self) -> String {
        let mut canonical = self.clone();
        canonical.hash = String::new();
        let bytes =
            serde_json::to_vec(&canonical).expect("block header is always serializable");
        hex::encode(domain_hash("block", &bytes))
    }
}

// ---------------------------------------------------------------------------
// Block
// ---------------------------------------------------------------------------

/// A full H3TAG block: header plus the three committed bodies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Metadata and chain linkage.
    pub header: BlockHeader,
    /// Ordered transactions, coinbase first.
    pub transactions: Vec<Transaction>,
    /// Votes included in this block.
    pub votes: Vec<Vote>,
    /// The validator set that attested to this block.
    pub validators: Vec<Validator>,
}

impl Block {
    /// Construct the genesis block: height 0, zeroed predecessor, and a
    /// single coinbase carrying the initial supply to the genesis address.
    pub fn genesis() -> Self {
        let coinbase = TransactionBuilder::new(TransactionType::PowReward)
            .output(tag_to_units(INITIAL_SUPPLY), GENESIS_ADDRESS.to_string())
            .timestamp(0)
            .build();
        let merkle_root = merkle::compute_root(&[coinbase.hash.clone()])
            .expect("genesis coinbase hash is non-empty");

        let mut header = BlockHeader {
            version: 1,
            height: 0,
            previous_hash: ZERO_HASH.to_string(),
            merkle_root,
            validator_merkle_root: String::new(),
            votes_merkle_root: String::new(),
            timestamp: 0,
            difficulty: 1,
            nonce: 0,
            miner: GENESIS_ADDRESS.to_string(),
            hash: String::new(),
        };
        header.hash = header.compute_hash();

        Block {
            header,
            transactions: vec![coinbase],
            votes: Vec::new(),
            validators: Vec::new(),
        }
    }

    /// Construct a block extending `parent` with the given bodies.
    ///
    /// Computes all three merkle commitments and the canonical hash.
    /// `difficulty` and `nonce` come from the miner; this constructor does
    /// not search for a valid nonce.
    pub fn new(
        parent: &Block,
        transactions: Vec<Transaction>,
        votes: Vec<Vote>,
        validators: Vec<Validator>,
        miner: String,
        difficulty: u64,
        nonce: u64,
        timestamp: u64,
    ) -> Self {
        let merkle_root = Self::transactions_root(&transactions);
        let votes_merkle_root = Self::votes_root(&votes);
        let validator_merkle_root = Self::validators_root(&validators);

        let mut header = BlockHeader {
            version: 1,
            height: parent.header.height + 1,
            previous_hash: parent.header.hash.clone(),
            merkle_root,
            validator_merkle_root,
            votes_merkle_root,
            timestamp,
            difficulty,
            nonce,
            miner,
            hash: String::new(),
        };
        header.hash = header.compute_hash();

        Block {
            header,
            transactions,
            votes,
            validators,
        }
    }

    /// Merkle root over transaction hashes; empty string for no
    /// transactions.
    pub fn transactions_root(transactions: &[Transaction]) -> String {
        if transactions.is_empty() {
            return String::new();
        }
        let hashes: Vec<String> = transactions.iter().map(|tx| tx.hash.clone()).collect();
        merkle::compute_root(&hashes).expect("transaction hashes are non-empty")
    }

    /// Merkle root over canonical vote records; empty string for none.
    pub fn votes_root(votes: &[Vote]) -> String {
        if votes.is_empty() {
            return String::new();
        }
        let leaves: Vec<String> = votes.iter().map(Vote::merkle_leaf).collect();
        merkle::compute_root(&leaves).expect("vote leaves are non-empty")
    }

    /// Merkle root over canonical validator records; empty string for
    /// none.
    pub fn validators_root(validators: &[Validator]) -> String {
        if validators.is_empty() {
            return String::new();
        }
        let leaves: Vec<String> = validators.iter().map(Validator::merkle_leaf).collect();
        merkle::compute_root(&leaves).expect("validator leaves are non-empty")
    }

    /// Recompute the header hash from current contents.
    pub fn compute_hash(&self) -> String {
        self.header.compute_hash()
    }

    /// Serialized size of the whole block in bytes, as persisted.
    pub fn size_bytes(&self) -> u64 {
        serde_json::to_vec(self).map(|v| v.len() as u64).unwrap_or(0)
    }

    /// Block height.
    pub fn height(&self) -> u64 {
        self.header.height
    }

    /// `true` if the stored hash matches the recomputed canonical hash.
    pub fn hash_is_valid(&self) -> bool {
        self.header.hash == self.header.compute_hash()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! # Transactions
//!
//! Every state change on the chain is a transaction: a plain transfer, a
//! miner's coinbase (`pow_reward`), or a quadratic-vote commitment. The
//! variant determines which validation rules apply — coinbases have no
//! inputs and are capped by the block subsidy; everything else must
//! balance against the UTXO set.
//!
//! ## Canonical hash
//!
//! The transaction hash is the domain-separated SHA3-256 over the JSON
//! serialization of `{inputs, outputs, timestamp}`. Signature and status
//! are deliberately excluded: the hash identifies the economic content,
//! and the signature covers the hash's preimage rather than the other way
//! around.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::hash::domain_hash;
use crate::crypto::keys::verify_hex;
use crate::types::amount::{serde_string, Units};
use crate::types::now_ms;

// ---------------------------------------------------------------------------
// TransactionType
// ---------------------------------------------------------------------------

/// Discriminant for the operation a transaction represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Value transfer between addresses.
    Transfer,
    /// Coinbase: the single subsidy-issuing transaction placed first in a
    /// block. Zero inputs, one output, amount capped by the halving curve.
    PowReward,
    /// A quadratic-vote commitment locking value behind a governance vote.
    QuadraticVote,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transfer => write!(f, "transfer"),
            Self::PowReward => write!(f, "pow_reward"),
            Self::QuadraticVote => write!(f, "quadratic_vote"),
        }
    }
}

// ---------------------------------------------------------------------------
// TransactionStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// In the mempool, awaiting block inclusion.
    Pending,
    /// Included in a committed block.
    Confirmed,
    /// Rejected by validation.
    Failed,
}

// ---------------------------------------------------------------------------
// Inputs & Outputs
// ---------------------------------------------------------------------------

/// A reference to an unspent output being consumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    /// Hash of the transaction that created the referenced output.
    pub tx_id: String,
    /// Index of the output within that transaction.
    pub output_index: u32,
    /// Declared amount — must equal the referenced UTXO's amount exactly.
    #[serde(with = "serde_string")]
    pub amount: Units,
    /// Address the referenced output was locked to.
    pub address: String,
}

/// A newly created output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    /// Value carried by this output.
    #[serde(with = "serde_string")]
    pub amount: Units,
    /// Destination address.
    pub address: String,
    /// Locking script (opaque to this core).
    pub script: String,
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// A signed H3TAG transaction.
///
/// Field order is part of the canonical serialization and must not change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Canonical hash, hex-encoded. Unique across the chain.
    pub hash: String,
    /// Operation discriminant.
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    /// Transaction format version.
    pub version: u32,
    /// Outputs being consumed. Empty for coinbases.
    pub inputs: Vec<TxInput>,
    /// Outputs being created.
    pub outputs: Vec<TxOutput>,
    /// Fee paid to the miner. Non-coinbase transactions must balance
    /// exactly: `sum(inputs) = sum(outputs) + fee`.
    #[serde(with = "serde_string")]
    pub fee: Units,
    /// Creation time, milliseconds since epoch.
    pub timestamp: u64,
    /// Hex signature over the canonical digest preimage.
    pub signature: String,
    /// Hex public key of the signer.
    pub public_key: String,
    /// Lifecycle state. Not covered by the hash.
    pub status: TransactionStatus,
}

/// The exact structure hashed to produce a transaction's identity.
#[derive(Serialize)]
struct TxDigest<'a> {
    inputs: &'a [TxInput],
    outputs: &'a [TxOutput],
    timestamp: u64,
}

impl Transaction {
    /// Recompute the canonical hash from the economic content.
    pub fn compute_hash(&self) -> String {
        compute_tx_hash(&self.inputs, &self.outputs, self.timestamp)
    }

    /// The byte string signatures cover: the canonical digest preimage.
    pub fn signing_payload(&self) -> Vec<u8> {
        let digest = TxDigest {
            inputs: &self.inputs,
            outputs: &self.outputs,
            timestamp: self.timestamp,
        };
        serde_json::to_vec(&digest).expect("transaction digest is always serializable")
    }

    /// Verify the stored signature against the stored public key.
    pub fn verify_signature(&self) -> bool {
        verify_hex(&self.signing_payload(), &self.signature, &self.public_key)
    }

    /// `true` for the subsidy-issuing coinbase variant.
    pub fn is_coinbase(&self) -> bool {
        self.tx_type == TransactionType::PowReward
    }

    /// Total value consumed by inputs. Saturating: a transaction whose
    /// inputs overflow u128 is economically impossible and will fail
    /// conservation anyway.
    pub fn input_sum(&self) -> Units {
        self.inputs
            .iter()
            .fold(0u128, |acc, i| acc.saturating_add(i.amount))
    }

    /// Total value created by outputs.
    pub fn output_sum(&self) -> Units {
        self.outputs
            .iter()
            .fold(0u128, |acc, o| acc.saturating_add(o.amount))
    }

    /// Value conservation: `sum(inputs) = sum(outputs) + fee`, exactly.
    /// Every consumed unit must be accounted for as an output or the fee
    /// — a transaction that silently destroys value is as invalid as one
    /// that creates it. Coinbases are exempt (no inputs by construction).
    /// All sums are checked; an overflowing side never balances.
    pub fn conserves_value(&self) -> bool {
        if self.is_coinbase() {
            return self.inputs.is_empty();
        }
        let inputs = self
            .inputs
            .iter()
            .try_fold(0u128, |acc, i| acc.checked_add(i.amount));
        let spent = self
            .outputs
            .iter()
            .try_fold(0u128, |acc, o| acc.checked_add(o.amount))
            .and_then(|outputs| outputs.checked_add(self.fee));
        match (inputs, spent) {
            (Some(inputs), Some(spent)) => inputs == spent,
            _ => false,
        }
    }

    /// Serialized size in bytes, as persisted.
    pub fn size_bytes(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(0)
    }
}

fn compute_tx_hash(inputs: &[TxInput], outputs: &[TxOutput], timestamp: u64) -> String {
    let digest = TxDigest {
        inputs,
        outputs,
        timestamp,
    };
    let bytes = serde_json::to_vec(&digest).expect("transaction digest is always serializable");
    hex::encode(domain_hash("transaction", &bytes))
}

// ---------------------------------------------------------------------------
// TransactionBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for transactions.
///
/// `build()` computes the canonical hash from the assembled content; the
/// signature is attached afterwards via [`TransactionBuilder::sign_with`]
/// or left empty for externally signed flows.
///
/// # Examples
///
/// ```
/// use h3tag_protocol::types::{TransactionBuilder, TransactionType};
///
/// let tx = TransactionBuilder::new(TransactionType::Transfer)
///     .input("aabb".into(), 0, 1_000, "h3:alice".into())
///     .output(900, "h3:bob".into())
///     .fee(100)
///     .timestamp(1_000_000)
///     .build();
/// assert_eq!(tx.hash, tx.compute_hash());
/// ```
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    tx_type: TransactionType,
    version: u32,
    inputs: Vec<TxInput>,
    outputs: Vec<TxOutput>,
    fee: Units,
    timestamp: Option<u64>,
    public_key: String,
}

impl TransactionBuilder {
    /// Start a new builder for the given transaction type.
    pub fn new(tx_type: TransactionType) -> Self {
        Self {
            tx_type,
            version: 1,
            inputs: Vec::new(),
            outputs: Vec::new(),
            fee: 0,
            timestamp: None,
            public_key: String::new(),
        }
    }

    /// Add an input consuming `(tx_id, output_index)`.
    pub fn input(mut self, tx_id: String, output_index: u32, amount: Units, address: String) -> Self {
        self.inputs.push(TxInput {
            tx_id,
            output_index,
            amount,
            address,
        });
        self
    }

    /// Add an output paying `amount` to `address` with an empty script.
    pub fn output(mut self, amount: Units, address: String) -> Self {
        self.outputs.push(TxOutput {
            amount,
            address,
            script: String::new(),
        });
        self
    }

    /// Set the miner fee.
    pub fn fee(mut self, fee: Units) -> Self {
        self.fee = fee;
        self
    }

    /// Pin the timestamp. Defaults to the current wall clock.
    pub fn timestamp(mut self, ts: u64) -> Self {
        self.timestamp = Some(ts);
        self
    }

    /// Attach the signer's public key (hex).
    pub fn public_key(mut self, key: String) -> Self {
        self.public_key = key;
        self
    }

    /// Assemble the transaction with its canonical hash and no signature.
    pub fn build(self) -> Transaction {
        let timestamp = self.timestamp.unwrap_or_else(now_ms);
        let hash = compute_tx_hash(&self.inputs, &self.outputs, timestamp);
        Transaction {
            hash,
            tx_type: self.tx_type,
            version: self.version,
            inputs: self.inputs,
            outputs: self.outputs,
            fee: self.fee,
            timestamp,
            signature: String::new(),
            public_key: self.public_key,
            status: TransactionStatus::Pending,
        }
    }

    /// Assemble and sign in one step.
    pub fn sign_with(self, keypair: &crate::crypto::keys::Keypair) -> Transaction {
        let mut tx = self.public_key(keypair.public_hex()).build();
        tx.signature = keypair.sign_hex(&tx.signing_payload());
        tx
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::Keypair;

    fn transfer(amount: Units, fee: Units) -> Transaction {
        TransactionBuilder::new(TransactionType::Transfer)
            .input("ab".repeat(32), 0, amount, "h3:alice".into())
            .output(amount - fee, "h3:bob".into())
            .fee(fee)
            .timestamp(1_000_000)
            .build()
    }

    #[test]
    fn hash_is_stable_and_content_addressed() {
        let a = transfer(1_000, 10);
        let b = transfer(1_000, 10);
        assert_eq!(a.hash, b.hash);

        let c = transfer(1_001, 10);
        assert_ne!(a.hash, c.hash);
    }

    #[test]
    fn hash_ignores_signature_and_status() {
        let mut tx = transfer(1_000, 10);
        let original = tx.hash.clone();
        tx.signature = "ff".repeat(64);
        tx.status = TransactionStatus::Confirmed;
        assert_eq!(tx.compute_hash(), original);
    }

    #[test]
    fn hash_covers_timestamp() {
        let a = TransactionBuilder::new(TransactionType::Transfer)
            .output(5, "h3:x".into())
            .timestamp(1)
            .build();
        let b = TransactionBuilder::new(TransactionType::Transfer)
            .output(5, "h3:x".into())
            .timestamp(2)
            .build();
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn sign_and_verify() {
        let kp = Keypair::generate();
        let tx = TransactionBuilder::new(TransactionType::Transfer)
            .input("cd".repeat(32), 1, 500, "h3:alice".into())
            .output(490, "h3:bob".into())
            .fee(10)
            .timestamp(42)
            .sign_with(&kp);
        assert!(tx.verify_signature());

        let mut tampered = tx.clone();
        tampered.outputs[0].amount = 491;
        assert!(!tampered.verify_signature());
    }

    #[test]
    fn conservation_holds_for_balanced_transfer() {
        let tx = transfer(1_000, 10);
        assert!(tx.conserves_value());
    }

    #[test]
    fn conservation_fails_when_outputs_exceed_inputs() {
        let tx = TransactionBuilder::new(TransactionType::Transfer)
            .input("ab".repeat(32), 0, 100, "h3:alice".into())
            .output(200, "h3:bob".into())
            .fee(0)
            .timestamp(1)
            .build();
        assert!(!tx.conserves_value());
    }

    #[test]
    fn conservation_accounts_for_fee() {
        // inputs 100, fee 10: outputs must total exactly 90.
        let over = TransactionBuilder::new(TransactionType::Transfer)
            .input("ab".repeat(32), 0, 100, "h3:a".into())
            .output(91, "h3:b".into())
            .fee(10)
            .timestamp(1)
            .build();
        assert!(!over.conserves_value());
    }

    #[test]
    fn conservation_rejects_destroyed_value() {
        // inputs 100, outputs 80, fee 10: 10 units vanish. The balance is
        // an equality, so under-spending is as invalid as over-spending.
        let leaky = TransactionBuilder::new(TransactionType::Transfer)
            .input("ab".repeat(32), 0, 100, "h3:a".into())
            .output(80, "h3:b".into())
            .fee(10)
            .timestamp(1)
            .build();
        assert!(!leaky.conserves_value());
    }

    #[test]
    fn coinbase_shape() {
        let cb = TransactionBuilder::new(TransactionType::PowReward)
            .output(50, "h3:miner".into())
            .timestamp(7)
            .build();
        assert!(cb.is_coinbase());
        assert!(cb.conserves_value());
        assert!(cb.inputs.is_empty());
    }

    #[test]
    fn type_tags_use_snake_case() {
        // The on-disk tag is part of the tx_type secondary index keyspace.
        let cb = TransactionBuilder::new(TransactionType::PowReward).build();
        let json = serde_json::to_string(&cb).unwrap();
        assert!(json.contains(r#""type":"pow_reward""#));
    }

    #[test]
    fn amounts_round_trip_as_strings() {
        let tx = TransactionBuilder::new(TransactionType::Transfer)
            .input("ab".repeat(32), 0, u128::MAX, "h3:a".into())
            .output(u128::MAX - 1, "h3:b".into())
            .fee(1)
            .timestamp(1)
            .build();
        let json = serde_json::to_string(&tx).unwrap();
        assert!(json.contains(&format!("\"{}\"", u128::MAX)));
        let back: Transaction = serde_json::from_str(&json).unwrap();
        assert_eq!(tx, back);
    }
}

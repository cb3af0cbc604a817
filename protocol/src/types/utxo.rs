//! # UTXO
//!
//! The value ledger. Every output a transaction creates becomes exactly
//! one UTXO; spending flips `spent` to true and nothing ever deletes the
//! record — compaction explicitly skips the `utxo:` prefix so the full
//! audit trail survives.

use serde::{Deserialize, Serialize};

use crate::types::amount::{serde_string, Units};

/// An unspent (or spent-and-retained) transaction output.
///
/// Uniquely identified by `(tx_id, output_index)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    /// Hash of the transaction that created this output.
    pub tx_id: String,
    /// Index of the output within that transaction.
    pub output_index: u32,
    /// Value locked in this output.
    #[serde(with = "serde_string")]
    pub amount: Units,
    /// Address the output is locked to.
    pub address: String,
    /// `true` once consumed. The only field that ever mutates.
    pub spent: bool,
    /// Height of the block that created this output.
    pub block_height: u64,
    /// Locking script (opaque to this core).
    pub script: String,
    /// Confirmations at last read; derived, not authoritative.
    pub confirmations: u64,
}

impl Utxo {
    /// The `(tx_id, output_index)` pair formatted as the storage key
    /// suffix: `<txId>:<outputIndex>`.
    pub fn outpoint(&self) -> String {
        format!("{}:{}", self.tx_id, self.output_index)
    }

    /// Recompute `confirmations` against the current chain height.
    pub fn with_confirmations(mut self, tip_height: u64) -> Self {
        self.confirmations = tip_height.saturating_sub(self.block_height);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utxo(tx_id: &str, index: u32, amount: Units) -> Utxo {
        Utxo {
            tx_id: tx_id.to_string(),
            output_index: index,
            amount,
            address: "h3:alice".to_string(),
            spent: false,
            block_height: 100,
            script: String::new(),
            confirmations: 0,
        }
    }

    #[test]
    fn outpoint_formatting() {
        assert_eq!(utxo("abcd", 2, 5).outpoint(), "abcd:2");
    }

    #[test]
    fn confirmations_derive_from_tip() {
        let u = utxo("abcd", 0, 5).with_confirmations(106);
        assert_eq!(u.confirmations, 6);
        // A UTXO "above" the tip (reorg in progress) clamps to zero.
        assert_eq!(utxo("abcd", 0, 5).with_confirmations(99).confirmations, 0);
    }

    #[test]
    fn amount_round_trips_as_string() {
        let u = utxo("abcd", 0, u128::MAX);
        let json = serde_json::to_string(&u).unwrap();
        assert!(json.contains(&format!("\"{}\"", u128::MAX)));
        let back: Utxo = serde_json::from_str(&json).unwrap();
        assert_eq!(u, back);
    }
}

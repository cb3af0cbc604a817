//! # Validators
//!
//! A validator record is the unit of the block-level validator set: who
//! attested, with what reputation, backed by which merkle proof against
//! the block's validator-set commitment.
//!
//! Reputation moves slowly on purpose — a single update may shift it by at
//! most [`crate::config::MAX_REPUTATION_CHANGE`] points, so neither one
//! glorious day nor one bad outage rewrites a validator's standing.

use serde::{Deserialize, Serialize};

use crate::config::{MAX_REPUTATION_CHANGE, VALIDATOR_INACTIVITY_WINDOW};
use crate::crypto::keys::verify_hex;
use crate::merkle::MerkleProof;

// ---------------------------------------------------------------------------
// ValidatorMetrics
// ---------------------------------------------------------------------------

/// Rolling performance metrics, all in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ValidatorMetrics {
    /// Fraction of heartbeat intervals the validator was reachable.
    pub uptime: f64,
    /// Fraction of voting periods the validator participated in.
    pub vote_participation: f64,
    /// Fraction of assigned block slots actually produced.
    pub block_production: f64,
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

/// A registered validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Validator {
    /// Stable identifier (currently the address; kept separate for
    /// forward compatibility with rotating keys).
    pub id: String,
    /// On-chain address (hex public key).
    pub address: String,
    /// Hex public key used to verify `signature`.
    pub public_key: String,
    /// Last observed activity, milliseconds since epoch.
    pub last_active: u64,
    /// Reputation score in `[0, 100]`.
    pub reputation: u8,
    /// Whether the validator is in the active set.
    pub is_active: bool,
    /// Whether the validator is currently suspended.
    pub is_suspended: bool,
    /// Convenience copy of `metrics.uptime`.
    pub uptime: f64,
    /// Rolling performance metrics.
    pub metrics: ValidatorMetrics,
    /// Opaque attestation payload the validator signed for this block.
    pub validation_data: String,
    /// Hex signature over `validation_data`.
    pub signature: String,
    /// Membership proof against the block's validator-set root.
    pub merkle_proof: Option<MerkleProof>,
    /// The validator-set root this record's proof was built against.
    pub merkle_root: String,
}

impl Validator {
    /// Canonical merkle leaf for the validator-set tree: the identity
    /// fields only. Proof, root, and per-block attestation are excluded —
    /// they depend on the tree, so including them would be circular.
    pub fn merkle_leaf(&self) -> String {
        #[derive(Serialize)]
        struct Leaf<'a> {
            id: &'a str,
            address: &'a str,
            public_key: &'a str,
            reputation: u8,
        }
        serde_json::to_string(&Leaf {
            id: &self.id,
            address: &self.address,
            public_key: &self.public_key,
            reputation: self.reputation,
        })
        .expect("validator leaf is always serializable")
    }

    /// Verify the validator's own signature over its attestation payload.
    pub fn verify_attestation(&self) -> bool {
        verify_hex(
            self.validation_data.as_bytes(),
            &self.signature,
            &self.public_key,
        )
    }

    /// Apply a reputation delta, clamped to the per-update limit and to
    /// the `[0, 100]` range.
    pub fn apply_reputation_change(&mut self, delta: i32) {
        let clamped = delta.clamp(-MAX_REPUTATION_CHANGE, MAX_REPUTATION_CHANGE);
        let next = (self.reputation as i32 + clamped).clamp(0, 100);
        self.reputation = next as u8;
    }

    /// `true` when the validator was active within the inactivity window.
    pub fn is_recently_active(&self, now_ms: u64) -> bool {
        let window = VALIDATOR_INACTIVITY_WINDOW.as_millis() as u64;
        now_ms.saturating_sub(self.last_active) <= window
    }

    /// Weight this validator contributes to a block's validation score.
    pub fn validation_weight(&self) -> f64 {
        f64::from(self.reputation) / 100.0
    }
}

// ---------------------------------------------------------------------------
// Test fixtures
// ---------------------------------------------------------------------------

/// An active validator with a valid self-attestation. Shared by storage,
/// validation, and voting-engine tests.
#[cfg(test)]
pub(crate) fn test_validator(kp: &crate::crypto::keys::Keypair, reputation: u8) -> Validator {
    let validation_data = format!("attest:{}", kp.public_hex());
    Validator {
        id: kp.public_hex(),
        address: kp.public_hex(),
        public_key: kp.public_hex(),
        last_active: 1_000_000,
        reputation,
        is_active: true,
        is_suspended: false,
        uptime: 0.99,
        metrics: ValidatorMetrics {
            uptime: 0.99,
            vote_participation: 0.9,
            block_production: 0.8,
        },
        signature: kp.sign_hex(validation_data.as_bytes()),
        validation_data,
        merkle_proof: None,
        merkle_root: String::new(),
    }
}

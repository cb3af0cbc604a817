//! # Votes
//!
//! A vote commits value behind a governance decision. The committed amount
//! is not the weight: voting power is `⌊√amount⌋`, computed in integer
//! arithmetic, which is what makes the scheme *quadratic* — doubling your
//! influence costs four times the stake. Whales still matter; they just
//! stop being the only thing that matters.
//!
//! The only vote payload this core understands is chain selection
//! ([`ChainVoteData`]): which chain id should win at a fork height, backed
//! by how much value.

use serde::{Deserialize, Serialize};

use crate::crypto::keys::verify_hex;
use crate::types::amount::{serde_string, Units};

// ---------------------------------------------------------------------------
// Quadratic power
// ---------------------------------------------------------------------------

/// Integer square root by Newton's method: the unique `r` with
/// `r² <= n < (r+1)²`. Exact for the full u128 range; no floats involved.
pub fn isqrt(n: u128) -> u128 {
    if n < 2 {
        return n;
    }
    // Initial guess 2^⌈bits/2⌉ >= √n keeps the iteration monotonically
    // decreasing, so the first non-decrease is the floor root.
    let bits = 128 - n.leading_zeros();
    let mut x = 1u128 << ((bits + 1) / 2);
    loop {
        let next = (x + n / x) / 2;
        if next >= x {
            return x;
        }
        x = next;
    }
}

/// Voting power for a committed amount: `⌊√amount⌋`.
pub fn quadratic_power(amount: Units) -> Units {
    isqrt(amount)
}

// ---------------------------------------------------------------------------
// ChainVoteData
// ---------------------------------------------------------------------------

/// Chain-selection payload: the voter's pick at a fork.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVoteData {
    /// Identifier of the chain this vote supports.
    pub target_chain_id: String,
    /// Height at which the chains diverge.
    pub fork_height: u64,
    /// Value committed behind the vote, in base units.
    #[serde(with = "serde_string")]
    pub amount: Units,
}

// ---------------------------------------------------------------------------
// Vote
// ---------------------------------------------------------------------------

/// A single quadratic vote inside a voting period.
///
/// At most one vote per `(period_id, voter)` pair ever exists; the storage
/// key `vote:<period>:<voter>` enforces it physically and the engine
/// enforces it logically before writing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    /// Unique vote identifier.
    pub vote_id: String,
    /// The period this vote belongs to.
    pub period_id: u64,
    /// Voter address (hex public key).
    pub voter: String,
    /// Approval flag for parameter-change style votes.
    pub approve: bool,
    /// Derived weight: `⌊√amount⌋`. Persisted as a decimal string and
    /// filled in by the engine at admission, never by the voter.
    #[serde(with = "serde_string")]
    pub voting_power: Units,
    /// Hex signature over the canonical vote payload.
    pub signature: String,
    /// Hex public key the signature verifies against.
    pub public_key: String,
    /// Submission time, milliseconds since epoch.
    pub timestamp: u64,
    /// Chain height observed at submission.
    pub block_height: u64,
    /// Chain-selection payload. Required by this core.
    pub chain_vote_data: Option<ChainVoteData>,
}

/// The structure a voter signs. Voting power is excluded — it is derived
/// by the engine after signature checks, so it cannot be forged upward.
#[derive(Serialize)]
struct VoteDigest<'a> {
    vote_id: &'a str,
    period_id: u64,
    voter: &'a str,
    approve: bool,
    chain_vote_data: &'a Option<ChainVoteData>,
    timestamp: u64,
    block_height: u64,
}

impl Vote {
    /// The byte string the vote signature covers.
    pub fn signing_payload(&self) -> Vec<u8> {
        let digest = VoteDigest {
            vote_id: &self.vote_id,
            period_id: self.period_id,
            voter: &self.voter,
            approve: self.approve,
            chain_vote_data: &self.chain_vote_data,
            timestamp: self.timestamp,
            block_height: self.block_height,
        };
        serde_json::to_vec(&digest).expect("vote digest is always serializable")
    }

    /// Verify the stored signature against the stored public key.
    pub fn verify_signature(&self) -> bool {
        verify_hex(&self.signing_payload(), &self.signature, &self.public_key)
    }

    /// Committed amount, zero when no chain payload is present.
    pub fn committed_amount(&self) -> Units {
        self.chain_vote_data.as_ref().map(|d| d.amount).unwrap_or(0)
    }

    /// Serialized size in bytes, as persisted. Checked against
    /// `MAX_VOTE_SIZE_BYTES` at admission.
    pub fn size_bytes(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(usize::MAX)
    }

    /// Canonical JSON form used as a merkle leaf for the per-period vote
    /// tree.
    pub fn merkle_leaf(&self) -> String {
        serde_json::to_string(self).expect("vote is always serializable")
    }
}

// ---------------------------------------------------------------------------
// Test fixtures
// ---------------------------------------------------------------------------

/// A well-formed, signed chain-selection vote. Shared by storage and
/// voting-engine tests.
#[cfg(test)]
pub(crate) fn signed_vote(
    kp: &crate::crypto::keys::Keypair,
    period_id: u64,
    amount: Units,
) -> Vote {
    let mut vote = Vote {
        vote_id: format!("vote-{period_id}-{}", kp.public_hex()),
        period_id,
        voter: kp.public_hex(),
        approve: true,
        voting_power: 0,
        signature: String::new(),
        public_key: kp.public_hex(),
        timestamp: 1_000_000,
        block_height: 10,
        chain_vote_data: Some(ChainVoteData {
            target_chain_id: "chain-b".into(),
            fork_height: 1_000,
            amount,
        }),
    };
    vote.signature = kp.sign_hex(&vote.signing_payload());
    vote
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::Keypair;

    #[test]
    fn isqrt_exact_squares() {
        for r in [0u128, 1, 2, 10, 1_000, 1 << 40] {
            assert_eq!(isqrt(r * r), r);
        }
    }

    #[test]
    fn isqrt_floors_between_squares() {
        assert_eq!(isqrt(0), 0);
        assert_eq!(isqrt(1), 1);
        assert_eq!(isqrt(2), 1);
        assert_eq!(isqrt(3), 1);
        assert_eq!(isqrt(8), 2);
        assert_eq!(isqrt(99), 9);
        assert_eq!(isqrt(100), 10);
        assert_eq!(isqrt(101), 10);
    }

    #[test]
    fn isqrt_handles_extremes() {
        let max_root = isqrt(u128::MAX);
        // √(2^128 - 1) = 2^64 - 1.
        assert_eq!(max_root, u64::MAX as u128);
        assert!(max_root * max_root <= u128::MAX);
    }

    #[test]
    fn quadratic_power_discourages_whales() {
        // 100x the stake buys only 10x the power.
        assert_eq!(quadratic_power(100), 10 * quadratic_power(1));
    }

    #[test]
    fn signature_round_trip() {
        let kp = Keypair::generate();
        let vote = signed_vote(&kp, 1, 100);
        assert!(vote.verify_signature());
    }

    #[test]
    fn power_enrichment_does_not_break_signature() {
        // The engine sets voting_power after verifying; the signature must
        // stay valid because power is outside the signed payload.
        let kp = Keypair::generate();
        let mut vote = signed_vote(&kp, 1, 100);
        vote.voting_power = quadratic_power(100);
        assert!(vote.verify_signature());
    }

    #[test]
    fn tampered_payload_fails() {
        let kp = Keypair::generate();
        let mut vote = signed_vote(&kp, 1, 100);
        vote.chain_vote_data.as_mut().unwrap().amount = 1_000_000;
        assert!(!vote.verify_signature());
    }

    #[test]
    fn voting_power_serializes_as_string() {
        let kp = Keypair::generate();
        let mut vote = signed_vote(&kp, 3, 100);
        vote.voting_power = 10;
        let json = serde_json::to_string(&vote).unwrap();
        assert!(json.contains(r#""voting_power":"10""#));
        let back: Vote = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vote);
    }

    #[test]
    fn size_is_bounded_for_normal_votes() {
        let kp = Keypair::generate();
        let vote = signed_vote(&kp, 1, u128::MAX);
        assert!(vote.size_bytes() < crate::config::MAX_VOTE_SIZE_BYTES);
    }
}

//! # Block Validator
//!
//! Deterministically accepts or rejects a candidate block against the
//! current chain tip and UTXO set. The pipeline runs in a fixed order and
//! aborts at the first failure with a typed error:
//!
//! ```text
//! 1. structure      — required header fields present, bodies non-empty
//! 2. size           — transaction count cap + dynamic byte limit
//! 3. timestamp      — ±2h of wall clock, after the predecessor
//! 4. proof-of-work  — canonical hash meets MAX_TARGET / difficulty
//! 5. votes          — every embedded vote signature verifies
//! 6. validator set  — count, merkle membership, attestations, weight
//! 7. previous block — linkage to the stored predecessor
//! 8. merkle root    — recomputed transaction root matches the header
//! 9. transactions   — batches of 100: coinbase rules, signatures, UTXOs
//! ```
//!
//! The validator owns no persistent state — it reads the store and the
//! mempool, computes, and returns. A 30-second wall-clock deadline is
//! checked between stages; blowing it yields `ValidationTimeout` rather
//! than a half-finished verdict.
//!
//! ```text
//! reward.rs — the halving subsidy schedule
//! size.rs   — the dynamic block-size limit
//! ```

pub mod reward;
pub mod size;

use std::sync::Arc;
use std::time::Instant;

use num_bigint::BigUint;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

use crate::collaborators::MempoolApi;
use crate::config::{
    MAX_TARGET, MAX_TIMESTAMP_DRIFT, MAX_TRANSACTIONS, MEMPOOL_CAPACITY, MIN_BLOCK_SIZE,
    MIN_VALIDATORS, TX_BATCH_SIZE, VALIDATION_TIMEOUT, VALIDATOR_WEIGHT_THRESHOLD,
};
use crate::merkle::MerkleTree;
use crate::storage::db::ChainStore;
use crate::types::block::Block;
use crate::types::now_ms;
use crate::types::transaction::Transaction;

pub use reward::{block_reward, block_reward_units};
pub use size::{dynamic_block_size_limit, SizeInputs};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Typed rejection reasons, in pipeline order.
#[derive(Debug, Error)]
pub enum BlockValidationError {
    #[error("invalid block structure: {0}")]
    InvalidStructure(&'static str),

    #[error("missing header field: {0}")]
    MissingField(&'static str),

    #[error("transaction count {count} exceeds maximum {max}")]
    ExcessTransactions { count: usize, max: usize },

    #[error("block size {size} exceeds dynamic limit {limit}")]
    ExcessSize { size: u64, limit: u64 },

    #[error("block timestamp {timestamp} outside tolerance of wall clock")]
    InvalidTimestamp { timestamp: u64 },

    #[error("block timestamp {timestamp} not after predecessor {previous}")]
    InvalidTimestampOrder { timestamp: u64, previous: u64 },

    #[error("previous block mismatch at height {height}")]
    InvalidPrevBlock { height: u64 },

    #[error("merkle root mismatch: stored {stored}, computed {computed}")]
    InvalidMerkleRoot { stored: String, computed: String },

    #[error("proof of work does not meet target at difficulty {difficulty}")]
    InvalidPow { difficulty: u64 },

    #[error("vote from {voter} failed verification")]
    InvalidVotes { voter: String },

    #[error("validator count {count} below minimum {min}")]
    InsufficientValidators { count: usize, min: usize },

    #[error("aggregate validation weight {weight:.3} below threshold {threshold:.2}")]
    InsufficientValidatorWeight { weight: f64, threshold: f64 },

    #[error("invalid coinbase: {0}")]
    InvalidCoinbase(&'static str),

    #[error("coinbase output {amount} exceeds block reward {reward}")]
    ExcessReward { amount: u128, reward: u128 },

    #[error("transaction {hash} signature invalid")]
    InvalidTxSignature { hash: String },

    #[error("transaction {hash} references a missing or spent output")]
    InvalidUtxoRef { hash: String },

    #[error("transaction {hash} amounts do not balance")]
    AmountMismatch { hash: String },

    #[error("empty transaction batch")]
    EmptyBatch,

    #[error("block has no transactions")]
    EmptyTransactions,

    #[error("validation exceeded the {0:?} budget")]
    ValidationTimeout(std::time::Duration),

    #[error(transparent)]
    Storage(#[from] crate::storage::errors::StorageError),
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the validator. Defaults mirror the consensus
/// constants; tests override `max_target` to exercise the pipeline
/// without mining.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Highest admissible PoW target (difficulty 1).
    pub max_target: [u8; 32],
    /// Target inter-block time, seconds.
    pub target_block_time_secs: f64,
    /// Mempool capacity for congestion estimation.
    pub mempool_capacity: u32,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_target: MAX_TARGET,
            target_block_time_secs: crate::config::DEFAULT_BLOCK_TIME.as_secs_f64(),
            mempool_capacity: MEMPOOL_CAPACITY,
        }
    }
}

// ---------------------------------------------------------------------------
// BlockValidator
// ---------------------------------------------------------------------------

/// Stateless-per-call block validation against the store and mempool.
pub struct BlockValidator {
    store: Arc<ChainStore>,
    mempool: Arc<dyn MempoolApi>,
    config: ValidatorConfig,
    /// Rolling propagation samples feeding the size limit, newest last.
    propagation_samples: Mutex<Vec<u64>>,
}

impl BlockValidator {
    pub fn new(store: Arc<ChainStore>, mempool: Arc<dyn MempoolApi>) -> Self {
        Self::with_config(store, mempool, ValidatorConfig::default())
    }

    pub fn with_config(
        store: Arc<ChainStore>,
        mempool: Arc<dyn MempoolApi>,
        config: ValidatorConfig,
    ) -> Self {
        Self {
            store,
            mempool,
            config,
            propagation_samples: Mutex::new(Vec::new()),
        }
    }

    /// Feed an observed block propagation delay into the size model.
    pub fn record_propagation(&self, millis: u64) {
        let mut samples = self.propagation_samples.lock();
        samples.push(millis);
        if samples.len() > 100 {
            samples.remove(0);
        }
    }

    /// Median of recorded propagation delays; 1000 ms (neutral) when no
    /// samples exist yet.
    pub fn median_propagation_ms(&self) -> f64 {
        let mut samples = self.propagation_samples.lock().clone();
        if samples.is_empty() {
            return 1_000.0;
        }
        samples.sort_unstable();
        samples[samples.len() / 2] as f64
    }

    /// Run the full pipeline. First failure wins; `Ok(())` means the
    /// block is acceptable at the current tip.
    pub fn validate_block(&self, block: &Block) -> Result<(), BlockValidationError> {
        let deadline = Instant::now() + VALIDATION_TIMEOUT;

        // 1. Structure.
        self.check_structure(block)?;
        self.check_deadline(deadline)?;

        // The predecessor anchors stages 2, 3, and 7. Genesis has none.
        let previous = if block.header.height == 0 {
            None
        } else {
            let prev = self
                .store
                .get_block_by_height(block.header.height - 1)?
                .ok_or(BlockValidationError::InvalidPrevBlock {
                    height: block.header.height,
                })?;
            Some(prev)
        };

        // 2. Size.
        self.check_size(block, previous.as_ref())?;
        self.check_deadline(deadline)?;

        // 3. Timestamp.
        self.check_timestamp(block, previous.as_ref())?;
        self.check_deadline(deadline)?;

        // 4. Proof of work.
        self.check_pow(block)?;
        self.check_deadline(deadline)?;

        // 5. Votes.
        self.check_votes(block)?;
        self.check_deadline(deadline)?;

        // 6. Validator set.
        self.check_validator_set(block)?;
        self.check_deadline(deadline)?;

        // 7. Previous block linkage.
        if let Some(prev) = previous.as_ref() {
            if block.header.previous_hash != prev.header.hash
                || block.header.timestamp <= prev.header.timestamp
            {
                return Err(BlockValidationError::InvalidPrevBlock {
                    height: block.header.height,
                });
            }
        }
        self.check_deadline(deadline)?;

        // 8. Merkle root.
        let computed = Block::transactions_root(&block.transactions);
        if computed != block.header.merkle_root {
            return Err(BlockValidationError::InvalidMerkleRoot {
                stored: block.header.merkle_root.clone(),
                computed,
            });
        }
        self.check_deadline(deadline)?;

        // 9. Transactions, in batches.
        self.check_transactions(block, deadline)?;

        self.cleanup_validator_set();
        debug!(height = block.header.height, "block validated");
        Ok(())
    }

    // -- Stages -------------------------------------------------------------

    fn check_structure(&self, block: &Block) -> Result<(), BlockValidationError> {
        let header = &block.header;
        if header.version == 0 {
            return Err(BlockValidationError::MissingField("version"));
        }
        if header.previous_hash.is_empty() {
            return Err(BlockValidationError::MissingField("previous_hash"));
        }
        if header.merkle_root.is_empty() {
            return Err(BlockValidationError::MissingField("merkle_root"));
        }
        if header.timestamp == 0 {
            return Err(BlockValidationError::MissingField("timestamp"));
        }
        if header.difficulty == 0 {
            return Err(BlockValidationError::MissingField("difficulty"));
        }
        if header.hash.is_empty() {
            return Err(BlockValidationError::InvalidStructure("empty hash"));
        }
        if block.transactions.is_empty() {
            return Err(BlockValidationError::EmptyTransactions);
        }
        Ok(())
    }

    fn check_size(
        &self,
        block: &Block,
        previous: Option<&Block>,
    ) -> Result<(), BlockValidationError> {
        if block.transactions.len() > MAX_TRANSACTIONS {
            return Err(BlockValidationError::ExcessTransactions {
                count: block.transactions.len(),
                max: MAX_TRANSACTIONS,
            });
        }

        let previous_size = previous.map(|p| p.size_bytes()).unwrap_or(MIN_BLOCK_SIZE);
        let observed = previous
            .map(|p| (block.header.timestamp.saturating_sub(p.header.timestamp)) as f64 / 1_000.0)
            .unwrap_or(self.config.target_block_time_secs);
        let inputs = SizeInputs {
            previous_size,
            mempool_fill: f64::from(self.mempool.get_size())
                / f64::from(self.config.mempool_capacity.max(1)),
            observed_block_time_secs: observed,
            target_block_time_secs: self.config.target_block_time_secs,
            median_propagation_ms: self.median_propagation_ms(),
        };
        let limit = dynamic_block_size_limit(&inputs);
        let size = block.size_bytes();
        if size > limit {
            return Err(BlockValidationError::ExcessSize { size, limit });
        }
        Ok(())
    }

    fn check_timestamp(
        &self,
        block: &Block,
        previous: Option<&Block>,
    ) -> Result<(), BlockValidationError> {
        let now = now_ms();
        let drift = MAX_TIMESTAMP_DRIFT.as_millis() as u64;
        let ts = block.header.timestamp;
        if ts > now + drift || ts + drift < now {
            return Err(BlockValidationError::InvalidTimestamp { timestamp: ts });
        }
        if let Some(prev) = previous {
            if ts <= prev.header.timestamp {
                return Err(BlockValidationError::InvalidTimestampOrder {
                    timestamp: ts,
                    previous: prev.header.timestamp,
                });
            }
        }
        Ok(())
    }

    fn check_pow(&self, block: &Block) -> Result<(), BlockValidationError> {
        let difficulty = block.header.difficulty;
        // The hash the miner claims must be the canonical hash; a forged
        // hash that happens to meet the target proves nothing.
        let canonical = block.header.compute_hash();
        if canonical != block.header.hash {
            return Err(BlockValidationError::InvalidPow { difficulty });
        }
        let Ok(hash_bytes) = hex::decode(&canonical) else {
            return Err(BlockValidationError::InvalidPow { difficulty });
        };
        let hash_value = BigUint::from_bytes_be(&hash_bytes);
        let target = BigUint::from_bytes_be(&self.config.max_target) / difficulty.max(1);
        if hash_value > target {
            return Err(BlockValidationError::InvalidPow { difficulty });
        }
        Ok(())
    }

    fn check_votes(&self, block: &Block) -> Result<(), BlockValidationError> {
        for vote in &block.votes {
            if !vote.verify_signature() {
                return Err(BlockValidationError::InvalidVotes {
                    voter: vote.voter.clone(),
                });
            }
        }
        Ok(())
    }

    fn check_validator_set(&self, block: &Block) -> Result<(), BlockValidationError> {
        if block.validators.len() < MIN_VALIDATORS {
            return Err(BlockValidationError::InsufficientValidators {
                count: block.validators.len(),
                min: MIN_VALIDATORS,
            });
        }

        // Aggregate weight is the plain sum of reputation/100 over the
        // validators whose proof and attestation both verify — NOT an
        // average. Any honest majority clears 0.66 easily; the gate
        // exists to reject sets where verification failures wipe out
        // nearly all of the weight.
        let tree = MerkleTree::new();
        let mut weight = 0.0;
        for validator in &block.validators {
            let proof_ok = match &validator.merkle_proof {
                Some(proof) => tree
                    .verify_proof(
                        proof,
                        &validator.merkle_leaf(),
                        &block.header.validator_merkle_root,
                    )
                    .unwrap_or(false),
                None => false,
            };
            let valid = proof_ok && validator.verify_attestation();
            if valid {
                weight += validator.validation_weight();
            } else {
                warn!(address = %validator.address, "validator failed set verification");
            }
        }

        if weight < VALIDATOR_WEIGHT_THRESHOLD {
            return Err(BlockValidationError::InsufficientValidatorWeight {
                weight,
                threshold: VALIDATOR_WEIGHT_THRESHOLD,
            });
        }
        Ok(())
    }

    fn check_transactions(
        &self,
        block: &Block,
        deadline: Instant,
    ) -> Result<(), BlockValidationError> {
        for (batch_index, batch) in block.transactions.chunks(TX_BATCH_SIZE).enumerate() {
            if batch.is_empty() {
                return Err(BlockValidationError::EmptyBatch);
            }
            for (offset, tx) in batch.iter().enumerate() {
                let index = batch_index * TX_BATCH_SIZE + offset;
                if tx.is_coinbase() {
                    self.check_coinbase(block, tx, index)?;
                } else {
                    self.check_standard_tx(tx)?;
                }
            }
            self.check_deadline(deadline)?;
        }
        Ok(())
    }

    fn check_coinbase(
        &self,
        block: &Block,
        tx: &Transaction,
        index: usize,
    ) -> Result<(), BlockValidationError> {
        if index != 0 {
            return Err(BlockValidationError::InvalidCoinbase(
                "coinbase must be the first transaction",
            ));
        }
        if !tx.inputs.is_empty() {
            return Err(BlockValidationError::InvalidCoinbase(
                "coinbase must have no inputs",
            ));
        }
        if tx.outputs.len() != 1 {
            return Err(BlockValidationError::InvalidCoinbase(
                "coinbase must have exactly one output",
            ));
        }
        let reward = block_reward_units(block.header.height);
        let amount = tx.output_sum();
        if amount > reward {
            return Err(BlockValidationError::ExcessReward { amount, reward });
        }
        Ok(())
    }

    fn check_standard_tx(&self, tx: &Transaction) -> Result<(), BlockValidationError> {
        if !tx.verify_signature() {
            return Err(BlockValidationError::InvalidTxSignature {
                hash: tx.hash.clone(),
            });
        }
        for input in &tx.inputs {
            let utxo = self
                .store
                .get_utxo(&input.address, &input.tx_id, input.output_index)?;
            match utxo {
                Some(utxo) if !utxo.spent => {
                    if utxo.amount != input.amount {
                        return Err(BlockValidationError::AmountMismatch {
                            hash: tx.hash.clone(),
                        });
                    }
                }
                _ => {
                    return Err(BlockValidationError::InvalidUtxoRef {
                        hash: tx.hash.clone(),
                    });
                }
            }
        }
        if !tx.conserves_value() {
            return Err(BlockValidationError::AmountMismatch {
                hash: tx.hash.clone(),
            });
        }
        Ok(())
    }

    fn check_deadline(&self, deadline: Instant) -> Result<(), BlockValidationError> {
        if Instant::now() > deadline {
            return Err(BlockValidationError::ValidationTimeout(VALIDATION_TIMEOUT));
        }
        Ok(())
    }

    /// Post-acceptance housekeeping: deactivate validators that have gone
    /// quiet past the inactivity window.
    fn cleanup_validator_set(&self) {
        let now = now_ms();
        let Ok(validators) = self.store.active_validators() else {
            return;
        };
        for mut validator in validators {
            if !validator.is_recently_active(now) {
                validator.is_active = false;
                if let Err(err) = self.store.put_validator(&validator) {
                    warn!(address = %validator.address, error = %err, "validator cleanup failed");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::MemoryAudit;
    use crate::crypto::keys::Keypair;
    use crate::types::block::Block;
    use crate::types::transaction::{TransactionBuilder, TransactionType};
    use crate::types::validator::{test_validator, Validator};
    use crate::types::vote::signed_vote;
    use crate::validation::reward::block_reward_units;

    /// Mempool stub with a fixed size and no expected validators.
    struct StubMempool {
        size: u32,
    }

    impl MempoolApi for StubMempool {
        fn get_expected_validators(&self) -> Vec<Validator> {
            Vec::new()
        }
        fn handle_validation_failure(&self, _reason: &str, _validator: &Validator) {}
        fn get_size(&self) -> u32 {
            self.size
        }
    }

    /// A config whose target accepts any hash, so tests need no mining.
    fn permissive_config() -> ValidatorConfig {
        ValidatorConfig {
            max_target: [0xff; 32],
            ..ValidatorConfig::default()
        }
    }

    fn setup() -> (Arc<ChainStore>, BlockValidator) {
        let store = Arc::new(ChainStore::open_temporary(MemoryAudit::new()).unwrap());
        let validator = BlockValidator::with_config(
            Arc::clone(&store),
            Arc::new(StubMempool { size: 0 }),
            permissive_config(),
        );
        (store, validator)
    }

    /// Four validators with proofs against a shared set root.
    fn validator_set(reputation: u8) -> (Vec<Validator>, String) {
        let mut validators: Vec<Validator> = (0..4)
            .map(|_| test_validator(&Keypair::generate(), reputation))
            .collect();
        let leaves: Vec<String> = validators.iter().map(Validator::merkle_leaf).collect();
        let mut tree = MerkleTree::new();
        let root = tree.create_root(&leaves).unwrap();
        for (i, validator) in validators.iter_mut().enumerate() {
            validator.merkle_proof = Some(tree.generate_proof(i).unwrap());
            validator.merkle_root = root.clone();
        }
        (validators, root)
    }

    /// A block extending `parent` with a correct coinbase and the given
    /// extra transactions, carrying a valid 4-validator set.
    fn valid_block(parent: &Block, extra: Vec<Transaction>) -> Block {
        let height = parent.header.height + 1;
        let coinbase = TransactionBuilder::new(TransactionType::PowReward)
            .output(block_reward_units(height), "h3:miner".into())
            .timestamp(now_ms())
            .build();
        let mut txs = vec![coinbase];
        txs.extend(extra);

        let (validators, _root) = validator_set(90);
        Block::new(
            parent,
            txs,
            vec![],
            validators,
            "h3:miner".into(),
            1,
            0,
            now_ms(),
        )
    }

    fn persisted_genesis(store: &ChainStore) -> Block {
        // A genesis whose timestamp is recent enough for drift checks.
        let mut genesis = Block::genesis();
        genesis.header.timestamp = now_ms() - 600_000;
        genesis.header.hash = genesis.header.compute_hash();
        store.put_block(&genesis).unwrap();
        genesis
    }

    #[test]
    fn well_formed_block_passes() {
        let (store, validator) = setup();
        let genesis = persisted_genesis(&store);
        let block = valid_block(&genesis, vec![]);
        validator.validate_block(&block).unwrap();
    }

    #[test]
    fn empty_transactions_rejected() {
        let (store, validator) = setup();
        let genesis = persisted_genesis(&store);
        let mut block = valid_block(&genesis, vec![]);
        block.transactions.clear();
        block.header.merkle_root = "aa".repeat(32);
        block.header.hash = block.header.compute_hash();
        assert!(matches!(
            validator.validate_block(&block),
            Err(BlockValidationError::EmptyTransactions)
        ));
    }

    #[test]
    fn missing_difficulty_rejected() {
        let (store, validator) = setup();
        let genesis = persisted_genesis(&store);
        let mut block = valid_block(&genesis, vec![]);
        block.header.difficulty = 0;
        block.header.hash = block.header.compute_hash();
        assert!(matches!(
            validator.validate_block(&block),
            Err(BlockValidationError::MissingField("difficulty"))
        ));
    }

    #[test]
    fn excess_transaction_count_rejected() {
        let (store, validator) = setup();
        let genesis = persisted_genesis(&store);
        let mut block = valid_block(&genesis, vec![]);
        let filler = TransactionBuilder::new(TransactionType::Transfer)
            .output(1, "h3:x".into())
            .timestamp(1)
            .build();
        block.transactions = vec![filler; MAX_TRANSACTIONS + 1];
        block.header.merkle_root = Block::transactions_root(&block.transactions);
        block.header.hash = block.header.compute_hash();
        assert!(matches!(
            validator.validate_block(&block),
            Err(BlockValidationError::ExcessTransactions { .. })
        ));
    }

    #[test]
    fn stale_timestamp_rejected() {
        let (store, validator) = setup();
        let genesis = persisted_genesis(&store);
        let mut block = valid_block(&genesis, vec![]);
        block.header.timestamp = now_ms() - 3 * 60 * 60 * 1_000; // 3h old
        block.header.hash = block.header.compute_hash();
        assert!(matches!(
            validator.validate_block(&block),
            Err(BlockValidationError::InvalidTimestamp { .. })
        ));
    }

    #[test]
    fn timestamp_must_follow_predecessor() {
        let (store, validator) = setup();
        let genesis = persisted_genesis(&store);
        let mut block = valid_block(&genesis, vec![]);
        block.header.timestamp = genesis.header.timestamp; // not strictly after
        block.header.hash = block.header.compute_hash();
        assert!(matches!(
            validator.validate_block(&block),
            Err(BlockValidationError::InvalidTimestampOrder { .. })
        ));
    }

    #[test]
    fn forged_hash_fails_pow() {
        let (store, validator) = setup();
        let genesis = persisted_genesis(&store);
        let mut block = valid_block(&genesis, vec![]);
        block.header.hash = "00".repeat(32); // low value, but not canonical
        assert!(matches!(
            validator.validate_block(&block),
            Err(BlockValidationError::InvalidPow { .. })
        ));
    }

    #[test]
    fn hash_above_target_fails_pow() {
        let store = Arc::new(ChainStore::open_temporary(MemoryAudit::new()).unwrap());
        // Strict target: nothing passes without real mining.
        let validator = BlockValidator::with_config(
            Arc::clone(&store),
            Arc::new(StubMempool { size: 0 }),
            ValidatorConfig::default(),
        );
        let genesis = persisted_genesis(&store);
        let block = valid_block(&genesis, vec![]);
        assert!(matches!(
            validator.validate_block(&block),
            Err(BlockValidationError::InvalidPow { .. })
        ));
    }

    #[test]
    fn bad_vote_signature_rejected() {
        let (store, validator) = setup();
        let genesis = persisted_genesis(&store);
        let mut block = valid_block(&genesis, vec![]);
        let kp = Keypair::generate();
        let mut vote = signed_vote(&kp, 1, 100);
        vote.signature = "ff".repeat(64);
        block.votes = vec![vote];
        block.header.votes_merkle_root = Block::votes_root(&block.votes);
        block.header.hash = block.header.compute_hash();
        assert!(matches!(
            validator.validate_block(&block),
            Err(BlockValidationError::InvalidVotes { .. })
        ));
    }

    #[test]
    fn too_few_validators_rejected() {
        let (store, validator) = setup();
        let genesis = persisted_genesis(&store);
        let mut block = valid_block(&genesis, vec![]);
        block.validators.truncate(2);
        block.header.hash = block.header.compute_hash();
        assert!(matches!(
            validator.validate_block(&block),
            Err(BlockValidationError::InsufficientValidators { count: 2, .. })
        ));
    }

    #[test]
    fn negligible_reputation_sum_rejected() {
        let (store, validator) = setup();
        let genesis = persisted_genesis(&store);
        let mut block = valid_block(&genesis, vec![]);
        // Four validators at reputation 10: aggregate weight 0.40 < 0.66.
        let (validators, root) = validator_set(10);
        block.validators = validators;
        block.header.validator_merkle_root = root;
        block.header.hash = block.header.compute_hash();
        assert!(matches!(
            validator.validate_block(&block),
            Err(BlockValidationError::InsufficientValidatorWeight { .. })
        ));
    }

    #[test]
    fn weight_threshold_is_a_sum_not_an_average() {
        let (store, validator) = setup();
        let genesis = persisted_genesis(&store);
        let mut block = valid_block(&genesis, vec![]);
        // Four validators at reputation 50 average 0.50, but the gate is
        // the aggregate: 4 × 0.50 = 2.0 ≥ 0.66, so the block passes.
        let (validators, root) = validator_set(50);
        block.validators = validators;
        block.header.validator_merkle_root = root;
        block.header.hash = block.header.compute_hash();
        validator.validate_block(&block).unwrap();
    }

    #[test]
    fn broken_merkle_proof_zeroes_validator_weight() {
        let (store, validator) = setup();
        let genesis = persisted_genesis(&store);
        let mut block = valid_block(&genesis, vec![]);
        // Point every proof at a foreign root.
        block.header.validator_merkle_root = "ab".repeat(32);
        block.header.hash = block.header.compute_hash();
        assert!(matches!(
            validator.validate_block(&block),
            Err(BlockValidationError::InsufficientValidatorWeight { .. })
        ));
    }

    #[test]
    fn wrong_previous_hash_rejected() {
        let (store, validator) = setup();
        let genesis = persisted_genesis(&store);
        let mut block = valid_block(&genesis, vec![]);
        block.header.previous_hash = "cd".repeat(32);
        block.header.hash = block.header.compute_hash();
        assert!(matches!(
            validator.validate_block(&block),
            Err(BlockValidationError::InvalidPrevBlock { .. })
        ));
    }

    #[test]
    fn tampered_merkle_root_rejected() {
        let (store, validator) = setup();
        let genesis = persisted_genesis(&store);
        let mut block = valid_block(&genesis, vec![]);
        block.header.merkle_root = "ef".repeat(32);
        block.header.hash = block.header.compute_hash();
        assert!(matches!(
            validator.validate_block(&block),
            Err(BlockValidationError::InvalidMerkleRoot { .. })
        ));
    }

    #[test]
    fn oversized_coinbase_rejected() {
        let (store, validator) = setup();
        let genesis = persisted_genesis(&store);
        let mut block = valid_block(&genesis, vec![]);
        let fat_coinbase = TransactionBuilder::new(TransactionType::PowReward)
            .output(block_reward_units(1) + 1, "h3:greedy".into())
            .timestamp(now_ms())
            .build();
        block.transactions[0] = fat_coinbase;
        block.header.merkle_root = Block::transactions_root(&block.transactions);
        block.header.hash = block.header.compute_hash();
        assert!(matches!(
            validator.validate_block(&block),
            Err(BlockValidationError::ExcessReward { .. })
        ));
    }

    #[test]
    fn coinbase_with_inputs_rejected() {
        let (store, validator) = setup();
        let genesis = persisted_genesis(&store);
        let mut block = valid_block(&genesis, vec![]);
        let bad = TransactionBuilder::new(TransactionType::PowReward)
            .input("ab".repeat(32), 0, 5, "h3:a".into())
            .output(5, "h3:miner".into())
            .timestamp(now_ms())
            .build();
        block.transactions[0] = bad;
        block.header.merkle_root = Block::transactions_root(&block.transactions);
        block.header.hash = block.header.compute_hash();
        assert!(matches!(
            validator.validate_block(&block),
            Err(BlockValidationError::InvalidCoinbase(_))
        ));
    }

    #[test]
    fn transfer_spending_valid_utxo_passes() {
        let (store, validator) = setup();
        let genesis = persisted_genesis(&store);

        let kp = Keypair::generate();
        let seed = crate::types::utxo::Utxo {
            tx_id: "ab".repeat(32),
            output_index: 0,
            amount: 1_000,
            address: kp.public_hex(),
            spent: false,
            block_height: 0,
            script: String::new(),
            confirmations: 0,
        };
        store.put_utxo(&seed).unwrap();

        let spend = TransactionBuilder::new(TransactionType::Transfer)
            .input(seed.tx_id.clone(), 0, 1_000, seed.address.clone())
            .output(990, "h3:bob".into())
            .fee(10)
            .timestamp(now_ms())
            .sign_with(&kp);
        let block = valid_block(&genesis, vec![spend]);
        validator.validate_block(&block).unwrap();
    }

    #[test]
    fn unknown_utxo_reference_rejected() {
        let (store, validator) = setup();
        let genesis = persisted_genesis(&store);
        let kp = Keypair::generate();
        let spend = TransactionBuilder::new(TransactionType::Transfer)
            .input("99".repeat(32), 0, 1_000, kp.public_hex())
            .output(1_000, "h3:bob".into())
            .timestamp(now_ms())
            .sign_with(&kp);
        let block = valid_block(&genesis, vec![spend]);
        assert!(matches!(
            validator.validate_block(&block),
            Err(BlockValidationError::InvalidUtxoRef { .. })
        ));
    }

    #[test]
    fn input_amount_must_match_utxo() {
        let (store, validator) = setup();
        let genesis = persisted_genesis(&store);

        let kp = Keypair::generate();
        let seed = crate::types::utxo::Utxo {
            tx_id: "ab".repeat(32),
            output_index: 0,
            amount: 1_000,
            address: kp.public_hex(),
            spent: false,
            block_height: 0,
            script: String::new(),
            confirmations: 0,
        };
        store.put_utxo(&seed).unwrap();

        let spend = TransactionBuilder::new(TransactionType::Transfer)
            .input(seed.tx_id.clone(), 0, 999, seed.address.clone()) // declared 999 vs 1000
            .output(999, "h3:bob".into())
            .timestamp(now_ms())
            .sign_with(&kp);
        let block = valid_block(&genesis, vec![spend]);
        assert!(matches!(
            validator.validate_block(&block),
            Err(BlockValidationError::AmountMismatch { .. })
        ));
    }

    #[test]
    fn unsigned_transfer_rejected() {
        let (store, validator) = setup();
        let genesis = persisted_genesis(&store);
        let spend = TransactionBuilder::new(TransactionType::Transfer)
            .input("ab".repeat(32), 0, 10, "h3:a".into())
            .output(10, "h3:b".into())
            .timestamp(now_ms())
            .build(); // no signature
        let block = valid_block(&genesis, vec![spend]);
        assert!(matches!(
            validator.validate_block(&block),
            Err(BlockValidationError::InvalidTxSignature { .. })
        ));
    }

    #[test]
    fn propagation_median_defaults_neutral() {
        let (_, validator) = setup();
        assert_eq!(validator.median_propagation_ms(), 1_000.0);
        validator.record_propagation(200);
        validator.record_propagation(600);
        validator.record_propagation(400);
        assert_eq!(validator.median_propagation_ms(), 400.0);
    }
}

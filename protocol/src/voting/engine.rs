//! # Direct Voting Engine
//!
//! Quadratic-voting governance over fixed-length block-height periods,
//! plus fork arbitration. The engine owns the lifecycle of the current
//! period; everything it persists goes through the storage layer's
//! transactional path so a vote is either fully recorded (both keys, plus
//! the refreshed period merkle root) or not recorded at all.
//!
//! ## Locking
//!
//! Two mutexes, acquired in a FIXED order when both are needed:
//!
//! ```text
//! vote lock  — admits one vote at a time
//! period lock — guards the current period and the schedule state
//! order: vote -> period, never the reverse
//! ```
//!
//! `submit_vote` takes both (in order); period transitions take only the
//! period lock. This is what makes "once a period is completed, no
//! further votes land in it" a linearizable statement rather than a hope.
//!
//! ## Fork arbitration
//!
//! `handle_chain_fork` is gated on network stability — a partitioned node
//! does not get to re-pick its chain. When stable, it guarantees an
//! active chain-selection period exists (opening an ephemeral one if
//! needed), gives the gossip layer a collection window, then tallies the
//! period's votes weighted by quadratic power, counting only voters in
//! the supplied validator set. Equality goes to the incumbent chain.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::collaborators::{AuditEvent, AuditLog, AuditSeverity, MempoolApi, NodeApi, SyncApi};
use crate::config::{
    MAX_CONSECUTIVE_PERIOD_FAILURES, MAX_VOTE_SIZE_BYTES, VOTE_TIMESTAMP_TOLERANCE,
    VOTING_PERIOD_BLOCKS,
};
use crate::merkle;
use crate::retry::{with_backoff, RetryPolicy};
use crate::storage::db::ChainStore;
use crate::storage::errors::StorageError;
use crate::storage::keys;
use crate::types::amount::Units;
use crate::types::block::Block;
use crate::types::now_ms;
use crate::types::period::{PeriodType, VotingPeriod};
use crate::types::validator::Validator;
use crate::types::vote::{quadratic_power, Vote};
use crate::voting::schedule;
use crate::voting::stability::NetworkStabilityGate;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Vote-submission and engine lifecycle errors.
#[derive(Debug, Error)]
pub enum VotingError {
    /// Unrecoverable storage failure during engine initialization.
    #[error("voting engine initialization failed: {0}")]
    InitFailed(String),

    /// No active period, or the vote names a different period.
    #[error("no active voting period accepts this vote")]
    InactivePeriod,

    /// Chain height is outside the period's voting window.
    #[error("height {height} outside voting window [{start}, {end}]")]
    OutsideWindow { height: u64, start: u64, end: u64 },

    /// Vote lacks chain-selection data; this core supports nothing else.
    #[error("only chain-selection votes are supported")]
    InvalidVoteType,

    /// Serialized vote exceeds the admission size cap.
    #[error("vote size {size} exceeds maximum {max}")]
    VoteTooLarge { size: usize, max: usize },

    /// The voter already has a recorded vote in this period.
    #[error("duplicate vote from {voter} in period {period_id}")]
    DuplicateVote { period_id: u64, voter: String },

    /// Signature does not verify over the canonical vote payload.
    #[error("vote signature invalid")]
    InvalidSignature,

    /// Committed amount is unusable (zero).
    #[error("vote amount invalid")]
    InvalidVoteAmount,

    /// The transactional persistence path failed; nothing was recorded.
    #[error("vote could not be recorded: {0}")]
    RecordFailed(String),

    /// The engine has been disposed.
    #[error("voting engine is disposed")]
    Disposed,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

// ---------------------------------------------------------------------------
// Configuration & read models
// ---------------------------------------------------------------------------

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct VotingConfig {
    /// Length of a regular period in blocks.
    pub period_blocks: u64,
    /// Height span of an ephemeral chain-selection period.
    pub fork_window_blocks: u64,
    /// How long `handle_chain_fork` waits for gossip-delivered votes
    /// before tallying. Zero in tests.
    pub fork_collection_window: Duration,
}

impl Default for VotingConfig {
    fn default() -> Self {
        Self {
            period_blocks: VOTING_PERIOD_BLOCKS,
            fork_window_blocks: 16,
            fork_collection_window: Duration::from_secs(30),
        }
    }
}

/// Aggregate read model over the current period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VotingMetrics {
    pub current_period_id: Option<u64>,
    pub votes_cast: u64,
    pub total_voting_power: Units,
    pub active_voters: u64,
    pub next_voting_height: u64,
}

/// When the next transition is expected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VotingSchedule {
    pub current_period_id: Option<u64>,
    pub next_voting_height: u64,
    pub blocks_remaining: u64,
    pub estimated_wait: Duration,
}

struct EngineState {
    current_period: Option<VotingPeriod>,
    next_voting_height: u64,
}

// ---------------------------------------------------------------------------
// DirectVotingEngine
// ---------------------------------------------------------------------------

/// The governance engine. Construct with [`DirectVotingEngine::new`],
/// call [`initialize`](Self::initialize), then feed it votes; spawn
/// [`run_period_checker`](Self::run_period_checker) on the runtime for
/// automatic period transitions.
pub struct DirectVotingEngine {
    store: Arc<ChainStore>,
    mempool: Arc<dyn MempoolApi>,
    node: Arc<dyn NodeApi>,
    audit: Arc<dyn AuditLog>,
    stability: NetworkStabilityGate,
    config: VotingConfig,
    /// Lock order: vote -> period. See the module docs.
    vote_lock: Mutex<()>,
    period_lock: Mutex<EngineState>,
    /// voter address -> period id of their last admitted vote.
    participation: DashMap<String, u64>,
    disposed: AtomicBool,
    checker_failures: AtomicU32,
}

impl DirectVotingEngine {
    pub fn new(
        store: Arc<ChainStore>,
        mempool: Arc<dyn MempoolApi>,
        node: Arc<dyn NodeApi>,
        sync: Arc<dyn SyncApi>,
        audit: Arc<dyn AuditLog>,
        config: VotingConfig,
    ) -> Self {
        let stability = NetworkStabilityGate::new(Arc::clone(&node), sync);
        Self {
            store,
            mempool,
            node,
            audit,
            stability,
            config,
            vote_lock: Mutex::new(()),
            period_lock: Mutex::new(EngineState {
                current_period: None,
                next_voting_height: 0,
            }),
            participation: DashMap::new(),
            disposed: AtomicBool::new(false),
            checker_failures: AtomicU32::new(0),
        }
    }

    // -- Lifecycle ----------------------------------------------------------

    /// Recover the latest period from storage, compute the next boundary
    /// height, and open a period if one is due and the network is stable.
    pub fn initialize(&self) -> Result<(), VotingError> {
        self.ensure_live()?;

        // Storage reads during recovery are retried; an engine that
        // cannot read its own periods is dead on arrival.
        let recovered = with_backoff(
            &RetryPolicy::default(),
            |err: &StorageError| matches!(err, StorageError::Engine(_)),
            || self.store.latest_voting_period(),
        )
        .map_err(|err| {
            self.audit_failure("INIT_FAILED", serde_json::json!({ "error": err.to_string() }));
            VotingError::InitFailed(err.to_string())
        })?;

        let height = self.store.current_height()?;
        let mut state = self.period_lock.lock();
        state.current_period = recovered.filter(|p| p.is_active());
        state.next_voting_height = schedule::next_voting_height(height);

        info!(
            height,
            next_voting_height = state.next_voting_height,
            recovered_period = ?state.current_period.as_ref().map(|p| p.period_id),
            "voting engine initialized"
        );

        if state.current_period.is_none()
            && height >= state.next_voting_height
            && self.stability.is_stable()
        {
            self.open_period_locked(&mut state, PeriodType::ParameterChange, height)?;
        }
        Ok(())
    }

    /// Cancel timers, flush caches, and close downstream collaborators.
    /// Idempotent; every entry point fails with `Disposed` afterwards.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.participation.clear();
        self.node.close();
        self.audit.log_event(AuditEvent::now(
            "voting",
            "ENGINE_DISPOSED",
            AuditSeverity::Info,
            "direct-voting",
            serde_json::Value::Null,
        ));
        info!("voting engine disposed");
    }

    // -- Vote admission -----------------------------------------------------

    /// Admit one vote. The checks run in a fixed order and the first
    /// failure decides the error; on success the vote is enriched with
    /// its quadratic power and persisted atomically together with the
    /// refreshed per-period merkle root.
    pub fn submit_vote(&self, mut vote: Vote) -> Result<(), VotingError> {
        self.ensure_live()?;

        // Lock order: vote, then period.
        let _admission = self.vote_lock.lock();
        let mut state = self.period_lock.lock();

        let period = match state.current_period.as_mut() {
            Some(period) if period.is_active() && period.period_id == vote.period_id => period,
            _ => {
                self.audit_failure(
                    "VOTE_REJECTED",
                    serde_json::json!({ "reason": "inactive_period", "voter": vote.voter }),
                );
                return Err(VotingError::InactivePeriod);
            }
        };

        let height = self.store.current_height()?;
        if !period.contains_height(height) {
            let (start, end) = (period.start_block, period.end_block);
            self.audit_failure(
                "VOTE_REJECTED",
                serde_json::json!({ "reason": "outside_window", "voter": vote.voter, "height": height }),
            );
            return Err(VotingError::OutsideWindow { height, start, end });
        }

        let Some(chain_data) = vote.chain_vote_data.as_ref() else {
            self.audit_failure(
                "VOTE_REJECTED",
                serde_json::json!({ "reason": "invalid_type", "voter": vote.voter }),
            );
            return Err(VotingError::InvalidVoteType);
        };
        let amount = chain_data.amount;

        let size = vote.size_bytes();
        if size > MAX_VOTE_SIZE_BYTES {
            self.audit_failure(
                "VOTE_REJECTED",
                serde_json::json!({ "reason": "too_large", "voter": vote.voter, "size": size }),
            );
            return Err(VotingError::VoteTooLarge {
                size,
                max: MAX_VOTE_SIZE_BYTES,
            });
        }

        let already = self
            .participation
            .get(&vote.voter)
            .map(|entry| *entry.value() == vote.period_id)
            .unwrap_or(false)
            || self.store.has_voted(vote.period_id, &vote.voter)?;
        if already {
            self.audit_failure(
                "VOTE_REJECTED",
                serde_json::json!({ "reason": "duplicate", "voter": vote.voter }),
            );
            return Err(VotingError::DuplicateVote {
                period_id: vote.period_id,
                voter: vote.voter,
            });
        }

        if !vote.verify_signature() {
            self.audit_failure(
                "VOTE_REJECTED",
                serde_json::json!({ "reason": "bad_signature", "voter": vote.voter }),
            );
            return Err(VotingError::InvalidSignature);
        }

        if amount == 0 {
            self.audit_failure(
                "VOTE_REJECTED",
                serde_json::json!({ "reason": "zero_amount", "voter": vote.voter }),
            );
            return Err(VotingError::InvalidVoteAmount);
        }

        // Enrichment happens only after every check has passed; power is
        // derived here, never taken from the submitter.
        vote.voting_power = quadratic_power(amount);

        // Refresh the per-period merkle root over the existing votes plus
        // this one, and persist everything in one storage transaction.
        let mut leaves: Vec<String> = self
            .store
            .votes_for_period(vote.period_id)?
            .iter()
            .map(Vote::merkle_leaf)
            .collect();
        leaves.push(vote.merkle_leaf());
        let root = merkle::compute_root(&leaves)
            .map_err(|err| VotingError::RecordFailed(err.to_string()))?;
        period.votes_merkle_root = root;
        let period_snapshot = period.clone();

        let persisted = (|| -> Result<(), StorageError> {
            self.store.begin_transaction()?;
            self.store
                .tx_put_json(&keys::vote(vote.period_id, &vote.voter), &vote)?;
            self.store
                .tx_put_json(&keys::period_vote(vote.period_id, &vote.voter), &vote)?;
            self.store.tx_put_json(
                &keys::voting_period(period_snapshot.period_id),
                &period_snapshot,
            )?;
            self.store
                .tx_put_json(&keys::period(period_snapshot.period_id), &period_snapshot)?;
            self.store.commit_transaction()
        })();

        if let Err(err) = persisted {
            let _ = self.store.rollback_transaction();
            self.audit_failure(
                "VOTE_RECORD_FAILED",
                serde_json::json!({ "voter": vote.voter, "error": err.to_string() }),
            );
            return Err(VotingError::RecordFailed(err.to_string()));
        }

        self.participation
            .insert(vote.voter.clone(), vote.period_id);
        debug!(
            voter = %vote.voter,
            period = vote.period_id,
            power = %vote.voting_power,
            "vote recorded"
        );
        Ok(())
    }

    // -- Block vote validation ----------------------------------------------

    /// Validate the votes a block carries, in the order the consensus
    /// rules specify. Returns `false` on the first violation; absent
    /// expected validators are reported to the mempool either way.
    pub fn validate_votes(&self, block: &Block) -> bool {
        if block.votes.is_empty() {
            debug!("block carries no votes");
            return false;
        }

        {
            let state = self.period_lock.lock();
            if !state
                .current_period
                .as_ref()
                .map(VotingPeriod::is_active)
                .unwrap_or(false)
            {
                debug!("no active period for block vote validation");
                return false;
            }
        }

        // Expected-validator quorum: at least 2/3 of the expected set must
        // currently be active.
        let expected = self.mempool.get_expected_validators();
        let active: HashSet<String> = self
            .node
            .get_active_validators()
            .into_iter()
            .map(|v| v.address)
            .collect();
        let present = expected
            .iter()
            .filter(|v| active.contains(&v.address))
            .count();
        let quorum = (expected.len() as f64 * crate::config::VALIDATOR_QUORUM).ceil() as usize;
        if present < quorum {
            warn!(present, quorum, "expected-validator quorum not met");
            return false;
        }

        // The header's vote commitment must match the carried votes.
        if Block::votes_root(&block.votes) != block.header.votes_merkle_root {
            warn!("vote merkle root mismatch");
            return false;
        }

        // Vote freshness.
        let now = now_ms();
        let tolerance = VOTE_TIMESTAMP_TOLERANCE.as_millis() as u64;
        for vote in &block.votes {
            if vote.timestamp + tolerance < now || vote.timestamp > now + tolerance {
                warn!(voter = %vote.voter, "vote timestamp outside tolerance");
                return false;
            }
        }

        // Every vote must come from the block's validator set and verify.
        let block_validators: HashSet<&str> =
            block.validators.iter().map(|v| v.address.as_str()).collect();
        for vote in &block.votes {
            if !block_validators.contains(vote.voter.as_str()) || !vote.verify_signature() {
                warn!(voter = %vote.voter, "vote failed validator-set verification");
                return false;
            }
        }

        // All expected validators must be present; absentees get reported.
        let mut all_present = true;
        for validator in &expected {
            if !block_validators.contains(validator.address.as_str()) {
                self.mempool
                    .handle_validation_failure("expected validator absent from block", validator);
                all_present = false;
            }
        }
        all_present
    }

    // -- Fork arbitration ---------------------------------------------------

    /// Arbitrate between the incumbent chain `old_id` and the challenger
    /// `new_id` at `fork_height`. Unstable network ⇒ incumbent wins
    /// without a period being opened. Ties go to the incumbent.
    pub fn handle_chain_fork(
        &self,
        old_id: &str,
        new_id: &str,
        fork_height: u64,
        validators: &[Validator],
    ) -> Result<String, VotingError> {
        self.ensure_live()?;

        if !self.stability.is_stable() {
            self.audit_failure(
                "FORK_RESOLUTION_SUPPRESSED",
                serde_json::json!({ "old": old_id, "new": new_id, "fork_height": fork_height }),
            );
            return Ok(old_id.to_string());
        }

        // Guarantee an active chain-selection window.
        let (period_id, opened_ephemeral) = {
            let mut state = self.period_lock.lock();
            match state.current_period.as_ref().filter(|p| p.is_active()) {
                Some(period) => (period.period_id, false),
                None => {
                    let height = self.store.current_height()?;
                    let period =
                        self.open_period_locked(&mut state, PeriodType::NodeSelection, height)?;
                    (period, true)
                }
            }
        };

        // Give gossip-delivered votes time to arrive.
        if !self.config.fork_collection_window.is_zero() {
            std::thread::sleep(self.config.fork_collection_window);
        }

        // Tally quadratic power per chain, counting only the supplied
        // validator set.
        let eligible: HashSet<&str> = validators.iter().map(|v| v.address.as_str()).collect();
        let mut old_power: Units = 0;
        let mut new_power: Units = 0;
        for vote in self.store.votes_for_period(period_id)? {
            let Some(data) = vote.chain_vote_data.as_ref() else {
                continue;
            };
            if data.fork_height != fork_height
                || !eligible.contains(vote.voter.as_str())
                || !vote.verify_signature()
            {
                continue;
            }
            if data.target_chain_id == new_id {
                new_power = new_power.saturating_add(vote.voting_power);
            } else if data.target_chain_id == old_id {
                old_power = old_power.saturating_add(vote.voting_power);
            }
        }

        if opened_ephemeral {
            let mut state = self.period_lock.lock();
            let is_ours = state
                .current_period
                .as_ref()
                .map(|p| p.period_id == period_id)
                .unwrap_or(false);
            if is_ours {
                if let Some(period) = state.current_period.as_mut() {
                    if period.complete().is_ok() {
                        self.store.put_voting_period(period)?;
                    }
                }
                state.current_period = None;
            }
        }

        let winner = if new_power > old_power { new_id } else { old_id };
        info!(
            old_id,
            new_id,
            fork_height,
            old_power = %old_power,
            new_power = %new_power,
            winner,
            "chain fork resolved"
        );
        self.audit.log_event(AuditEvent::now(
            "voting",
            "FORK_RESOLVED",
            AuditSeverity::Info,
            "direct-voting",
            serde_json::json!({
                "winner": winner,
                "old_power": old_power.to_string(),
                "new_power": new_power.to_string(),
            }),
        ));
        Ok(winner.to_string())
    }

    // -- Period transitions -------------------------------------------------

    /// One pass of the periodic checker: complete the current period if
    /// its window has closed, and open the successor when due and stable.
    pub fn check_period_transitions(&self) -> Result<(), VotingError> {
        self.ensure_live()?;
        let height = self.store.current_height()?;
        let now = now_ms();
        let mut state = self.period_lock.lock();

        if let Some(period) = state.current_period.as_mut() {
            if period.is_active() && (height > period.end_block || period.timed_out(now)) {
                period
                    .complete()
                    .map_err(|err| VotingError::RecordFailed(err.to_string()))?;
                self.store.put_voting_period(period)?;
                info!(period = period.period_id, height, "voting period completed");
                state.current_period = None;
                self.participation.clear();
            }
        }

        state.next_voting_height = schedule::next_voting_height(height);
        if state.current_period.is_none()
            && height >= state.next_voting_height
            && self.stability.is_stable()
        {
            self.open_period_locked(&mut state, PeriodType::ParameterChange, height)?;
        }
        Ok(())
    }

    /// Drive period transitions on an interval until disposal or too many
    /// consecutive failures. Spawn on the runtime:
    ///
    /// ```ignore
    /// tokio::spawn(engine.clone().run_period_checker(Duration::from_secs(60)));
    /// ```
    pub async fn run_period_checker(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if self.disposed.load(Ordering::SeqCst) {
                break;
            }
            match self.check_period_transitions() {
                Ok(()) => {
                    self.checker_failures.store(0, Ordering::SeqCst);
                }
                Err(err) => {
                    let failures = self.checker_failures.fetch_add(1, Ordering::SeqCst) + 1;
                    warn!(failures, error = %err, "period transition failed");
                    if failures >= MAX_CONSECUTIVE_PERIOD_FAILURES {
                        self.audit_failure(
                            "PERIOD_CHECKER_HALTED",
                            serde_json::json!({ "failures": failures }),
                        );
                        break;
                    }
                }
            }
        }
    }

    fn open_period_locked(
        &self,
        state: &mut EngineState,
        period_type: PeriodType,
        start_block: u64,
    ) -> Result<u64, VotingError> {
        let period_id = self
            .store
            .latest_voting_period()?
            .map(|p| p.period_id + 1)
            .unwrap_or(1);
        let blocks = match period_type {
            PeriodType::NodeSelection => self.config.fork_window_blocks,
            PeriodType::ParameterChange => self.config.period_blocks,
        };
        let avg = schedule::average_block_time(&self.store)?;
        let duration_ms = avg.as_millis() as u64 * blocks;
        let period = VotingPeriod::open(
            period_id,
            start_block,
            start_block + blocks.saturating_sub(1),
            period_type,
            now_ms(),
            duration_ms,
        );
        self.store.put_voting_period(&period)?;
        info!(
            period = period_id,
            ?period_type,
            start_block,
            end_block = period.end_block,
            "voting period opened"
        );
        state.current_period = Some(period);
        Ok(period_id)
    }

    // -- Cached reads -------------------------------------------------------

    /// `true` if the address has an admitted vote in the current period.
    pub fn has_participated(&self, address: &str) -> Result<bool, VotingError> {
        let period_id = {
            let state = self.period_lock.lock();
            match state.current_period.as_ref() {
                Some(period) => period.period_id,
                None => return Ok(false),
            }
        };
        if let Some(entry) = self.participation.get(address) {
            if *entry.value() == period_id {
                return Ok(true);
            }
        }
        let voted = self.store.has_voted(period_id, address)?;
        if voted {
            self.participation.insert(address.to_string(), period_id);
        }
        Ok(voted)
    }

    /// Addresses that have voted in the current period.
    pub fn get_active_voters(&self) -> Result<HashSet<String>, VotingError> {
        let state = self.period_lock.lock();
        let Some(period) = state.current_period.as_ref() else {
            return Ok(HashSet::new());
        };
        Ok(self
            .store
            .votes_for_period(period.period_id)?
            .into_iter()
            .map(|v| v.voter)
            .collect())
    }

    /// Aggregate metrics over the current period.
    pub fn get_voting_metrics(&self) -> Result<VotingMetrics, VotingError> {
        let (period_id, next_height) = {
            let state = self.period_lock.lock();
            (
                state.current_period.as_ref().map(|p| p.period_id),
                state.next_voting_height,
            )
        };
        let votes = match period_id {
            Some(id) => self.store.votes_for_period(id)?,
            None => Vec::new(),
        };
        let voters: HashSet<&str> = votes.iter().map(|v| v.voter.as_str()).collect();
        Ok(VotingMetrics {
            current_period_id: period_id,
            votes_cast: votes.len() as u64,
            total_voting_power: votes
                .iter()
                .fold(0u128, |acc, v| acc.saturating_add(v.voting_power)),
            active_voters: voters.len() as u64,
            next_voting_height: next_height,
        })
    }

    /// The transition schedule as currently estimated.
    pub fn get_voting_schedule(&self) -> Result<VotingSchedule, VotingError> {
        let height = self.store.current_height()?;
        let avg = schedule::average_block_time(&self.store)?;
        let state = self.period_lock.lock();
        let next = state.next_voting_height.max(schedule::next_voting_height(height));
        Ok(VotingSchedule {
            current_period_id: state.current_period.as_ref().map(|p| p.period_id),
            next_voting_height: next,
            blocks_remaining: next.saturating_sub(height),
            estimated_wait: schedule::transition_delay(height, avg),
        })
    }

    // -- Internals ----------------------------------------------------------

    fn ensure_live(&self) -> Result<(), VotingError> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(VotingError::Disposed);
        }
        Ok(())
    }

    fn audit_failure(&self, action: &str, details: serde_json::Value) {
        self.audit.log_event(AuditEvent::now(
            "voting",
            action,
            AuditSeverity::Warning,
            "direct-voting",
            details,
        ));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{MemoryAudit, SyncState};
    use crate::crypto::keys::Keypair;
    use crate::types::validator::test_validator;
    use crate::types::vote::signed_vote;

    struct StubMempool;
    impl MempoolApi for StubMempool {
        fn get_expected_validators(&self) -> Vec<Validator> {
            Vec::new()
        }
        fn handle_validation_failure(&self, _reason: &str, _validator: &Validator) {}
        fn get_size(&self) -> u32 {
            0
        }
    }

    struct StubNode {
        peers: u32,
    }
    impl NodeApi for StubNode {
        fn get_peer_count(&self) -> u32 {
            self.peers
        }
        fn get_active_validators(&self) -> Vec<Validator> {
            Vec::new()
        }
        fn close(&self) {}
    }

    struct StubSync;
    impl SyncApi for StubSync {
        fn get_state(&self) -> SyncState {
            SyncState::Synced
        }
    }

    fn engine_with_peers(peers: u32) -> (Arc<DirectVotingEngine>, Arc<MemoryAudit>) {
        let audit = MemoryAudit::new();
        let store = Arc::new(ChainStore::open_temporary(audit.clone()).unwrap());
        let config = VotingConfig {
            fork_collection_window: Duration::ZERO,
            ..VotingConfig::default()
        };
        let engine = Arc::new(DirectVotingEngine::new(
            store,
            Arc::new(StubMempool),
            Arc::new(StubNode { peers }),
            Arc::new(StubSync),
            audit.clone(),
            config,
        ));
        (engine, audit)
    }

    /// Stable engine with an open period at height 0.
    fn ready_engine() -> (Arc<DirectVotingEngine>, Arc<MemoryAudit>) {
        let (engine, audit) = engine_with_peers(5);
        engine.initialize().unwrap();
        (engine, audit)
    }

    #[test]
    fn initialize_opens_period_when_due_and_stable() {
        let (engine, _) = ready_engine();
        let metrics = engine.get_voting_metrics().unwrap();
        assert_eq!(metrics.current_period_id, Some(1));
        assert_eq!(metrics.votes_cast, 0);
    }

    #[test]
    fn initialize_respects_instability() {
        let (engine, _) = engine_with_peers(1);
        engine.initialize().unwrap();
        assert_eq!(
            engine.get_voting_metrics().unwrap().current_period_id,
            None
        );
    }

    #[test]
    fn initialize_recovers_persisted_period() {
        let (engine, _) = ready_engine();
        // A second engine over the same store should adopt period 1.
        let metrics = engine.get_voting_metrics().unwrap();
        assert_eq!(metrics.current_period_id, Some(1));

        engine.initialize().unwrap();
        assert_eq!(
            engine.get_voting_metrics().unwrap().current_period_id,
            Some(1)
        );
    }

    #[test]
    fn vote_is_enriched_and_persisted() {
        let (engine, _) = ready_engine();
        let kp = Keypair::generate();
        let vote = signed_vote(&kp, 1, 100);

        engine.submit_vote(vote.clone()).unwrap();

        let stored = engine
            .store
            .get_vote(1, &vote.voter)
            .unwrap()
            .expect("vote persisted");
        assert_eq!(stored.voting_power, 10); // ⌊√100⌋
        assert!(engine.has_participated(&vote.voter).unwrap());

        // The period merkle root was refreshed in the same transaction.
        let period = engine.store.get_voting_period(1).unwrap().unwrap();
        assert_eq!(
            period.votes_merkle_root,
            merkle::compute_root(&[stored.merkle_leaf()]).unwrap()
        );
    }

    #[test]
    fn duplicate_vote_rejected_and_first_record_kept() {
        let (engine, _) = ready_engine();
        let kp = Keypair::generate();
        let first = signed_vote(&kp, 1, 100);
        engine.submit_vote(first.clone()).unwrap();

        let mut second = signed_vote(&kp, 1, 100);
        second.vote_id = "different-id".into();
        second.signature = kp.sign_hex(&second.signing_payload());
        let err = engine.submit_vote(second).unwrap_err();
        assert!(matches!(err, VotingError::DuplicateVote { .. }));

        let stored = engine.store.get_vote(1, &first.voter).unwrap().unwrap();
        assert_eq!(stored.vote_id, first.vote_id);
    }

    #[test]
    fn vote_without_chain_data_rejected() {
        let (engine, _) = ready_engine();
        let kp = Keypair::generate();
        let mut vote = signed_vote(&kp, 1, 100);
        vote.chain_vote_data = None;
        vote.signature = kp.sign_hex(&vote.signing_payload());
        assert!(matches!(
            engine.submit_vote(vote),
            Err(VotingError::InvalidVoteType)
        ));
    }

    #[test]
    fn forged_signature_rejected() {
        let (engine, _) = ready_engine();
        let kp = Keypair::generate();
        let mut vote = signed_vote(&kp, 1, 100);
        vote.chain_vote_data.as_mut().unwrap().amount = 10_000; // tamper
        assert!(matches!(
            engine.submit_vote(vote),
            Err(VotingError::InvalidSignature)
        ));
    }

    #[test]
    fn zero_amount_rejected() {
        let (engine, _) = ready_engine();
        let kp = Keypair::generate();
        let vote = signed_vote(&kp, 1, 0);
        assert!(matches!(
            engine.submit_vote(vote),
            Err(VotingError::InvalidVoteAmount)
        ));
    }

    #[test]
    fn vote_for_wrong_period_rejected() {
        let (engine, _) = ready_engine();
        let kp = Keypair::generate();
        let vote = signed_vote(&kp, 7, 100); // period 7 is not current
        assert!(matches!(
            engine.submit_vote(vote),
            Err(VotingError::InactivePeriod)
        ));
    }

    #[test]
    fn no_active_period_rejects_votes() {
        let (engine, _) = engine_with_peers(1); // unstable, no period opened
        engine.initialize().unwrap();
        let kp = Keypair::generate();
        assert!(matches!(
            engine.submit_vote(signed_vote(&kp, 1, 100)),
            Err(VotingError::InactivePeriod)
        ));
    }

    #[test]
    fn rejections_emit_audit_events() {
        let (engine, audit) = ready_engine();
        let kp = Keypair::generate();
        let mut vote = signed_vote(&kp, 1, 100);
        vote.chain_vote_data = None;
        vote.signature = kp.sign_hex(&vote.signing_payload());
        let _ = engine.submit_vote(vote);
        assert!(audit.has_action("VOTE_REJECTED"));
    }

    #[test]
    fn unstable_network_suppresses_fork_resolution() {
        let (engine, audit) = engine_with_peers(1); // below MIN_PEER_COUNT
        let validators = vec![test_validator(&Keypair::generate(), 90)];
        let winner = engine
            .handle_chain_fork("A", "B", 1_000, &validators)
            .unwrap();
        assert_eq!(winner, "A");
        // No chain-voting period was opened.
        assert!(engine.store.latest_voting_period().unwrap().is_none());
        assert!(audit.has_action("FORK_RESOLUTION_SUPPRESSED"));
    }

    #[test]
    fn fork_resolution_weighs_quadratic_power() {
        let (engine, _) = engine_with_peers(5);
        engine.initialize().unwrap();

        // Two validators back chain B with 100 each (power 10+10); one
        // whale backs A with 300 (power 17). B wins on power.
        let kp_a = Keypair::generate();
        let kp_b1 = Keypair::generate();
        let kp_b2 = Keypair::generate();
        let validators = vec![
            test_validator(&kp_a, 90),
            test_validator(&kp_b1, 90),
            test_validator(&kp_b2, 90),
        ];

        let mut whale = signed_vote(&kp_a, 1, 300);
        whale.chain_vote_data.as_mut().unwrap().target_chain_id = "A".into();
        whale.signature = kp_a.sign_hex(&whale.signing_payload());
        engine.submit_vote(whale).unwrap();

        for kp in [&kp_b1, &kp_b2] {
            let mut vote = signed_vote(kp, 1, 100);
            vote.chain_vote_data.as_mut().unwrap().target_chain_id = "B".into();
            vote.signature = kp.sign_hex(&vote.signing_payload());
            engine.submit_vote(vote).unwrap();
        }

        let winner = engine.handle_chain_fork("A", "B", 1_000, &validators).unwrap();
        assert_eq!(winner, "B");
    }

    #[test]
    fn fork_tie_goes_to_incumbent() {
        let (engine, _) = engine_with_peers(5);
        engine.initialize().unwrap();
        let validators = vec![test_validator(&Keypair::generate(), 90)];
        // No votes at all: 0 == 0, incumbent wins.
        let winner = engine.handle_chain_fork("A", "B", 1_000, &validators).unwrap();
        assert_eq!(winner, "A");
    }

    #[test]
    fn fork_ignores_non_validator_votes() {
        let (engine, _) = engine_with_peers(5);
        engine.initialize().unwrap();

        let outsider = Keypair::generate();
        let mut vote = signed_vote(&outsider, 1, 10_000);
        vote.chain_vote_data.as_mut().unwrap().target_chain_id = "B".into();
        vote.signature = outsider.sign_hex(&vote.signing_payload());
        engine.submit_vote(vote).unwrap();

        // The outsider is not in the supplied validator set.
        let validators = vec![test_validator(&Keypair::generate(), 90)];
        let winner = engine.handle_chain_fork("A", "B", 1_000, &validators).unwrap();
        assert_eq!(winner, "A");
    }

    #[test]
    fn transitions_complete_timed_out_period() {
        let (engine, _) = ready_engine();
        // Force the current period's deadline into the past.
        {
            let mut state = engine.period_lock.lock();
            let period = state.current_period.as_mut().unwrap();
            period.end_time = 1; // long expired
            engine.store.put_voting_period(period).unwrap();
        }
        engine.check_period_transitions().unwrap();

        let stored = engine.store.get_voting_period(1).unwrap().unwrap();
        assert!(stored.is_terminal());
        // A successor period opened at the same (boundary) height.
        assert_eq!(
            engine.get_voting_metrics().unwrap().current_period_id,
            Some(2)
        );
    }

    #[test]
    fn disposed_engine_refuses_everything() {
        let (engine, audit) = ready_engine();
        engine.dispose();
        let kp = Keypair::generate();
        assert!(matches!(
            engine.submit_vote(signed_vote(&kp, 1, 100)),
            Err(VotingError::Disposed)
        ));
        assert!(matches!(
            engine.handle_chain_fork("A", "B", 1, &[]),
            Err(VotingError::Disposed)
        ));
        assert!(audit.has_action("ENGINE_DISPOSED"));
        // Idempotent.
        engine.dispose();
    }

    #[test]
    fn metrics_aggregate_votes() {
        let (engine, _) = ready_engine();
        for amount in [100u128, 400] {
            let kp = Keypair::generate();
            engine.submit_vote(signed_vote(&kp, 1, amount)).unwrap();
        }
        let metrics = engine.get_voting_metrics().unwrap();
        assert_eq!(metrics.votes_cast, 2);
        assert_eq!(metrics.active_voters, 2);
        assert_eq!(metrics.total_voting_power, 10 + 20);
    }

    #[test]
    fn schedule_reports_boundary() {
        let (engine, _) = ready_engine();
        let schedule = engine.get_voting_schedule().unwrap();
        assert_eq!(schedule.current_period_id, Some(1));
        assert_eq!(schedule.blocks_remaining, 0); // height 0 is a boundary
    }

    #[test]
    fn active_voters_lists_participants() {
        let (engine, _) = ready_engine();
        let kp = Keypair::generate();
        let vote = signed_vote(&kp, 1, 100);
        let voter = vote.voter.clone();
        engine.submit_vote(vote).unwrap();
        let voters = engine.get_active_voters().unwrap();
        assert!(voters.contains(&voter));
        assert_eq!(voters.len(), 1);
    }
}

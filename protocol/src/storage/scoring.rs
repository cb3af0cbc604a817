//! # Validator Scoring
//!
//! Computes the composite "expected block production" score used to weigh
//! validators:
//!
//! ```text
//! score       = 0.4·pow_contribution + 0.4·token_vote_share + 0.2·reliability
//! reliability = 0.4·uptime + 0.4·block_success + 0.2·normalized_response_time
//! ```
//!
//! Every ingredient is derived from prefixed range scans over the store:
//! hash power and response times from heartbeats in the last hour, block
//! production from the miner index over the last day, vote share from the
//! vote keyspace over the last day, uptime from the stored metric. The
//! final score is cached with the metrics TTL, so repeated scoring of the
//! same validator inside a five-minute window is one scan, not many.

use tracing::debug;

use crate::storage::db::ChainStore;
use crate::storage::errors::StorageResult;
use crate::storage::keys;
use crate::types::amount::Units;
use crate::types::vote::Vote;

/// Window for hash-power and response-time samples: one hour.
const HOT_WINDOW_MS: u64 = 60 * 60 * 1_000;

/// Window for block production and vote share: one day.
const DAY_WINDOW_MS: u64 = 24 * 60 * 60 * 1_000;

/// Block slots per day at the 600-second target.
const EXPECTED_DAILY_BLOCKS: f64 = 144.0;

/// Response time treated as "perfect" for normalization.
const TARGET_RESPONSE_MS: f64 = 1_000.0;

/// Breakdown of a validator's production score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProductionScore {
    /// Mean hash-power share over the last hour, `[0, 1]`.
    pub pow_contribution: f64,
    /// Share of quadratic vote power over the last day, `[0, 1]`.
    pub token_vote_share: f64,
    /// Composite reliability, `[0, 1]`.
    pub reliability: f64,
    /// The weighted total.
    pub score: f64,
}

impl ChainStore {
    /// Composite expected-block-production score for `address` at `now`
    /// (milliseconds since epoch). Cached for the metrics TTL.
    pub fn expected_production_score(
        &self,
        address: &str,
        now_ms: u64,
    ) -> StorageResult<ProductionScore> {
        let pow_contribution = self.pow_contribution(address, now_ms)?;
        let token_vote_share = self.token_vote_share(address, now_ms)?;
        let reliability = self.reliability(address, now_ms)?;

        let score = 0.4 * pow_contribution + 0.4 * token_vote_share + 0.2 * reliability;
        debug!(
            address,
            pow = pow_contribution,
            vote_share = token_vote_share,
            reliability,
            score,
            "production score computed"
        );
        Ok(ProductionScore {
            pow_contribution,
            token_vote_share,
            reliability,
            score,
        })
    }

    /// Mean hash-power share over heartbeats in the last hour.
    fn pow_contribution(&self, address: &str, now_ms: u64) -> StorageResult<f64> {
        let since = now_ms.saturating_sub(HOT_WINDOW_MS);
        let heartbeats = self.heartbeats_since(address, since)?;
        if heartbeats.is_empty() {
            return Ok(0.0);
        }
        let sum: f64 = heartbeats.iter().map(|hb| hb.hash_power).sum();
        Ok((sum / heartbeats.len() as f64).clamp(0.0, 1.0))
    }

    /// This validator's fraction of all quadratic vote power cast in the
    /// last day.
    fn token_vote_share(&self, address: &str, now_ms: u64) -> StorageResult<f64> {
        let since = now_ms.saturating_sub(DAY_WINDOW_MS);
        let mut own: Units = 0;
        let mut total: Units = 0;
        for (_, raw) in self.prefix_scan(keys::VOTE_PREFIX)? {
            let vote: Vote = serde_json::from_str(&raw)?;
            if vote.timestamp < since {
                continue;
            }
            total = total.saturating_add(vote.voting_power);
            if vote.voter == address {
                own = own.saturating_add(vote.voting_power);
            }
        }
        if total == 0 {
            return Ok(0.0);
        }
        Ok((own as f64 / total as f64).clamp(0.0, 1.0))
    }

    /// `0.4·uptime + 0.4·block_success + 0.2·normalized_response_time`.
    fn reliability(&self, address: &str, now_ms: u64) -> StorageResult<f64> {
        let uptime = self
            .get_metric(&keys::validator_uptime(address))?
            .unwrap_or(0.0)
            .clamp(0.0, 1.0);

        // Block success: mined blocks in the last day against the expected
        // slot count, read from the miner index.
        let since = now_ms.saturating_sub(DAY_WINDOW_MS);
        let miner_prefix = format!("{}{address}:", keys::BLOCK_MINER_PREFIX);
        let produced = self
            .prefix_scan(&miner_prefix)?
            .into_iter()
            .filter(|(key, _)| {
                key.rsplit(':')
                    .next()
                    .and_then(|ts| ts.parse::<u64>().ok())
                    .map(|ts| ts >= since)
                    .unwrap_or(false)
            })
            .count();
        let block_success = (produced as f64 / EXPECTED_DAILY_BLOCKS).clamp(0.0, 1.0);

        // Response time: target-over-actual, clamped. Faster than target
        // is simply 1.0.
        let hot_since = now_ms.saturating_sub(HOT_WINDOW_MS);
        let heartbeats = self.heartbeats_since(address, hot_since)?;
        let normalized_response = if heartbeats.is_empty() {
            0.0
        } else {
            let mean_ms: f64 = heartbeats
                .iter()
                .map(|hb| hb.response_time_ms as f64)
                .sum::<f64>()
                / heartbeats.len() as f64;
            if mean_ms <= 0.0 {
                1.0
            } else {
                (TARGET_RESPONSE_MS / mean_ms).clamp(0.0, 1.0)
            }
        };

        Ok(0.4 * uptime + 0.4 * block_success + 0.2 * normalized_response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::MemoryAudit;
    use crate::crypto::keys::Keypair;
    use crate::storage::db::Heartbeat;
    use crate::types::vote::signed_vote;

    fn store() -> ChainStore {
        ChainStore::open_temporary(MemoryAudit::new()).unwrap()
    }

    const NOW: u64 = 10 * 24 * 60 * 60 * 1_000; // day 10

    #[test]
    fn zero_history_scores_zero() {
        let store = store();
        let score = store.expected_production_score("h3:ghost", NOW).unwrap();
        assert_eq!(score.score, 0.0);
        assert_eq!(score.pow_contribution, 0.0);
        assert_eq!(score.token_vote_share, 0.0);
    }

    #[test]
    fn pow_contribution_averages_recent_heartbeats() {
        let store = store();
        // Two in-window samples, one stale.
        for (ts, power) in [(NOW - 1_000, 0.4), (NOW - 2_000, 0.2), (NOW - HOT_WINDOW_MS - 1, 0.9)]
        {
            store
                .record_heartbeat(
                    "h3:v",
                    &Heartbeat {
                        timestamp: ts,
                        hash_power: power,
                        response_time_ms: 500,
                    },
                )
                .unwrap();
        }
        let score = store.expected_production_score("h3:v", NOW).unwrap();
        assert!((score.pow_contribution - 0.3).abs() < 1e-9);
    }

    #[test]
    fn vote_share_is_relative_to_all_voters() {
        let store = store();
        let alice = Keypair::generate();
        let bob = Keypair::generate();

        let mut a = signed_vote(&alice, 1, 0);
        a.voting_power = 30;
        a.timestamp = NOW - 1_000;
        store.put_vote(&a).unwrap();

        let mut b = signed_vote(&bob, 1, 0);
        b.voting_power = 10;
        b.timestamp = NOW - 1_000;
        store.put_vote(&b).unwrap();

        let score = store
            .expected_production_score(&alice.public_hex(), NOW)
            .unwrap();
        assert!((score.token_vote_share - 0.75).abs() < 1e-9);
    }

    #[test]
    fn reliability_combines_three_ingredients() {
        let store = store();
        store
            .set_metric(&keys::validator_uptime("h3:v"), 1.0)
            .unwrap();
        // Perfect response time.
        store
            .record_heartbeat(
                "h3:v",
                &Heartbeat {
                    timestamp: NOW - 500,
                    hash_power: 0.0,
                    response_time_ms: 500,
                },
            )
            .unwrap();
        let score = store.expected_production_score("h3:v", NOW).unwrap();
        // uptime 1.0 × 0.4 + blocks 0 × 0.4 + response 1.0 × 0.2.
        assert!((score.reliability - 0.6).abs() < 1e-9);
    }

    #[test]
    fn score_is_weighted_sum() {
        let store = store();
        let kp = Keypair::generate();
        let addr = kp.public_hex();

        store
            .record_heartbeat(
                &addr,
                &Heartbeat {
                    timestamp: NOW - 100,
                    hash_power: 1.0,
                    response_time_ms: 100,
                },
            )
            .unwrap();
        let mut vote = signed_vote(&kp, 1, 0);
        vote.voting_power = 10;
        vote.timestamp = NOW - 100;
        store.put_vote(&vote).unwrap();
        store
            .set_metric(&keys::validator_uptime(&addr), 1.0)
            .unwrap();

        let score = store.expected_production_score(&addr, NOW).unwrap();
        let expected =
            0.4 * score.pow_contribution + 0.4 * score.token_vote_share + 0.2 * score.reliability;
        assert!((score.score - expected).abs() < 1e-12);
        assert!(score.score > 0.0);
    }
}

//! # Key Namespaces
//!
//! Every key in the store is flat ASCII with colon-separated segments.
//! This module is the single place keys get built, so a typo'd prefix
//! cannot silently fork the keyspace.
//!
//! Numeric segments (heights, period ids, timestamps) are zero-padded to
//! 20 digits so that sled's lexicographic byte order equals numeric order
//! — range scans over heights come back sorted without any decoding.

/// Zero-pad a u64 so lexicographic order equals numeric order.
pub fn pad_u64(value: u64) -> String {
    format!("{value:020}")
}

// -- Blocks -----------------------------------------------------------------

pub const BLOCK_HEIGHT_PREFIX: &str = "block:height:";
pub const BLOCK_HASH_PREFIX: &str = "block:hash:";
pub const BLOCK_MINER_PREFIX: &str = "block:miner:";
pub const BLOCK_TIMESTAMP_PREFIX: &str = "block:timestamp:";

pub fn block_height(height: u64) -> String {
    format!("{BLOCK_HEIGHT_PREFIX}{}", pad_u64(height))
}

pub fn block_hash(hash: &str) -> String {
    format!("{BLOCK_HASH_PREFIX}{hash}")
}

pub fn block_miner(miner: &str, timestamp: u64) -> String {
    format!("{BLOCK_MINER_PREFIX}{miner}:{}", pad_u64(timestamp))
}

pub fn block_timestamp(timestamp: u64) -> String {
    format!("{BLOCK_TIMESTAMP_PREFIX}{}", pad_u64(timestamp))
}

// -- Transactions -----------------------------------------------------------

pub const TRANSACTIONS_PREFIX: &str = "transactions:";
pub const TX_TYPE_PREFIX: &str = "tx_type:";

pub fn transaction(hash: &str) -> String {
    format!("{TRANSACTIONS_PREFIX}{hash}")
}

pub fn tx_type(type_tag: &str, hash: &str) -> String {
    format!("{TX_TYPE_PREFIX}{type_tag}:{hash}")
}

// -- UTXOs ------------------------------------------------------------------

pub const UTXO_PREFIX: &str = "utxo:";

pub fn utxo(address: &str, tx_id: &str, output_index: u32) -> String {
    format!("{UTXO_PREFIX}{address}:{tx_id}:{output_index}")
}

pub fn utxo_address_prefix(address: &str) -> String {
    format!("{UTXO_PREFIX}{address}:")
}

// -- Votes & Periods --------------------------------------------------------

pub const VOTE_PREFIX: &str = "vote:";
pub const PERIOD_VOTE_PREFIX: &str = "period_vote:";
pub const VOTING_PERIOD_PREFIX: &str = "voting_period:";
pub const PERIOD_PREFIX: &str = "period:";

pub fn vote(period_id: u64, voter: &str) -> String {
    format!("{VOTE_PREFIX}{}:{voter}", pad_u64(period_id))
}

pub fn vote_period_prefix(period_id: u64) -> String {
    format!("{VOTE_PREFIX}{}:", pad_u64(period_id))
}

pub fn period_vote(period_id: u64, voter: &str) -> String {
    format!("{PERIOD_VOTE_PREFIX}{}:{voter}", pad_u64(period_id))
}

pub fn voting_period(period_id: u64) -> String {
    format!("{VOTING_PERIOD_PREFIX}{}", pad_u64(period_id))
}

pub fn period(period_id: u64) -> String {
    format!("{PERIOD_PREFIX}{}", pad_u64(period_id))
}

// -- Validators -------------------------------------------------------------

pub const VALIDATOR_PREFIX: &str = "validator:";
pub const VALIDATOR_UPTIME_PREFIX: &str = "validator_uptime:";
pub const VOTE_PARTICIPATION_PREFIX: &str = "vote_participation:";
pub const BLOCK_PRODUCTION_PREFIX: &str = "block_production:";
pub const SLASH_PREFIX: &str = "slash:";
pub const VALIDATOR_HEARTBEAT_PREFIX: &str = "validator_heartbeat:";

pub fn validator(address: &str) -> String {
    format!("{VALIDATOR_PREFIX}{address}")
}

pub fn validator_uptime(address: &str) -> String {
    format!("{VALIDATOR_UPTIME_PREFIX}{address}")
}

pub fn vote_participation(address: &str) -> String {
    format!("{VOTE_PARTICIPATION_PREFIX}{address}")
}

pub fn block_production(address: &str) -> String {
    format!("{BLOCK_PRODUCTION_PREFIX}{address}")
}

pub fn slash(address: &str, timestamp: u64) -> String {
    format!("{SLASH_PREFIX}{address}:{}", pad_u64(timestamp))
}

pub fn slash_address_prefix(address: &str) -> String {
    format!("{SLASH_PREFIX}{address}:")
}

pub fn validator_heartbeat(address: &str, timestamp: u64) -> String {
    format!("{VALIDATOR_HEARTBEAT_PREFIX}{address}:{}", pad_u64(timestamp))
}

pub fn validator_heartbeat_prefix(address: &str) -> String {
    format!("{VALIDATOR_HEARTBEAT_PREFIX}{address}:")
}

// -- Chain metadata ---------------------------------------------------------

pub const CHAIN_HEAD: &str = "chain:head";
pub const CHAIN_STATE: &str = "chain_state";
pub const CURRENT_HEIGHT: &str = "current_height";

pub fn nonce(address: &str) -> String {
    format!("nonce:{address}")
}

// -- Misc namespaces --------------------------------------------------------

pub const SHARD_PREFIX: &str = "shard:";
pub const SNAPSHOT_PREFIX: &str = "snapshot:";

pub fn shard(shard_id: u64) -> String {
    format!("{SHARD_PREFIX}{}", pad_u64(shard_id))
}

pub fn seed(address: &str) -> String {
    format!("seed:{address}")
}

pub fn signature(address: &str, message: &str) -> String {
    format!("signature:{address}:{message}")
}

pub fn snapshot(id: &str) -> String {
    format!("{SNAPSHOT_PREFIX}{id}")
}

pub fn access(id: &str) -> String {
    format!("access:{id}")
}

pub fn delegation(address: &str) -> String {
    format!("delegation:{address}")
}

pub fn difficulty(block_hash: &str) -> String {
    format!("difficulty:{block_hash}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padded_heights_sort_lexicographically() {
        // Without padding, "block:height:9" > "block:height:10". With it,
        // byte order equals numeric order across the u64 range.
        assert!(block_height(9) < block_height(10));
        assert!(block_height(999) < block_height(1_000));
        assert!(block_height(u64::MAX - 1) < block_height(u64::MAX));
    }

    #[test]
    fn keys_are_ascii() {
        for key in [
            block_height(42),
            block_miner("h3:m", 7),
            vote(3, "h3:alice"),
            validator_heartbeat("h3:v", 12),
            difficulty("abcd"),
        ] {
            assert!(key.is_ascii(), "{key} must be ASCII");
        }
    }

    #[test]
    fn vote_keys_group_by_period() {
        let key = vote(7, "h3:alice");
        assert!(key.starts_with(&vote_period_prefix(7)));
        assert!(!key.starts_with(&vote_period_prefix(8)));
    }

    #[test]
    fn utxo_key_shape() {
        assert_eq!(utxo("h3:a", "cafe", 3), "utxo:h3:a:cafe:3");
        assert!(utxo("h3:a", "cafe", 3).starts_with(&utxo_address_prefix("h3:a")));
    }
}

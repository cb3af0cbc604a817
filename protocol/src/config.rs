//! # Protocol Configuration & Constants
//!
//! Every magic number in H3TAG lives here. If you're hardcoding a constant
//! somewhere else, you're doing it wrong and you owe the team coffee.
//!
//! These values define the DNA of the network: the voting cadence, the
//! emission curve, the block-size envelope, and the storage tuning knobs.
//! Changing any of the consensus-critical ones after mainnet launch is a
//! hard fork. Choose wisely during devnet.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Monetary Parameters
// ---------------------------------------------------------------------------

/// Number of decimal places in the base unit. One whole TAG is 10^18 base
/// units, same convention as wei. All consensus arithmetic happens on u128
/// base units; the 18-decimal form exists only for display.
pub const UNIT_DECIMALS: u32 = 18;

/// Base units per whole TAG.
pub const UNITS_PER_TAG: u128 = 1_000_000_000_000_000_000;

/// Initial circulating supply at genesis, in whole TAG.
pub const INITIAL_SUPPLY: u128 = 21_000_000;

/// Hard cap on total supply, in whole TAG. The source material carried two
/// conflicting figures; consensus adopts the lower one.
pub const MAX_SUPPLY: u128 = 69_690_000;

/// Block subsidy at height 0, in whole TAG.
pub const INITIAL_REWARD: u128 = 50;

/// Floor the subsidy never drops below, in whole TAG.
pub const MIN_REWARD: u128 = 1;

/// Number of blocks between subsidy halvings.
pub const HALVING_INTERVAL: u64 = 210_000;

/// Maximum number of halvings before the subsidy pins to [`MIN_REWARD`].
pub const MAX_HALVINGS: u32 = 64;

// ---------------------------------------------------------------------------
// Proof of Work
// ---------------------------------------------------------------------------

/// Highest admissible PoW target. A block hash must satisfy
/// `hash <= MAX_TARGET / difficulty`, both compared as 256-bit big-endian
/// integers. The 0x00000f prefix gives difficulty 1 a 20-bit
/// leading-zero requirement.
pub const MAX_TARGET: [u8; 32] = [
    0x00, 0x00, 0x0f, 0xff, 0xff, 0xff, 0xff, 0xff, //
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, //
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, //
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
];

// ---------------------------------------------------------------------------
// Block Limits
// ---------------------------------------------------------------------------

/// Maximum number of transactions in a single block.
pub const MAX_TRANSACTIONS: usize = 2_000;

/// Lower bound of the dynamic block-size limit, in bytes (1 MiB).
pub const MIN_BLOCK_SIZE: u64 = 1024 * 1024;

/// Upper bound of the dynamic block-size limit, in bytes (32 MiB).
pub const MAX_BLOCK_SIZE: u64 = 32 * 1024 * 1024;

/// Per-block cap on how far the size limit may move from the previous
/// block's size: ±20%.
pub const BLOCK_SIZE_CHANGE_LIMIT: f64 = 0.20;

/// Block timestamps may lead or lag wall clock by at most this much.
pub const MAX_TIMESTAMP_DRIFT: Duration = Duration::from_secs(2 * 60 * 60);

/// Transactions are validated in batches of this many; the coinbase must
/// sit in the first batch.
pub const TX_BATCH_SIZE: usize = 100;

/// Wall-clock budget for validating one block. Exceeding it aborts the
/// pipeline with `ValidationTimeout`.
pub const VALIDATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Mempool capacity used to derive the congestion fill ratio.
pub const MEMPOOL_CAPACITY: u32 = 50_000;

// ---------------------------------------------------------------------------
// Validator Set
// ---------------------------------------------------------------------------

/// Minimum number of validators a block must carry.
pub const MIN_VALIDATORS: usize = 4;

/// Minimum aggregate validation weight a block's validator set must
/// reach: the sum of `reputation / 100` over validators whose merkle
/// proof and attestation verify.
pub const VALIDATOR_WEIGHT_THRESHOLD: f64 = 0.66;

/// Fraction of the expected validator set that must be present among the
/// active set for vote validation: 2/3.
pub const VALIDATOR_QUORUM: f64 = 2.0 / 3.0;

/// Largest reputation swing a single update may apply.
pub const MAX_REPUTATION_CHANGE: i32 = 10;

/// A validator with no activity for this long is considered inactive.
pub const VALIDATOR_INACTIVITY_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

// ---------------------------------------------------------------------------
// Voting
// ---------------------------------------------------------------------------

/// Length of a regular voting period, in blocks. About four years of
/// ten-minute blocks — governance on the same cadence as halvings.
pub const VOTING_PERIOD_BLOCKS: u64 = 210_240;

/// Maximum serialized size of a single vote, in bytes.
pub const MAX_VOTE_SIZE_BYTES: usize = 8 * 1024;

/// Vote timestamps must fall within this window around wall clock.
pub const VOTE_TIMESTAMP_TOLERANCE: Duration = Duration::from_secs(5 * 60);

/// Target block time used for schedule estimation when the chain is too
/// young to measure a real average: 600 seconds.
pub const DEFAULT_BLOCK_TIME: Duration = Duration::from_secs(600);

/// Number of trailing blocks the scheduler averages block time over.
pub const BLOCK_TIME_WINDOW: u64 = 100;

/// Overlong timer waits are chunked at this interval and re-armed, so a
/// mis-computed schedule can never park a task for years.
pub const MAX_TIMER_CHUNK: Duration = Duration::from_secs(24 * 60 * 60);

/// The period checker gives up after this many consecutive failed
/// transition attempts and emits an audit event instead.
pub const MAX_CONSECUTIVE_PERIOD_FAILURES: u32 = 3;

// ---------------------------------------------------------------------------
// Network Stability Gate
// ---------------------------------------------------------------------------

/// Minimum connected peers for the network to count as stable.
pub const MIN_PEER_COUNT: u32 = 3;

/// Consecutive stability-check failures before the gate latches unstable.
pub const MAX_STABILITY_FAILURES: u32 = 3;

/// How long the gate reports unstable after latching.
pub const STABILITY_COOLDOWN: Duration = Duration::from_secs(5 * 60);

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Maximum number of operations a single storage transaction may buffer.
pub const BATCH_SIZE: usize = 1_000;

/// Idle storage transactions are rolled back after this long.
pub const TRANSACTION_TIMEOUT: Duration = Duration::from_secs(30);

/// TTL for the primary and transaction caches.
pub const PRIMARY_CACHE_TTL: Duration = Duration::from_secs(3_600);

/// Capacity of the primary cache.
pub const PRIMARY_CACHE_SIZE: usize = 10_000;

/// TTL for validator-metric caches.
pub const METRICS_CACHE_TTL: Duration = Duration::from_secs(300);

/// Capacity of validator-metric caches.
pub const METRICS_CACHE_SIZE: usize = 1_000;

/// Votes and shards older than this are eligible for compaction.
pub const RETENTION_PERIOD: Duration = Duration::from_secs(60 * 24 * 60 * 60);

/// Voting periods whose end block is this far behind the tip are swept.
pub const PERIOD_RETENTION_BLOCKS: u64 = 10_000;

/// Entries per backup batch file.
pub const BACKUP_BATCH_SIZE: usize = 10_000;

/// Shard payloads above this size are gzip-compressed before persisting.
pub const SHARD_COMPRESSION_THRESHOLD: usize = 100 * 1024;

/// Exclusive upper-bound sentinel for prefix range scans. 0xFF never
/// appears in a well-formed ASCII key, so `prefix..prefix+0xFF` covers
/// exactly the prefix's keyspace.
pub const KEY_RANGE_SENTINEL: u8 = 0xFF;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! # ChainStore — Persistent Storage Engine
//!
//! The persistence layer for the H3TAG chain, built on sled's embedded
//! key-value store. All on-disk data flows through this module.
//!
//! ## Keyspace Layout
//!
//! Unlike a column-family design, everything lives in a single flat,
//! ordered keyspace (the `chain` tree). Keys are ASCII with reserved
//! prefixes (see [`super::keys`]); values are UTF-8 JSON with 128-bit
//! amounts as decimal strings. Numeric key segments are zero-padded so
//! lexicographic order equals numeric order, which makes prefix and range
//! scans come back sorted for free.
//!
//! | Prefix            | Value                          |
//! |-------------------|--------------------------------|
//! | `block:height:`   | full `Block` JSON              |
//! | `block:hash:`     | full `Block` JSON (same bytes) |
//! | `block:miner:`    | block hash                     |
//! | `transactions:`   | `Transaction` JSON             |
//! | `tx_type:`        | transaction hash (index)       |
//! | `utxo:`           | `Utxo` JSON                    |
//! | `vote:` / `period_vote:`     | `Vote` JSON         |
//! | `voting_period:` / `period:` | `VotingPeriod` JSON |
//! | `validator:`…     | validator records & metrics    |
//! | `chain_state`…    | tip bookkeeping                |
//!
//! ## Transactions
//!
//! One process-wide transaction at a time, serialized by a mutex. Ops are
//! buffered and applied as a single atomic sled batch at commit — readers
//! observe the pre-image until then, and a rollback is just dropping the
//! buffer (plus invalidating any cache entries the buffer touched). A
//! transaction that idles past [`crate::config::TRANSACTION_TIMEOUT`] is
//! rolled back by whichever call touches the transaction API next; the
//! stale holder gets `TransactionExpired`.
//!
//! ## Caches
//!
//! Bounded TTL caches front the tree: primary (raw JSON by key), block,
//! transaction, and the validator-metric trio (scalar metrics, voting
//! power, slashing history). Cache writes happen in the same critical
//! section as the underlying store write, and rollback invalidates
//! everything the transaction touched — no cached value may outlive its
//! record.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, MutexGuard};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::collaborators::{AuditEvent, AuditLog, AuditSeverity};
use crate::config::{
    BATCH_SIZE, METRICS_CACHE_SIZE, METRICS_CACHE_TTL, PERIOD_RETENTION_BLOCKS,
    PRIMARY_CACHE_SIZE, PRIMARY_CACHE_TTL, RETENTION_PERIOD, TRANSACTION_TIMEOUT,
};
use crate::storage::cache::{TtlCache, PRIORITY_POW};
use crate::storage::errors::{StorageError, StorageResult};
use crate::storage::keys;
use crate::storage::shard::Shard;
use crate::types::amount::Units;
use crate::types::block::Block;
use crate::types::chain_state::ChainState;
use crate::types::now_ms;
use crate::types::period::{PeriodStatus, VotingPeriod};
use crate::types::transaction::Transaction;
use crate::types::utxo::Utxo;
use crate::types::validator::Validator;
use crate::types::vote::{isqrt, Vote};

// ---------------------------------------------------------------------------
// Records & reports
// ---------------------------------------------------------------------------

/// A buffered transactional operation.
#[derive(Debug, Clone)]
enum TxOp {
    Put { key: String, value: String },
    Delete { key: String },
}

impl TxOp {
    fn key(&self) -> &str {
        match self {
            TxOp::Put { key, .. } | TxOp::Delete { key } => key,
        }
    }
}

/// The in-flight transaction, if any.
pub(crate) struct ActiveTransaction {
    ops: Vec<TxOp>,
    started: Instant,
}

/// A slashing event, persisted under `slash:<addr>:<ts>`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SlashRecord {
    pub address: String,
    pub reason: String,
    pub timestamp: u64,
}

/// A validator liveness sample, persisted under
/// `validator_heartbeat:<addr>:<ts>`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Heartbeat {
    pub timestamp: u64,
    /// This validator's share of observed network hash power, `[0, 1]`.
    pub hash_power: f64,
    /// Round-trip latency of the liveness probe.
    pub response_time_ms: u64,
}

/// What `compact()` swept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionReport {
    pub votes_removed: usize,
    pub shards_removed: usize,
    pub periods_removed: usize,
}

// ---------------------------------------------------------------------------
// ChainStore
// ---------------------------------------------------------------------------

/// Persistent storage engine for the H3TAG chain.
///
/// Share via `Arc`; sled handles concurrent reads internally and the
/// transaction mutex serializes writers that need atomicity.
pub struct ChainStore {
    db: sled::Db,
    tree: sled::Tree,
    audit: Arc<dyn AuditLog>,
    tx_state: Mutex<Option<ActiveTransaction>>,
    pub(crate) shard_lock: Mutex<()>,
    primary_cache: TtlCache<String, String>,
    block_cache: TtlCache<String, Block>,
    tx_cache: TtlCache<String, Transaction>,
    power_cache: TtlCache<String, Units>,
    slash_cache: TtlCache<String, Vec<SlashRecord>>,
    metrics_cache: TtlCache<String, f64>,
}

impl ChainStore {
    /// Open or create a store at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P, audit: Arc<dyn AuditLog>) -> StorageResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db, audit)
    }

    /// In-memory store, cleaned up on drop. For tests.
    pub fn open_temporary(audit: Arc<dyn AuditLog>) -> StorageResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db, audit)
    }

    fn from_db(db: sled::Db, audit: Arc<dyn AuditLog>) -> StorageResult<Self> {
        let tree = db.open_tree("chain")?;
        info!(keys = tree.len(), "chain store opened");
        Ok(Self {
            db,
            tree,
            audit,
            tx_state: Mutex::new(None),
            shard_lock: Mutex::new(()),
            primary_cache: TtlCache::new(PRIMARY_CACHE_SIZE, PRIMARY_CACHE_TTL),
            block_cache: TtlCache::new(PRIMARY_CACHE_SIZE, PRIMARY_CACHE_TTL),
            tx_cache: TtlCache::new(PRIMARY_CACHE_SIZE, PRIMARY_CACHE_TTL),
            power_cache: TtlCache::new(METRICS_CACHE_SIZE, METRICS_CACHE_TTL),
            slash_cache: TtlCache::new(METRICS_CACHE_SIZE, METRICS_CACHE_TTL),
            metrics_cache: TtlCache::new(METRICS_CACHE_SIZE, METRICS_CACHE_TTL),
        })
    }

    // -- Raw operations -----------------------------------------------------

    /// Direct write, bypassing any active transaction. Cache and store are
    /// updated in the same critical section.
    pub fn put(&self, key: &str, value: &str) -> StorageResult<()> {
        self.tree.insert(key.as_bytes(), value.as_bytes())?;
        self.update_caches_for_put(key, value);
        Ok(())
    }

    /// Direct read. Consults the primary cache first; a miss reads the
    /// tree and back-fills the cache.
    pub fn get(&self, key: &str) -> StorageResult<Option<String>> {
        if let Some(hit) = self.primary_cache.get(&key.to_string()) {
            return Ok(Some(hit));
        }
        match self.tree.get(key.as_bytes())? {
            Some(bytes) => {
                let value = String::from_utf8_lossy(&bytes).into_owned();
                self.primary_cache.put(key.to_string(), value.clone());
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Direct delete. Invalidates every cache that might hold the key.
    pub fn delete(&self, key: &str) -> StorageResult<()> {
        self.tree.remove(key.as_bytes())?;
        self.invalidate_key(key);
        Ok(())
    }

    /// Typed write: JSON-encode `value` under `key`.
    pub fn put_json<T: Serialize>(&self, key: &str, value: &T) -> StorageResult<()> {
        self.put(key, &serde_json::to_string(value)?)
    }

    /// Typed read: decode the JSON under `key`, `None` if absent.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
        match self.get(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Lexicographic scan of every key starting with `prefix`, sorted.
    pub fn prefix_scan(&self, prefix: &str) -> StorageResult<Vec<(String, String)>> {
        let mut upper = prefix.as_bytes().to_vec();
        upper.push(crate::config::KEY_RANGE_SENTINEL);
        self.collect_range(prefix.as_bytes().to_vec()..upper)
    }

    /// Inclusive range scan over `[gte, lte]`.
    pub fn range_scan(&self, gte: &str, lte: &str) -> StorageResult<Vec<(String, String)>> {
        let mut upper = lte.as_bytes().to_vec();
        upper.push(crate::config::KEY_RANGE_SENTINEL);
        self.collect_range(gte.as_bytes().to_vec()..upper)
    }

    fn collect_range(
        &self,
        range: std::ops::Range<Vec<u8>>,
    ) -> StorageResult<Vec<(String, String)>> {
        let mut out = Vec::new();
        for item in self.tree.range(range) {
            let (key, value) = item?;
            out.push((
                String::from_utf8_lossy(&key).into_owned(),
                String::from_utf8_lossy(&value).into_owned(),
            ));
        }
        Ok(out)
    }

    /// Block until all pending writes are durable.
    pub fn flush(&self) -> StorageResult<()> {
        self.db.flush()?;
        Ok(())
    }

    // -- Transactions -------------------------------------------------------

    /// Begin a storage transaction. Fails with `TransactionInProgress` if
    /// one is already active; a stale (expired) transaction is rolled back
    /// first and does not block the new one.
    pub fn begin_transaction(&self) -> StorageResult<()> {
        let mut state = self.tx_state.lock();
        self.expire_stale(&mut state);
        if state.is_some() {
            return Err(StorageError::TransactionInProgress);
        }
        *state = Some(ActiveTransaction {
            ops: Vec::new(),
            started: Instant::now(),
        });
        debug!("storage transaction started");
        Ok(())
    }

    /// Buffer a write in the active transaction.
    pub fn tx_put(&self, key: &str, value: &str) -> StorageResult<()> {
        self.tx_op(TxOp::Put {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    /// Buffer a JSON-encoded write in the active transaction.
    pub fn tx_put_json<T: Serialize>(&self, key: &str, value: &T) -> StorageResult<()> {
        self.tx_put(key, &serde_json::to_string(value)?)
    }

    /// Buffer a delete in the active transaction.
    pub fn tx_delete(&self, key: &str) -> StorageResult<()> {
        self.tx_op(TxOp::Delete {
            key: key.to_string(),
        })
    }

    fn tx_op(&self, op: TxOp) -> StorageResult<()> {
        let mut state = self.tx_state.lock();
        if self.expire_stale(&mut state) {
            return Err(StorageError::TransactionExpired);
        }
        let tx = state.as_mut().ok_or(StorageError::NoActiveTransaction)?;
        if tx.ops.len() >= BATCH_SIZE {
            return Err(StorageError::BatchLimitExceeded { limit: BATCH_SIZE });
        }
        tx.ops.push(op);
        Ok(())
    }

    /// Atomically apply the buffered operations. On success the caches are
    /// brought in line with the new records; on failure everything the
    /// transaction touched is invalidated and `CommitFailed` is returned.
    pub fn commit_transaction(&self) -> StorageResult<()> {
        let mut state = self.tx_state.lock();
        if self.expire_stale(&mut state) {
            return Err(StorageError::TransactionExpired);
        }
        let tx = state.take().ok_or(StorageError::NoActiveTransaction)?;

        let mut batch = sled::Batch::default();
        for op in &tx.ops {
            match op {
                TxOp::Put { key, value } => batch.insert(key.as_bytes(), value.as_bytes()),
                TxOp::Delete { key } => batch.remove(key.as_bytes()),
            }
        }

        let applied = self
            .tree
            .apply_batch(batch)
            .and_then(|_| self.db.flush().map(|_| ()));
        match applied {
            Ok(()) => {
                for op in &tx.ops {
                    match op {
                        TxOp::Put { key, value } => self.update_caches_for_put(key, value),
                        TxOp::Delete { key } => self.invalidate_key(key),
                    }
                }
                debug!(ops = tx.ops.len(), "storage transaction committed");
                Ok(())
            }
            Err(err) => {
                for op in &tx.ops {
                    self.invalidate_key(op.key());
                }
                self.audit.log_event(AuditEvent::now(
                    "storage",
                    "COMMIT_FAILED",
                    AuditSeverity::Error,
                    "chain-store",
                    serde_json::json!({ "ops": tx.ops.len(), "error": err.to_string() }),
                ));
                Err(StorageError::CommitFailed(err.to_string()))
            }
        }
    }

    /// Drop the active transaction without applying it. Cache entries the
    /// buffer touched are invalidated so nothing stale survives.
    pub fn rollback_transaction(&self) -> StorageResult<()> {
        let mut state = self.tx_state.lock();
        if self.expire_stale(&mut state) {
            // The watchdog already did the work the caller asked for.
            return Ok(());
        }
        let tx = state.take().ok_or(StorageError::NoActiveTransaction)?;
        for op in &tx.ops {
            self.invalidate_key(op.key());
        }
        debug!(ops = tx.ops.len(), "storage transaction rolled back");
        Ok(())
    }

    /// `true` while a (non-expired) transaction is active.
    pub fn transaction_active(&self) -> bool {
        let mut state = self.tx_state.lock();
        self.expire_stale(&mut state);
        state.is_some()
    }

    /// Watchdog: roll back an expired transaction in place. Returns `true`
    /// if one was expired by this call.
    fn expire_stale(&self, state: &mut MutexGuard<'_, Option<ActiveTransaction>>) -> bool {
        let expired = state
            .as_ref()
            .map(|tx| tx.started.elapsed() > TRANSACTION_TIMEOUT)
            .unwrap_or(false);
        if expired {
            if let Some(tx) = state.take() {
                for op in &tx.ops {
                    self.invalidate_key(op.key());
                }
                warn!(ops = tx.ops.len(), "storage transaction expired, rolled back");
                self.audit.log_event(AuditEvent::now(
                    "storage",
                    "TRANSACTION_EXPIRED",
                    AuditSeverity::Warning,
                    "chain-store",
                    serde_json::json!({ "ops": tx.ops.len() }),
                ));
            }
        }
        expired
    }

    // -- Cache coherency ----------------------------------------------------

    fn update_caches_for_put(&self, key: &str, value: &str) {
        // PoW-critical records get the higher survival tier.
        if key.starts_with(keys::BLOCK_HEIGHT_PREFIX)
            || key.starts_with(keys::BLOCK_HASH_PREFIX)
            || key.starts_with("difficulty:")
        {
            self.primary_cache
                .put_with_priority(key.to_string(), value.to_string(), PRIORITY_POW);
        } else {
            self.primary_cache.put(key.to_string(), value.to_string());
        }
        // Typed caches cannot be refreshed from a raw string without
        // re-parsing; drop the entries and let the next typed read
        // repopulate them.
        self.block_cache.invalidate(&key.to_string());
        self.tx_cache.invalidate(&key.to_string());
        self.metrics_cache.invalidate(&key.to_string());
        self.power_cache.invalidate(&key.to_string());
        self.slash_cache.invalidate(&key.to_string());
    }

    fn invalidate_key(&self, key: &str) {
        let key = key.to_string();
        self.primary_cache.invalidate(&key);
        self.block_cache.invalidate(&key);
        self.tx_cache.invalidate(&key);
        self.metrics_cache.invalidate(&key);
        self.power_cache.invalidate(&key);
        self.slash_cache.invalidate(&key);
    }

    // -- Blocks -------------------------------------------------------------

    /// Persist a block and everything it implies, atomically: both block
    /// indices, the miner/timestamp secondary indices, every transaction
    /// (plus type index), the UTXO mutations, and the chain-state records.
    pub fn put_block(&self, block: &Block) -> StorageResult<()> {
        if let Some(state) = self.chain_state()? {
            if block.header.height <= state.height {
                return Err(StorageError::NonMonotonicHeight {
                    stored: state.height,
                    attempted: block.header.height,
                });
            }
        }

        let block_json = serde_json::to_string(block)?;
        let header = &block.header;
        let mut batch = sled::Batch::default();
        let mut touched: Vec<String> = Vec::new();

        let height_key = keys::block_height(header.height);
        let hash_key = keys::block_hash(&header.hash);
        batch.insert(height_key.as_bytes(), block_json.as_bytes());
        batch.insert(hash_key.as_bytes(), block_json.as_bytes());
        batch.insert(
            keys::block_miner(&header.miner, header.timestamp).as_bytes(),
            header.hash.as_bytes(),
        );
        batch.insert(
            keys::block_timestamp(header.timestamp).as_bytes(),
            header.hash.as_bytes(),
        );
        touched.push(height_key.clone());
        touched.push(hash_key.clone());

        // Transactions and their UTXO effects.
        for tx in &block.transactions {
            let tx_key = keys::transaction(&tx.hash);
            batch.insert(tx_key.as_bytes(), serde_json::to_string(tx)?.as_bytes());
            batch.insert(
                keys::tx_type(&tx.tx_type.to_string(), &tx.hash).as_bytes(),
                tx.hash.as_bytes(),
            );
            touched.push(tx_key);

            // Spend consumed outputs. Reads happen before the batch lands,
            // which is safe: put_block is the only writer of these records
            // and is not re-entrant.
            for input in &tx.inputs {
                let utxo_key = keys::utxo(&input.address, &input.tx_id, input.output_index);
                if let Some(mut utxo) = self.get_json::<Utxo>(&utxo_key)? {
                    utxo.spent = true;
                    batch.insert(utxo_key.as_bytes(), serde_json::to_string(&utxo)?.as_bytes());
                    touched.push(utxo_key);
                }
            }
            // Materialize created outputs.
            for (index, output) in tx.outputs.iter().enumerate() {
                let utxo = Utxo {
                    tx_id: tx.hash.clone(),
                    output_index: index as u32,
                    amount: output.amount,
                    address: output.address.clone(),
                    spent: false,
                    block_height: header.height,
                    script: output.script.clone(),
                    confirmations: 0,
                };
                let utxo_key = keys::utxo(&output.address, &tx.hash, index as u32);
                batch.insert(utxo_key.as_bytes(), serde_json::to_string(&utxo)?.as_bytes());
                touched.push(utxo_key);
            }
        }

        // Tip bookkeeping.
        let state = ChainState {
            height: header.height,
            last_block_hash: header.hash.clone(),
            timestamp: now_ms(),
        };
        batch.insert(
            keys::CHAIN_STATE.as_bytes(),
            serde_json::to_string(&state)?.as_bytes(),
        );
        batch.insert(
            keys::CURRENT_HEIGHT.as_bytes(),
            header.height.to_string().as_bytes(),
        );
        batch.insert(keys::CHAIN_HEAD.as_bytes(), header.hash.as_bytes());
        touched.push(keys::CHAIN_STATE.to_string());
        touched.push(keys::CURRENT_HEIGHT.to_string());
        touched.push(keys::CHAIN_HEAD.to_string());

        self.tree.apply_batch(batch)?;
        self.db.flush()?;

        // Cache coherency: drop anything the batch rewrote, then seed the
        // hot block entries.
        for key in &touched {
            self.invalidate_key(key);
        }
        self.primary_cache
            .put_with_priority(height_key.clone(), block_json.clone(), PRIORITY_POW);
        self.primary_cache
            .put_with_priority(hash_key.clone(), block_json, PRIORITY_POW);
        self.block_cache.put(height_key, block.clone());
        self.block_cache.put(hash_key, block.clone());

        debug!(height = header.height, hash = %header.hash, "block persisted");
        Ok(())
    }

    /// Fetch a block by height. Cached.
    pub fn get_block_by_height(&self, height: u64) -> StorageResult<Option<Block>> {
        self.get_block_cached(&keys::block_height(height))
    }

    /// Fetch a block by hash. Cached.
    pub fn get_block_by_hash(&self, hash: &str) -> StorageResult<Option<Block>> {
        self.get_block_cached(&keys::block_hash(hash))
    }

    fn get_block_cached(&self, key: &str) -> StorageResult<Option<Block>> {
        if let Some(block) = self.block_cache.get(&key.to_string()) {
            return Ok(Some(block));
        }
        let block: Option<Block> = self.get_json(key)?;
        if let Some(ref b) = block {
            self.block_cache.put(key.to_string(), b.clone());
        }
        Ok(block)
    }

    /// The block at the current tip, if any.
    pub fn latest_block(&self) -> StorageResult<Option<Block>> {
        match self.chain_state()? {
            Some(state) => self.get_block_by_height(state.height),
            None => Ok(None),
        }
    }

    /// Hashes of blocks mined by `miner`, ascending by timestamp.
    pub fn blocks_by_miner(&self, miner: &str) -> StorageResult<Vec<String>> {
        let prefix = format!("{}{miner}:", keys::BLOCK_MINER_PREFIX);
        Ok(self
            .prefix_scan(&prefix)?
            .into_iter()
            .map(|(_, hash)| hash)
            .collect())
    }

    // -- Chain state --------------------------------------------------------

    /// The current tip record, if the chain has one.
    pub fn chain_state(&self) -> StorageResult<Option<ChainState>> {
        self.get_json(keys::CHAIN_STATE)
    }

    /// Current chain height; 0 for an empty store.
    pub fn current_height(&self) -> StorageResult<u64> {
        Ok(self.chain_state()?.map(|s| s.height).unwrap_or(0))
    }

    // -- Transactions -------------------------------------------------------

    /// Persist a standalone transaction (mempool staging). Block-included
    /// transactions are written atomically by [`ChainStore::put_block`].
    pub fn put_transaction(&self, tx: &Transaction) -> StorageResult<()> {
        self.put_json(&keys::transaction(&tx.hash), tx)?;
        self.put(&keys::tx_type(&tx.tx_type.to_string(), &tx.hash), &tx.hash)
    }

    /// Fetch a transaction by hash. Cached.
    pub fn get_transaction(&self, hash: &str) -> StorageResult<Option<Transaction>> {
        let key = keys::transaction(hash);
        if let Some(tx) = self.tx_cache.get(&key) {
            return Ok(Some(tx));
        }
        let tx: Option<Transaction> = self.get_json(&key)?;
        if let Some(ref t) = tx {
            self.tx_cache.put(key, t.clone());
        }
        Ok(tx)
    }

    /// Remove a transaction and its type index. Invalidates the caches.
    pub fn delete_transaction(&self, hash: &str) -> StorageResult<()> {
        if let Some(tx) = self.get_transaction(hash)? {
            self.delete(&keys::tx_type(&tx.tx_type.to_string(), hash))?;
        }
        let key = keys::transaction(hash);
        self.tx_cache.invalidate(&key);
        self.delete(&key)
    }

    /// Hashes of all transactions of the given type tag.
    pub fn transactions_by_type(&self, type_tag: &str) -> StorageResult<Vec<String>> {
        let prefix = format!("{}{type_tag}:", keys::TX_TYPE_PREFIX);
        Ok(self
            .prefix_scan(&prefix)?
            .into_iter()
            .map(|(_, hash)| hash)
            .collect())
    }

    // -- UTXOs --------------------------------------------------------------

    /// Persist a UTXO record.
    pub fn put_utxo(&self, utxo: &Utxo) -> StorageResult<()> {
        self.put_json(
            &keys::utxo(&utxo.address, &utxo.tx_id, utxo.output_index),
            utxo,
        )
    }

    /// Fetch one UTXO by its full coordinates.
    pub fn get_utxo(
        &self,
        address: &str,
        tx_id: &str,
        output_index: u32,
    ) -> StorageResult<Option<Utxo>> {
        self.get_json(&keys::utxo(address, tx_id, output_index))
    }

    /// Flip a UTXO to spent. Returns `false` if the record does not exist.
    pub fn mark_utxo_spent(
        &self,
        address: &str,
        tx_id: &str,
        output_index: u32,
    ) -> StorageResult<bool> {
        let key = keys::utxo(address, tx_id, output_index);
        match self.get_json::<Utxo>(&key)? {
            Some(mut utxo) => {
                utxo.spent = true;
                self.put_json(&key, &utxo)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// All UTXOs for an address, confirmations derived from the tip.
    pub fn utxos_for_address(&self, address: &str, unspent_only: bool) -> StorageResult<Vec<Utxo>> {
        let tip = self.current_height()?;
        let mut out = Vec::new();
        for (_, raw) in self.prefix_scan(&keys::utxo_address_prefix(address))? {
            let utxo: Utxo = serde_json::from_str(&raw)?;
            if unspent_only && utxo.spent {
                continue;
            }
            out.push(utxo.with_confirmations(tip));
        }
        Ok(out)
    }

    /// Spendable balance of an address: the sum of its unspent outputs.
    pub fn address_balance(&self, address: &str) -> StorageResult<Units> {
        Ok(self
            .utxos_for_address(address, true)?
            .iter()
            .fold(0u128, |acc, u| acc.saturating_add(u.amount)))
    }

    /// Quadratic voting power of an address: `⌊√balance⌋`. Cached for
    /// [`crate::config::METRICS_CACHE_TTL`].
    pub fn voting_power_of(&self, address: &str) -> StorageResult<Units> {
        let cache_key = format!("power:{address}");
        if let Some(power) = self.power_cache.get(&cache_key) {
            return Ok(power);
        }
        let power = isqrt(self.address_balance(address)?);
        self.power_cache.put(cache_key, power);
        Ok(power)
    }

    // -- Votes --------------------------------------------------------------

    /// Persist a vote under both its primary and period-mirror keys.
    /// The voting engine uses the transactional path; this direct form
    /// exists for tooling and tests.
    pub fn put_vote(&self, vote: &Vote) -> StorageResult<()> {
        self.put_json(&keys::vote(vote.period_id, &vote.voter), vote)?;
        self.put_json(&keys::period_vote(vote.period_id, &vote.voter), vote)
    }

    /// Fetch one vote by `(period, voter)`.
    pub fn get_vote(&self, period_id: u64, voter: &str) -> StorageResult<Option<Vote>> {
        self.get_json(&keys::vote(period_id, voter))
    }

    /// `true` if the voter already has a record in the period.
    pub fn has_voted(&self, period_id: u64, voter: &str) -> StorageResult<bool> {
        Ok(self.get(&keys::vote(period_id, voter))?.is_some())
    }

    /// Every vote in a period, sorted by voter address.
    pub fn votes_for_period(&self, period_id: u64) -> StorageResult<Vec<Vote>> {
        let mut votes = Vec::new();
        for (_, raw) in self.prefix_scan(&keys::vote_period_prefix(period_id))? {
            votes.push(serde_json::from_str(&raw)?);
        }
        Ok(votes)
    }

    // -- Voting periods -----------------------------------------------------

    /// Persist a period under both its canonical and alias keys.
    pub fn put_voting_period(&self, period: &VotingPeriod) -> StorageResult<()> {
        self.put_json(&keys::voting_period(period.period_id), period)?;
        self.put_json(&keys::period(period.period_id), period)
    }

    /// Fetch a period by id.
    pub fn get_voting_period(&self, period_id: u64) -> StorageResult<Option<VotingPeriod>> {
        self.get_json(&keys::voting_period(period_id))
    }

    /// The highest-id period on record. Zero-padded ids make this the last
    /// entry of the prefix scan.
    pub fn latest_voting_period(&self) -> StorageResult<Option<VotingPeriod>> {
        let entries = self.prefix_scan(keys::VOTING_PERIOD_PREFIX)?;
        match entries.last() {
            Some((_, raw)) => Ok(Some(serde_json::from_str(raw)?)),
            None => Ok(None),
        }
    }

    // -- Validators ---------------------------------------------------------

    /// Persist a validator record.
    pub fn put_validator(&self, validator: &Validator) -> StorageResult<()> {
        self.put_json(&keys::validator(&validator.address), validator)
    }

    /// Fetch a validator by address.
    pub fn get_validator(&self, address: &str) -> StorageResult<Option<Validator>> {
        self.get_json(&keys::validator(address))
    }

    /// All validators currently flagged active and not suspended.
    pub fn active_validators(&self) -> StorageResult<Vec<Validator>> {
        let mut out = Vec::new();
        for (_, raw) in self.prefix_scan(keys::VALIDATOR_PREFIX)? {
            let validator: Validator = serde_json::from_str(&raw)?;
            if validator.is_active && !validator.is_suspended {
                out.push(validator);
            }
        }
        Ok(out)
    }

    /// Record a liveness sample for a validator.
    pub fn record_heartbeat(&self, address: &str, heartbeat: &Heartbeat) -> StorageResult<()> {
        self.put_json(
            &keys::validator_heartbeat(address, heartbeat.timestamp),
            heartbeat,
        )
    }

    /// Heartbeats for `address` with `timestamp >= since_ms`, ascending.
    pub fn heartbeats_since(&self, address: &str, since_ms: u64) -> StorageResult<Vec<Heartbeat>> {
        let mut out = Vec::new();
        for (_, raw) in self.prefix_scan(&keys::validator_heartbeat_prefix(address))? {
            let hb: Heartbeat = serde_json::from_str(&raw)?;
            if hb.timestamp >= since_ms {
                out.push(hb);
            }
        }
        Ok(out)
    }

    /// Record a slashing event.
    pub fn record_slash(&self, record: &SlashRecord) -> StorageResult<()> {
        self.slash_cache.invalidate(&record.address);
        self.put_json(&keys::slash(&record.address, record.timestamp), record)
    }

    /// Full slashing history of an address, ascending. Cached.
    pub fn slashing_history(&self, address: &str) -> StorageResult<Vec<SlashRecord>> {
        let cache_key = address.to_string();
        if let Some(history) = self.slash_cache.get(&cache_key) {
            return Ok(history);
        }
        let mut out = Vec::new();
        for (_, raw) in self.prefix_scan(&keys::slash_address_prefix(address))? {
            out.push(serde_json::from_str(&raw)?);
        }
        self.slash_cache.put(cache_key, out.clone());
        Ok(out)
    }

    /// Store a scalar validator metric (uptime, participation, production).
    pub fn set_metric(&self, key: &str, value: f64) -> StorageResult<()> {
        self.put(key, &value.to_string())
    }

    /// Read a scalar metric, `None` when never recorded. Cached.
    pub fn get_metric(&self, key: &str) -> StorageResult<Option<f64>> {
        if let Some(v) = self.metrics_cache.get(&key.to_string()) {
            return Ok(Some(v));
        }
        match self.get(key)? {
            Some(raw) => {
                let value: f64 = raw.parse().unwrap_or(0.0);
                self.metrics_cache.put(key.to_string(), value);
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    // -- Nonces & difficulty ------------------------------------------------

    /// Account nonce; 0 if never set.
    pub fn get_nonce(&self, address: &str) -> StorageResult<u64> {
        Ok(self
            .get(&keys::nonce(address))?
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(0))
    }

    /// Overwrite an account nonce.
    pub fn set_nonce(&self, address: &str, nonce: u64) -> StorageResult<()> {
        self.put(&keys::nonce(address), &nonce.to_string())
    }

    /// Difficulty recorded for a block hash, `None` if absent.
    pub fn get_difficulty(&self, block_hash: &str) -> StorageResult<Option<u64>> {
        Ok(self
            .get(&keys::difficulty(block_hash))?
            .and_then(|raw| raw.parse().ok()))
    }

    /// Record the difficulty a block was accepted at.
    pub fn set_difficulty(&self, block_hash: &str, difficulty: u64) -> StorageResult<()> {
        self.put(&keys::difficulty(block_hash), &difficulty.to_string())
    }

    // -- Compaction ---------------------------------------------------------

    /// Sweep expired records. Deletes votes older than the retention
    /// window whose period is terminal, soft-deleted shards past
    /// retention, and terminal periods whose end block has fallen
    /// [`PERIOD_RETENTION_BLOCKS`] behind the tip. UTXOs are never
    /// touched.
    ///
    /// Exclusive with transactions: fails with `TransactionInProgress`
    /// while one is active, and blocks new ones for its duration.
    pub fn compact(&self) -> StorageResult<CompactionReport> {
        let mut tx_guard = self.tx_state.lock();
        self.expire_stale(&mut tx_guard);
        if tx_guard.is_some() {
            return Err(StorageError::TransactionInProgress);
        }

        let now = now_ms();
        let retention_ms = RETENTION_PERIOD.as_millis() as u64;
        let tip = self.current_height()?;
        let mut report = CompactionReport::default();

        // Periods first: the vote sweep needs to know which periods are
        // terminal, including ones removed in this same pass.
        let mut terminal_periods: HashSet<u64> = HashSet::new();
        for (key, raw) in self.prefix_scan(keys::VOTING_PERIOD_PREFIX)? {
            let period: VotingPeriod = serde_json::from_str(&raw)?;
            if period.is_terminal() {
                terminal_periods.insert(period.period_id);
            }
            let expired = matches!(
                period.status,
                PeriodStatus::Completed | PeriodStatus::Cancelled
            ) && period.end_block < tip.saturating_sub(PERIOD_RETENTION_BLOCKS);
            if expired {
                self.delete(&key)?;
                self.delete(&keys::period(period.period_id))?;
                report.periods_removed += 1;
            }
        }

        // Votes: old enough AND their period is terminal ("processed").
        for (key, raw) in self.prefix_scan(keys::VOTE_PREFIX)? {
            let vote: Vote = serde_json::from_str(&raw)?;
            let old_enough = vote.timestamp + retention_ms < now;
            if old_enough && terminal_periods.contains(&vote.period_id) {
                self.delete(&key)?;
                self.delete(&keys::period_vote(vote.period_id, &vote.voter))?;
                report.votes_removed += 1;
            }
        }

        // Shards: soft-deleted and past retention.
        for (key, raw) in self.prefix_scan(keys::SHARD_PREFIX)? {
            let shard: Shard = serde_json::from_str(&raw)?;
            if let Some(deleted_at) = shard.deleted_at {
                if shard.deleted && deleted_at + retention_ms < now {
                    self.delete(&key)?;
                    report.shards_removed += 1;
                }
            }
        }

        info!(
            votes = report.votes_removed,
            shards = report.shards_removed,
            periods = report.periods_removed,
            "compaction swept"
        );
        Ok(report)
    }

    /// Exclusive-access guard used by backup: blocks transactions while
    /// held.
    pub(crate) fn exclusive_guard(
        &self,
    ) -> StorageResult<MutexGuard<'_, Option<ActiveTransaction>>> {
        let mut guard = self.tx_state.lock();
        self.expire_stale(&mut guard);
        if guard.is_some() {
            return Err(StorageError::TransactionInProgress);
        }
        Ok(guard)
    }

    /// The audit sink this store reports to.
    pub(crate) fn audit(&self) -> &Arc<dyn AuditLog> {
        &self.audit
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

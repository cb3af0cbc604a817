//! Storage error taxonomy.
//!
//! Not-found is *not* an error: every `get_*` returns `Ok(None)` for a
//! missing record. The variants here are real faults — engine failures,
//! serialization bugs, and invariant violations like nested transactions
//! or batch overflow, which surface immediately and are never retried.

use thiserror::Error;

/// Errors from the persistence layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying sled engine failure. Transient; callers may retry.
    #[error("storage engine error: {0}")]
    Engine(#[from] sled::Error),

    /// JSON encode/decode failure. A bug or corrupt data, never retried.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem failure during backup/restore.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// `begin_transaction` while another transaction is active.
    #[error("a storage transaction is already in progress")]
    TransactionInProgress,

    /// Transactional operation with no active transaction.
    #[error("no storage transaction is active")]
    NoActiveTransaction,

    /// The active transaction idled past the watchdog window and was
    /// rolled back out from under its holder.
    #[error("storage transaction expired after the idle window and was rolled back")]
    TransactionExpired,

    /// The transaction buffered more operations than the batch guard
    /// allows.
    #[error("storage batch limit of {limit} operations exceeded")]
    BatchLimitExceeded { limit: usize },

    /// Atomic batch write failed; the rollback path already ran.
    #[error("commit failed: {0}")]
    CommitFailed(String),

    /// Chain-state heights only move forward.
    #[error("chain height must be monotonic: stored {stored}, attempted {attempted}")]
    NonMonotonicHeight { stored: u64, attempted: u64 },

    /// A backup batch file failed its checksum during restore.
    #[error("backup checksum mismatch in {file}")]
    ChecksumMismatch { file: String },

    /// Backup directory layout or metadata is unusable.
    #[error("invalid backup: {0}")]
    InvalidBackup(String),

    /// Gzip decompression of a shard payload failed.
    #[error("shard payload corrupt: {0}")]
    CorruptShard(String),
}

/// Convenience alias used across the storage layer.
pub type StorageResult<T> = Result<T, StorageError>;

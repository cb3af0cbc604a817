//! # Shard Replication
//!
//! A shard is a disjoint partition of voting or transaction data that gets
//! replicated between nodes with checksum-gated updates. The write path is
//! deliberately paranoid:
//!
//! 1. Serialize the incoming entries canonically and SHA-256 them.
//! 2. If the stored shard already carries that checksum, do nothing —
//!    replication is idempotent and re-syncs are free.
//! 3. Payloads above [`crate::config::SHARD_COMPRESSION_THRESHOLD`] are
//!    gzip-compressed before persisting (hex-encoded, since values are
//!    UTF-8 JSON).
//! 4. The whole operation holds the shard mutex, so two replication
//!    streams cannot interleave half-written shards.
//!
//! Success and failure both emit audit events; `SHARD_SYNC_FAILED` is the
//! one operators alert on.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::collaborators::{AuditEvent, AuditSeverity};
use crate::config::SHARD_COMPRESSION_THRESHOLD;
use crate::crypto::hash::sha256_hex;
use crate::storage::db::ChainStore;
use crate::storage::errors::{StorageError, StorageResult};
use crate::storage::keys;
use crate::types::now_ms;

/// A persisted shard record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shard {
    /// Partition identifier.
    pub shard_id: u64,
    /// SHA-256 over the canonical serialization of the entries.
    pub checksum: String,
    /// Whether `payload` is gzip-compressed (and hex-encoded).
    pub compressed: bool,
    /// The entries: JSON array text, or hex(gzip(JSON array text)).
    pub payload: String,
    /// Number of entries, kept denormalized for cheap introspection.
    pub entry_count: usize,
    /// Last successful sync, milliseconds since epoch.
    pub updated_at: u64,
    /// Soft-delete flag; compaction removes the record after retention.
    pub deleted: bool,
    /// When the soft delete happened.
    pub deleted_at: Option<u64>,
}

/// What `sync_shard` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardSyncOutcome {
    /// The shard was new or changed and has been written.
    Written,
    /// Checksum matched the stored shard; nothing written.
    Unchanged,
}

impl ChainStore {
    /// Replicate `data` into the shard, atomically under the shard mutex.
    ///
    /// No-ops (returning [`ShardSyncOutcome::Unchanged`]) when the stored
    /// checksum already matches. Emits an audit event either way, and
    /// `SHARD_SYNC_FAILED` on any error.
    pub fn sync_shard(&self, shard_id: u64, data: &[String]) -> StorageResult<ShardSyncOutcome> {
        let _guard = self.shard_lock.lock();
        match self.sync_shard_locked(shard_id, data) {
            Ok(outcome) => {
                self.audit().log_event(AuditEvent::now(
                    "shard",
                    "SHARD_SYNC",
                    AuditSeverity::Info,
                    "chain-store",
                    serde_json::json!({
                        "shard_id": shard_id,
                        "entries": data.len(),
                        "written": outcome == ShardSyncOutcome::Written,
                    }),
                ));
                Ok(outcome)
            }
            Err(err) => {
                self.audit().log_event(AuditEvent::now(
                    "shard",
                    "SHARD_SYNC_FAILED",
                    AuditSeverity::Error,
                    "chain-store",
                    serde_json::json!({
                        "shard_id": shard_id,
                        "error": err.to_string(),
                    }),
                ));
                Err(err)
            }
        }
    }

    fn sync_shard_locked(&self, shard_id: u64, data: &[String]) -> StorageResult<ShardSyncOutcome> {
        let canonical = serde_json::to_string(data)?;
        let checksum = sha256_hex(canonical.as_bytes());

        let key = keys::shard(shard_id);
        if let Some(existing) = self.get_json::<Shard>(&key)? {
            if existing.checksum == checksum && !existing.deleted {
                debug!(shard_id, "shard unchanged, sync skipped");
                return Ok(ShardSyncOutcome::Unchanged);
            }
        }

        let compressed = canonical.len() > SHARD_COMPRESSION_THRESHOLD;
        let payload = if compressed {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(canonical.as_bytes())?;
            hex::encode(encoder.finish()?)
        } else {
            canonical
        };

        let shard = Shard {
            shard_id,
            checksum,
            compressed,
            payload,
            entry_count: data.len(),
            updated_at: now_ms(),
            deleted: false,
            deleted_at: None,
        };
        self.put_json(&key, &shard)?;
        debug!(shard_id, entries = data.len(), compressed, "shard written");
        Ok(ShardSyncOutcome::Written)
    }

    /// Load and decode a shard's entries. Soft-deleted shards read as
    /// `None`.
    pub fn get_shard(&self, shard_id: u64) -> StorageResult<Option<Vec<String>>> {
        let Some(shard) = self.get_json::<Shard>(&keys::shard(shard_id))? else {
            return Ok(None);
        };
        if shard.deleted {
            return Ok(None);
        }
        let canonical = if shard.compressed {
            let compressed = hex::decode(&shard.payload)
                .map_err(|e| StorageError::CorruptShard(e.to_string()))?;
            let mut decoder = GzDecoder::new(compressed.as_slice());
            let mut out = String::new();
            decoder
                .read_to_string(&mut out)
                .map_err(|e| StorageError::CorruptShard(e.to_string()))?;
            out
        } else {
            shard.payload
        };
        // Integrity gate on the read path too: a payload that no longer
        // matches its checksum must never be served.
        if sha256_hex(canonical.as_bytes()) != shard.checksum {
            return Err(StorageError::CorruptShard(format!(
                "shard {shard_id} checksum mismatch"
            )));
        }
        Ok(Some(serde_json::from_str(&canonical)?))
    }

    /// Soft-delete a shard. Compaction physically removes it after the
    /// retention window. Returns `false` if the shard does not exist.
    pub fn mark_shard_deleted(&self, shard_id: u64) -> StorageResult<bool> {
        let _guard = self.shard_lock.lock();
        let key = keys::shard(shard_id);
        match self.get_json::<Shard>(&key)? {
            Some(mut shard) => {
                shard.deleted = true;
                shard.deleted_at = Some(now_ms());
                self.put_json(&key, &shard)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::MemoryAudit;
    use std::sync::Arc;

    fn store_with_audit() -> (ChainStore, Arc<MemoryAudit>) {
        let audit = MemoryAudit::new();
        let store = ChainStore::open_temporary(audit.clone()).unwrap();
        (store, audit)
    }

    fn entries(n: usize, len: usize) -> Vec<String> {
        (0..n).map(|i| format!("{i}:{}", "x".repeat(len))).collect()
    }

    #[test]
    fn sync_and_read_back() {
        let (store, _) = store_with_audit();
        let data = entries(5, 10);
        assert_eq!(
            store.sync_shard(1, &data).unwrap(),
            ShardSyncOutcome::Written
        );
        assert_eq!(store.get_shard(1).unwrap().unwrap(), data);
    }

    #[test]
    fn unchanged_data_is_a_noop() {
        let (store, _) = store_with_audit();
        let data = entries(5, 10);
        store.sync_shard(1, &data).unwrap();
        let before = store.get_json::<Shard>(&keys::shard(1)).unwrap().unwrap();

        assert_eq!(
            store.sync_shard(1, &data).unwrap(),
            ShardSyncOutcome::Unchanged
        );
        let after = store.get_json::<Shard>(&keys::shard(1)).unwrap().unwrap();
        assert_eq!(before.updated_at, after.updated_at);
    }

    #[test]
    fn changed_data_rewrites() {
        let (store, _) = store_with_audit();
        store.sync_shard(1, &entries(5, 10)).unwrap();
        let changed = entries(6, 10);
        assert_eq!(
            store.sync_shard(1, &changed).unwrap(),
            ShardSyncOutcome::Written
        );
        assert_eq!(store.get_shard(1).unwrap().unwrap(), changed);
    }

    #[test]
    fn large_payloads_are_compressed() {
        let (store, _) = store_with_audit();
        // ~200 KiB of entries, comfortably past the 100 KiB threshold.
        let data = entries(200, 1024);
        store.sync_shard(2, &data).unwrap();

        let shard = store.get_json::<Shard>(&keys::shard(2)).unwrap().unwrap();
        assert!(shard.compressed);
        // Round-trips through gzip.
        assert_eq!(store.get_shard(2).unwrap().unwrap(), data);
    }

    #[test]
    fn small_payloads_stay_plain() {
        let (store, _) = store_with_audit();
        store.sync_shard(3, &entries(3, 16)).unwrap();
        let shard = store.get_json::<Shard>(&keys::shard(3)).unwrap().unwrap();
        assert!(!shard.compressed);
    }

    #[test]
    fn sync_emits_audit_event() {
        let (store, audit) = store_with_audit();
        store.sync_shard(1, &entries(1, 8)).unwrap();
        assert!(audit.has_action("SHARD_SYNC"));
    }

    #[test]
    fn soft_delete_hides_shard() {
        let (store, _) = store_with_audit();
        store.sync_shard(1, &entries(2, 8)).unwrap();
        assert!(store.mark_shard_deleted(1).unwrap());
        assert!(store.get_shard(1).unwrap().is_none());
        // Deleting a missing shard reports false, not an error.
        assert!(!store.mark_shard_deleted(99).unwrap());
    }

    #[test]
    fn corrupt_payload_is_detected() {
        let (store, _) = store_with_audit();
        store.sync_shard(1, &entries(2, 8)).unwrap();
        let mut shard = store.get_json::<Shard>(&keys::shard(1)).unwrap().unwrap();
        shard.payload = r#"["tampered"]"#.to_string();
        store.put_json(&keys::shard(1), &shard).unwrap();

        assert!(matches!(
            store.get_shard(1),
            Err(StorageError::CorruptShard(_))
        ));
    }
}

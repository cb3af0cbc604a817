//! # Backup & Restore
//!
//! Streams the entire keyspace into a timestamped directory of JSON batch
//! files, each with a SHA-256 checksum sidecar, plus a `metadata.json`
//! summary:
//!
//! ```text
//! backup-20260801T120000/
//!   metadata.json
//!   batch-00000.json      batch-00000.sha256
//!   batch-00001.json      batch-00001.sha256
//!   ...
//! ```
//!
//! Restore is the inverse and verifies every batch checksum *before*
//! applying anything — a backup with one corrupt batch restores nothing.
//! Both operations take the store's exclusive guard, so they cannot
//! overlap with storage transactions.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::BACKUP_BATCH_SIZE;
use crate::crypto::hash::sha256_hex;
use crate::storage::db::ChainStore;
use crate::storage::errors::{StorageError, StorageResult};

/// One key-value pair in a batch file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BackupEntry {
    key: String,
    value: String,
}

/// The `metadata.json` summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupMetadata {
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// Number of batch files.
    pub batches: usize,
    /// Total entries across all batches.
    pub entries: usize,
    /// Checksum algorithm for the sidecar files.
    pub checksum: String,
}

fn batch_file(index: usize) -> String {
    format!("batch-{index:05}.json")
}

fn checksum_file(index: usize) -> String {
    format!("batch-{index:05}.sha256")
}

/// Stream the full keyspace into a new timestamped directory under
/// `target`. Returns the created directory.
pub fn backup(store: &ChainStore, target: &Path) -> StorageResult<PathBuf> {
    let _exclusive = store.exclusive_guard()?;

    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S");
    let dir = target.join(format!("backup-{stamp}"));
    fs::create_dir_all(&dir)?;

    // Every ASCII key sorts below the 0xFF sentinel, so the empty prefix
    // covers the whole keyspace.
    let everything = store.prefix_scan("")?;
    let entry_count = everything.len();

    let mut batches = 0usize;
    for (index, chunk) in everything.chunks(BACKUP_BATCH_SIZE).enumerate() {
        let entries: Vec<BackupEntry> = chunk
            .iter()
            .map(|(key, value)| BackupEntry {
                key: key.clone(),
                value: value.clone(),
            })
            .collect();
        let body = serde_json::to_string(&entries)?;
        fs::write(dir.join(batch_file(index)), &body)?;
        fs::write(dir.join(checksum_file(index)), sha256_hex(body.as_bytes()))?;
        batches = index + 1;
    }

    let metadata = BackupMetadata {
        created_at: chrono::Utc::now().to_rfc3339(),
        batches,
        entries: entry_count,
        checksum: "sha256".to_string(),
    };
    fs::write(
        dir.join("metadata.json"),
        serde_json::to_string_pretty(&metadata)?,
    )?;

    info!(dir = %dir.display(), batches, entries = entry_count, "backup written");
    Ok(dir)
}

/// Restore a backup directory into the store.
///
/// Verifies every batch checksum first; any mismatch aborts before a
/// single key is written.
pub fn restore(store: &ChainStore, dir: &Path) -> StorageResult<usize> {
    let metadata_raw = fs::read_to_string(dir.join("metadata.json"))
        .map_err(|_| StorageError::InvalidBackup("missing metadata.json".to_string()))?;
    let metadata: BackupMetadata = serde_json::from_str(&metadata_raw)?;

    // Pass 1: verify all checksums.
    let mut bodies = Vec::with_capacity(metadata.batches);
    for index in 0..metadata.batches {
        let file = batch_file(index);
        let body = fs::read_to_string(dir.join(&file))
            .map_err(|_| StorageError::InvalidBackup(format!("missing {file}")))?;
        let expected = fs::read_to_string(dir.join(checksum_file(index)))
            .map_err(|_| StorageError::InvalidBackup(format!("missing checksum for {file}")))?;
        if sha256_hex(body.as_bytes()) != expected.trim() {
            return Err(StorageError::ChecksumMismatch { file });
        }
        bodies.push(body);
    }

    // Pass 2: apply.
    let _exclusive = store.exclusive_guard()?;
    let mut restored = 0usize;
    for body in bodies {
        let entries: Vec<BackupEntry> = serde_json::from_str(&body)?;
        for entry in entries {
            store.put(&entry.key, &entry.value)?;
            restored += 1;
        }
    }
    store.flush()?;

    info!(dir = %dir.display(), restored, "backup restored");
    Ok(restored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::MemoryAudit;
    use crate::types::block::Block;

    fn store() -> ChainStore {
        ChainStore::open_temporary(MemoryAudit::new()).unwrap()
    }

    #[test]
    fn backup_then_restore_round_trips() {
        let source = store();
        source.put_block(&Block::genesis()).unwrap();
        source.put("custom:key", "custom-value").unwrap();

        let dir = tempfile::tempdir().unwrap();
        let backup_dir = backup(&source, dir.path()).unwrap();

        let target = store();
        let restored = restore(&target, &backup_dir).unwrap();
        assert!(restored > 0);
        assert_eq!(
            target.get("custom:key").unwrap(),
            Some("custom-value".to_string())
        );
        assert_eq!(
            target.get_block_by_height(0).unwrap(),
            source.get_block_by_height(0).unwrap()
        );
    }

    #[test]
    fn backup_writes_metadata_and_checksums() {
        let source = store();
        source.put("k", "v").unwrap();
        let dir = tempfile::tempdir().unwrap();
        let backup_dir = backup(&source, dir.path()).unwrap();

        let metadata: BackupMetadata = serde_json::from_str(
            &std::fs::read_to_string(backup_dir.join("metadata.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(metadata.checksum, "sha256");
        assert_eq!(metadata.batches, 1);
        assert!(backup_dir.join("batch-00000.json").exists());
        assert!(backup_dir.join("batch-00000.sha256").exists());
    }

    #[test]
    fn corrupt_batch_aborts_restore_entirely() {
        let source = store();
        source.put("a", "1").unwrap();
        source.put("b", "2").unwrap();
        let dir = tempfile::tempdir().unwrap();
        let backup_dir = backup(&source, dir.path()).unwrap();

        // Corrupt the batch after the checksum was written.
        std::fs::write(backup_dir.join("batch-00000.json"), "[]").unwrap();

        let target = store();
        assert!(matches!(
            restore(&target, &backup_dir),
            Err(StorageError::ChecksumMismatch { .. })
        ));
        // Nothing was applied.
        assert_eq!(target.get("a").unwrap(), None);
        assert_eq!(target.get("b").unwrap(), None);
    }

    #[test]
    fn restore_rejects_missing_metadata() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            restore(&store(), dir.path()),
            Err(StorageError::InvalidBackup(_))
        ));
    }

    #[test]
    fn backup_excluded_during_transaction() {
        let source = store();
        source.begin_transaction().unwrap();
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            backup(&source, dir.path()),
            Err(StorageError::TransactionInProgress)
        ));
        source.rollback_transaction().unwrap();
    }

    #[test]
    fn empty_store_backs_up_cleanly() {
        let source = store();
        let dir = tempfile::tempdir().unwrap();
        let backup_dir = backup(&source, dir.path()).unwrap();
        let target = store();
        assert_eq!(restore(&target, &backup_dir).unwrap(), 0);
    }
}

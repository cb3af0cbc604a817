// Copyright (c) 2026 H3TAG contributors. MIT License.
// See LICENSE for details.

//! # h3tag-node
//!
//! The operational entry point for the H3TAG consensus core. `run` wires
//! the chain store, block validator, and direct voting engine together
//! and drives the period checker until shutdown; the remaining
//! subcommands are store maintenance (`init`, `compact`, `backup`,
//! `restore`).
//!
//! The P2P gossip layer, RPC surface, and mempool are separate services
//! that attach through the protocol crate's collaborator traits; this
//! binary ships placeholder collaborators so a single node can run the
//! consensus core standalone on devnet.

mod cli;
mod logging;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use h3tag_protocol::collaborators::{
    AuditLog, MempoolApi, NodeApi, SyncApi, SyncState, TracingAudit,
};
use h3tag_protocol::crypto::keys::Keypair;
use h3tag_protocol::storage::backup;
use h3tag_protocol::storage::db::ChainStore;
use h3tag_protocol::types::validator::Validator;
use h3tag_protocol::voting::{DirectVotingEngine, VotingConfig};

use cli::{Commands, NodeCli};
use logging::{init_logging, LogFormat};

// ---------------------------------------------------------------------------
// Standalone collaborators
// ---------------------------------------------------------------------------

/// Placeholder mempool for standalone operation. A real deployment
/// attaches the mempool service here.
struct StandaloneMempool;

impl MempoolApi for StandaloneMempool {
    fn get_expected_validators(&self) -> Vec<Validator> {
        Vec::new()
    }
    fn handle_validation_failure(&self, reason: &str, validator: &Validator) {
        tracing::warn!(reason, address = %validator.address, "validation failure reported");
    }
    fn get_size(&self) -> u32 {
        0
    }
}

/// Placeholder peer surface: a standalone node has no peers, which keeps
/// the stability gate closed and governance idle until networking
/// attaches.
struct StandaloneNode;

impl NodeApi for StandaloneNode {
    fn get_peer_count(&self) -> u32 {
        0
    }
    fn get_active_validators(&self) -> Vec<Validator> {
        Vec::new()
    }
    fn close(&self) {}
}

struct StandaloneSync;

impl SyncApi for StandaloneSync {
    fn get_state(&self) -> SyncState {
        SyncState::Idle
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = NodeCli::parse();
    match cli.command {
        Commands::Run(args) => {
            init_logging("info", LogFormat::from_str_lossy(&args.log_format));
            run_node(&expand_home(&args.data_dir), args.period_check_secs)
        }
        Commands::Init(args) => {
            init_logging("info", LogFormat::Pretty);
            init_node(&expand_home(&args.data_dir))
        }
        Commands::Compact(args) => {
            init_logging("warn", LogFormat::Pretty);
            compact_store(&expand_home(&args.data_dir))
        }
        Commands::Backup(args) => {
            init_logging("info", LogFormat::Pretty);
            backup_store(&expand_home(&args.data_dir), &args.output)
        }
        Commands::Restore(args) => {
            init_logging("info", LogFormat::Pretty);
            restore_store(&expand_home(&args.data_dir), &args.input)
        }
        Commands::Version => {
            println!("h3tag-node {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn run_node(data_dir: &Path, period_check_secs: u64) -> Result<()> {
    let store = open_store(data_dir)?;
    let audit: Arc<dyn AuditLog> = Arc::new(TracingAudit);

    let engine = Arc::new(DirectVotingEngine::new(
        Arc::clone(&store),
        Arc::new(StandaloneMempool),
        Arc::new(StandaloneNode),
        Arc::new(StandaloneSync),
        audit,
        VotingConfig::default(),
    ));
    engine
        .initialize()
        .context("voting engine initialization")?;

    info!(
        height = store.current_height()?,
        data_dir = %data_dir.display(),
        "h3tag node running; ctrl-c to stop"
    );

    let runtime = tokio::runtime::Runtime::new().context("tokio runtime")?;
    runtime.block_on(async {
        let checker = tokio::spawn(
            Arc::clone(&engine).run_period_checker(Duration::from_secs(period_check_secs)),
        );
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown requested");
        engine.dispose();
        checker.abort();
    });

    store.flush()?;
    info!("node stopped");
    Ok(())
}

fn init_node(data_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("creating {}", data_dir.display()))?;

    let key_path = data_dir.join("validator.key");
    if key_path.exists() {
        anyhow::bail!("{} already exists; refusing to overwrite", key_path.display());
    }
    let keypair = Keypair::generate();
    std::fs::write(&key_path, keypair.secret_hex())?;

    // Open (and thereby create) the store so `run` starts instantly.
    let store = open_store(data_dir)?;
    store.flush()?;

    println!("initialized {}", data_dir.display());
    println!("validator address: {}", keypair.public_hex());
    Ok(())
}

fn compact_store(data_dir: &Path) -> Result<()> {
    let store = open_store(data_dir)?;
    let report = store.compact().context("compaction")?;
    println!(
        "{}",
        serde_json::json!({
            "votes_removed": report.votes_removed,
            "shards_removed": report.shards_removed,
            "periods_removed": report.periods_removed,
        })
    );
    Ok(())
}

fn backup_store(data_dir: &Path, output: &Path) -> Result<()> {
    let store = open_store(data_dir)?;
    let dir = backup::backup(&store, output).context("backup")?;
    println!("backup written to {}", dir.display());
    Ok(())
}

fn restore_store(data_dir: &Path, input: &Path) -> Result<()> {
    let store = open_store(data_dir)?;
    let restored = backup::restore(&store, input).context("restore")?;
    println!("restored {restored} entries");
    Ok(())
}

fn open_store(data_dir: &Path) -> Result<Arc<ChainStore>> {
    let audit: Arc<dyn AuditLog> = Arc::new(TracingAudit);
    let store = ChainStore::open(data_dir.join("chainstore"), audit)
        .with_context(|| format!("opening chain store in {}", data_dir.display()))?;
    Ok(Arc::new(store))
}

/// Expand a leading `~` to the user's home directory.
fn expand_home(path: &Path) -> PathBuf {
    let Some(raw) = path.to_str() else {
        return path.to_path_buf();
    };
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    path.to_path_buf()
}

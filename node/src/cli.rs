//! # CLI Interface
//!
//! Defines the command-line argument structure for `h3tag-node` using
//! `clap` derive: `run`, `init`, `compact`, `backup`, `restore`, and
//! `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// H3TAG consensus node.
///
/// Runs the consensus core — direct voting engine, block validator, and
/// the chain store — and exposes operational maintenance commands for
/// the on-disk keyspace.
#[derive(Parser, Debug)]
#[command(
    name = "h3tag-node",
    about = "H3TAG consensus node",
    version,
    propagate_version = true
)]
pub struct NodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the consensus node.
    Run(RunArgs),
    /// Initialize a new node — creates the data directory and generates
    /// a fresh validator keypair.
    Init(InitArgs),
    /// Sweep expired votes, shards, and voting periods from the store.
    Compact(StoreArgs),
    /// Write a checksummed backup of the full keyspace.
    Backup(BackupArgs),
    /// Restore a backup into the store, verifying every checksum first.
    Restore(RestoreArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the node data directory where the chain store and keys
    /// live. Created on first run if it does not exist.
    #[arg(long, short = 'd', env = "H3TAG_DATA_DIR", default_value = "~/.h3tag")]
    pub data_dir: PathBuf,

    /// Period-checker tick interval in seconds.
    #[arg(long, env = "H3TAG_PERIOD_CHECK_SECS", default_value_t = 60)]
    pub period_check_secs: u64,

    /// Log format: "pretty" or "json".
    #[arg(long, env = "H3TAG_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Path to the data directory to initialize.
    #[arg(long, short = 'd', env = "H3TAG_DATA_DIR", default_value = "~/.h3tag")]
    pub data_dir: PathBuf,
}

/// Arguments for store-level maintenance subcommands.
#[derive(Parser, Debug)]
pub struct StoreArgs {
    /// Path to the node data directory.
    #[arg(long, short = 'd', env = "H3TAG_DATA_DIR", default_value = "~/.h3tag")]
    pub data_dir: PathBuf,
}

/// Arguments for the `backup` subcommand.
#[derive(Parser, Debug)]
pub struct BackupArgs {
    /// Path to the node data directory.
    #[arg(long, short = 'd', env = "H3TAG_DATA_DIR", default_value = "~/.h3tag")]
    pub data_dir: PathBuf,

    /// Directory the timestamped backup is written into.
    #[arg(long, short = 'o', default_value = "./backups")]
    pub output: PathBuf,
}

/// Arguments for the `restore` subcommand.
#[derive(Parser, Debug)]
pub struct RestoreArgs {
    /// Path to the node data directory.
    #[arg(long, short = 'd', env = "H3TAG_DATA_DIR", default_value = "~/.h3tag")]
    pub data_dir: PathBuf,

    /// The backup directory to restore from (a `backup-<timestamp>`
    /// directory produced by the `backup` subcommand).
    #[arg(long, short = 'i')]
    pub input: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        // Ensures the derive macros produce a valid CLI definition.
        NodeCli::command().debug_assert();
    }

    #[test]
    fn parses_run_with_overrides() {
        let cli = NodeCli::parse_from([
            "h3tag-node",
            "run",
            "--data-dir",
            "/tmp/h3tag",
            "--period-check-secs",
            "5",
        ]);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.data_dir, PathBuf::from("/tmp/h3tag"));
                assert_eq!(args.period_check_secs, 5);
            }
            other => panic!("expected Run, got {other:?}"),
        }
    }
}

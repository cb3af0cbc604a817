// Copyright (c) 2026 H3TAG contributors. MIT License.
// See LICENSE for details.

//! # H3TAG Protocol — Consensus Core
//!
//! The consensus core of H3TAG: a hybrid proof-of-work + quadratic-voting
//! blockchain. Miners still race hashes, but which chain is canonical —
//! and how protocol parameters evolve — is decided by votes whose weight
//! is the square root of the value behind them. Money talks here, but
//! only at √(volume).
//!
//! ## Architecture
//!
//! Four subsystems, leaves first:
//!
//! - **merkle** — Content-addressed integrity for ordered string
//!   sequences. One primitive, three commitments (transactions,
//!   validator set, votes).
//! - **storage** — A flat, prefix-scannable key-value store (sled) with
//!   transactional batches, bounded TTL caches, compaction, checksummed
//!   backups, and shard replication.
//! - **validation** — The deterministic accept/reject pipeline for
//!   candidate blocks: structure, size, time, PoW, votes, validator
//!   weight, linkage, merkle roots, transactions.
//! - **voting** — The direct voting engine: fixed-length periods,
//!   quadratic vote admission, and fork arbitration.
//!
//! Supporting cast: **types** (the entities everything above hashes,
//! signs, and persists), **crypto** (SHA3-256 + Ed25519 behind opaque
//! strings), **collaborators** (capability traits for the mempool, node,
//! sync, and audit surfaces this crate consumes but does not own),
//! **retry** (bounded backoff for transient faults), and **config**
//! (every constant, in one place).
//!
//! ## Design Philosophy
//!
//! 1. Consensus arithmetic is integer arithmetic. No floats near money.
//! 2. Not-found is `Ok(None)`, never an error.
//! 3. Every failure path has a typed error and an audit event.
//! 4. If it touches the chain state, it has tests. Plural.

pub mod collaborators;
pub mod config;
pub mod crypto;
pub mod merkle;
pub mod retry;
pub mod storage;
pub mod types;
pub mod validation;
pub mod voting;

//! # Core Types
//!
//! The vocabulary of the H3TAG chain: blocks, transactions, UTXOs, votes,
//! validators, and the chain-state record. These are the shapes that get
//! hashed, signed, and persisted — which is why everything here derives
//! `Serialize`/`Deserialize` and why field order matters (canonical hashing
//! serializes structs in declaration order; see `block.rs`).
//!
//! ```text
//! amount.rs      — u128 base units with the decimal-string JSON convention
//! transaction.rs — tagged transaction variants, inputs/outputs, builder
//! block.rs       — header with triple merkle commitments, canonical hash
//! utxo.rs        — unspent outputs, the chain's value ledger
//! vote.rs        — quadratic votes and the chain-selection payload
//! validator.rs   — validator records, metrics, reputation
//! period.rs      — voting period lifecycle and its state machine
//! chain_state.rs — the single process-wide tip record
//! ```

pub mod amount;
pub mod block;
pub mod chain_state;
pub mod period;
pub mod transaction;
pub mod utxo;
pub mod validator;
pub mod vote;

pub use amount::{from_display, to_display, Units};
pub use block::{Block, BlockHeader};
pub use chain_state::ChainState;
pub use period::{PeriodStatus, PeriodType, VotingPeriod};
pub use transaction::{
    Transaction, TransactionBuilder, TransactionStatus, TransactionType, TxInput, TxOutput,
};
pub use utxo::Utxo;
pub use validator::{Validator, ValidatorMetrics};
pub use vote::{isqrt, ChainVoteData, Vote};

/// Milliseconds since the Unix epoch. All protocol timestamps use this.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

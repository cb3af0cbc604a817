//! # Direct Voting Module
//!
//! Quadratic-voting governance: period lifecycle, vote admission, fork
//! arbitration, and the supporting machinery.
//!
//! ```text
//! engine.rs    — DirectVotingEngine: admission gauntlet, fork tally,
//!                period transitions, cached reads
//! schedule.rs  — boundary arithmetic and wall-clock timer estimation
//! stability.rs — the latching network-stability gate
//! ```
//!
//! The [`crate::types::period`] module holds the period entity itself —
//! storage persists periods, so the type lives below this module in the
//! dependency order.

pub mod engine;
pub mod schedule;
pub mod stability;

pub use engine::{DirectVotingEngine, VotingConfig, VotingError, VotingMetrics, VotingSchedule};
pub use stability::NetworkStabilityGate;

//! # Voting Periods
//!
//! A period is a contiguous span of block heights during which votes are
//! collected and finalized atomically. The lifecycle is a one-way street:
//!
//! ```text
//! Scheduled -> Active -> Completed   (terminal)
//!                 \----> Cancelled   (terminal, administrative only)
//! ```
//!
//! Completed periods are immutable — every mutating method refuses to
//! touch one. The "exactly one active period" invariant is enforced by
//! the voting engine under its period mutex; this type only enforces the
//! legal transitions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle state of a voting period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodStatus {
    /// Created ahead of its start height; not yet accepting votes.
    Scheduled,
    /// Accepting votes.
    Active,
    /// Finalized. Terminal.
    Completed,
    /// Administratively aborted. Terminal.
    Cancelled,
}

/// What the period is deciding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodType {
    /// Chain/node selection at a fork.
    NodeSelection,
    /// Protocol parameter change.
    ParameterChange,
}

/// Illegal period transition.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PeriodTransitionError {
    #[error("period {0} is terminal and cannot change state")]
    Terminal(u64),
    #[error("period {0} is not active")]
    NotActive(u64),
    #[error("period {0} is not scheduled")]
    NotScheduled(u64),
}

/// A voting period record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingPeriod {
    /// Monotonic period identifier.
    pub period_id: u64,
    /// First block height (inclusive) accepting votes.
    pub start_block: u64,
    /// Last block height (inclusive) accepting votes.
    pub end_block: u64,
    /// Wall-clock open time, milliseconds since epoch.
    pub start_time: u64,
    /// Wall-clock deadline, milliseconds since epoch.
    pub end_time: u64,
    /// Lifecycle state.
    pub status: PeriodStatus,
    /// Decision type.
    #[serde(rename = "type")]
    pub period_type: PeriodType,
    /// Merkle root over the period's votes, maintained incrementally.
    pub votes_merkle_root: String,
    /// Set once the period has been through the audit pipeline.
    pub is_audited: bool,
    /// Creation time, milliseconds since epoch.
    pub created_at: u64,
}

impl VotingPeriod {
    /// Create a period in `Active` state spanning `[start_block, end_block]`.
    pub fn open(
        period_id: u64,
        start_block: u64,
        end_block: u64,
        period_type: PeriodType,
        now_ms: u64,
        duration_ms: u64,
    ) -> Self {
        debug_assert!(end_block > start_block);
        Self {
            period_id,
            start_block,
            end_block,
            start_time: now_ms,
            end_time: now_ms + duration_ms,
            status: PeriodStatus::Active,
            period_type,
            votes_merkle_root: String::new(),
            is_audited: false,
            created_at: now_ms,
        }
    }

    /// `true` while the period accepts votes.
    pub fn is_active(&self) -> bool {
        self.status == PeriodStatus::Active
    }

    /// `true` for terminal states.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, PeriodStatus::Completed | PeriodStatus::Cancelled)
    }

    /// `true` when `height` lies inside the voting window.
    pub fn contains_height(&self, height: u64) -> bool {
        (self.start_block..=self.end_block).contains(&height)
    }

    /// `true` once the wall-clock deadline has passed.
    pub fn timed_out(&self, now_ms: u64) -> bool {
        now_ms > self.end_time
    }

    /// `Scheduled -> Active`.
    pub fn activate(&mut self, now_ms: u64) -> Result<(), PeriodTransitionError> {
        match self.status {
            PeriodStatus::Scheduled => {
                self.status = PeriodStatus::Active;
                self.start_time = now_ms;
                Ok(())
            }
            PeriodStatus::Completed | PeriodStatus::Cancelled => {
                Err(PeriodTransitionError::Terminal(self.period_id))
            }
            PeriodStatus::Active => Err(PeriodTransitionError::NotScheduled(self.period_id)),
        }
    }

    /// `Active -> Completed`.
    pub fn complete(&mut self) -> Result<(), PeriodTransitionError> {
        match self.status {
            PeriodStatus::Active => {
                self.status = PeriodStatus::Completed;
                Ok(())
            }
            PeriodStatus::Completed | PeriodStatus::Cancelled => {
                Err(PeriodTransitionError::Terminal(self.period_id))
            }
            PeriodStatus::Scheduled => Err(PeriodTransitionError::NotActive(self.period_id)),
        }
    }

    /// `Active -> Cancelled`. Administrative override only.
    pub fn cancel(&mut self) -> Result<(), PeriodTransitionError> {
        match self.status {
            PeriodStatus::Active => {
                self.status = PeriodStatus::Cancelled;
                Ok(())
            }
            PeriodStatus::Completed | PeriodStatus::Cancelled => {
                Err(PeriodTransitionError::Terminal(self.period_id))
            }
            PeriodStatus::Scheduled => Err(PeriodTransitionError::NotActive(self.period_id)),
        }
    }
}

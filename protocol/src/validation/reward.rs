//! # Block Reward Schedule
//!
//! The subsidy starts at 50 TAG and halves every 210 000 blocks with
//! integer truncation, saturating at the 1 TAG floor after at most 64
//! halvings. Truncation means the curve is 50, 25, 12, 6, 3, 1, 1, … —
//! monotonically non-increasing by construction.

use crate::config::{HALVING_INTERVAL, INITIAL_REWARD, MAX_HALVINGS, MIN_REWARD};
use crate::types::amount::{tag_to_units, Units};

/// Block subsidy at `height`, in whole TAG.
pub fn block_reward(height: u64) -> u128 {
    let halvings = (height / HALVING_INTERVAL).min(MAX_HALVINGS as u64) as u32;
    (INITIAL_REWARD >> halvings).max(MIN_REWARD)
}

/// Block subsidy at `height`, in base units. This is the cap the
/// validator enforces on coinbase outputs.
pub fn block_reward_units(height: u64) -> Units {
    tag_to_units(block_reward(height))
}

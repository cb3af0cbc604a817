//! # Voting Schedule
//!
//! Pure arithmetic for when periods open and close. Heights are the
//! source of truth; wall-clock estimates exist only to arm timers, and a
//! wrong estimate costs a timer re-check, never a consensus divergence.
//!
//! The measured average block time comes from the trailing
//! [`crate::config::BLOCK_TIME_WINDOW`] blocks, falling back to the
//! 600-second target when the chain is too young to measure. Timer waits
//! are chunked at [`crate::config::MAX_TIMER_CHUNK`] and re-armed, so no
//! single sleep outlives a day regardless of what the arithmetic says.

use std::time::Duration;

use crate::config::{BLOCK_TIME_WINDOW, DEFAULT_BLOCK_TIME, MAX_TIMER_CHUNK, VOTING_PERIOD_BLOCKS};
use crate::storage::db::ChainStore;
use crate::storage::errors::StorageResult;

/// The next height at which a voting period boundary falls:
/// `⌈height / VOTING_PERIOD_BLOCKS⌉ · VOTING_PERIOD_BLOCKS`.
///
/// A height exactly on the boundary returns itself — the transition is
/// due now.
pub fn next_voting_height(current_height: u64) -> u64 {
    current_height.div_ceil(VOTING_PERIOD_BLOCKS) * VOTING_PERIOD_BLOCKS
}

/// Measured average block time over the trailing window, or the
/// 600-second default when fewer than two blocks exist.
pub fn average_block_time(store: &ChainStore) -> StorageResult<Duration> {
    let tip = store.current_height()?;
    if tip == 0 {
        return Ok(DEFAULT_BLOCK_TIME);
    }
    let window_start = tip.saturating_sub(BLOCK_TIME_WINDOW);
    let (Some(first), Some(last)) = (
        store.get_block_by_height(window_start)?,
        store.get_block_by_height(tip)?,
    ) else {
        return Ok(DEFAULT_BLOCK_TIME);
    };
    let span = tip - window_start;
    if span == 0 || last.header.timestamp <= first.header.timestamp {
        return Ok(DEFAULT_BLOCK_TIME);
    }
    let elapsed_ms = last.header.timestamp - first.header.timestamp;
    Ok(Duration::from_millis(elapsed_ms / span))
}

/// Wall-clock estimate until the next period transition.
pub fn transition_delay(current_height: u64, avg_block_time: Duration) -> Duration {
    let target = next_voting_height(current_height);
    let blocks_remaining = target.saturating_sub(current_height);
    avg_block_time.saturating_mul(blocks_remaining.min(u32::MAX as u64) as u32)
}

/// Split a wait into the next timer arm and the remainder. Waits longer
/// than the chunk cap re-arm at the cap.
pub fn chunk_delay(total: Duration) -> (Duration, Duration) {
    if total > MAX_TIMER_CHUNK {
        (MAX_TIMER_CHUNK, total - MAX_TIMER_CHUNK)
    } else {
        (total, Duration::ZERO)
    }
}

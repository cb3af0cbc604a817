//! # Dynamic Block-Size Limit
//!
//! The byte-size ceiling for a candidate block is not a constant — it
//! tracks network conditions, anchored to the previous block's size:
//!
//! ```text
//! nominal = prev_size × congestion × block_time × propagation
//! limit   = clamp(clamp(nominal, prev ± 20%), 1 MiB, 32 MiB)
//! ```
//!
//! - **congestion** ∈ [0.5, 2.0] — twice the mempool fill ratio, so a full
//!   mempool doubles the target and an empty one halves it.
//! - **block_time** ∈ [0.8, 1.2] — target-to-observed ratio; slow blocks
//!   shrink the target, fast blocks grow it.
//! - **propagation** ∈ [0.7, 1.3] — 1000 / median propagation ms; a slow
//!   relay network caps growth before orphan rates climb.
//!
//! The ±20% change cap is what keeps a single congested block from
//! doubling the limit in one step.

use crate::config::{BLOCK_SIZE_CHANGE_LIMIT, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE};

/// Observed network conditions feeding the size computation.
#[derive(Debug, Clone, Copy)]
pub struct SizeInputs {
    /// Serialized size of the previous block, in bytes.
    pub previous_size: u64,
    /// Mempool fill ratio, `[0, 1]`.
    pub mempool_fill: f64,
    /// Observed inter-block time, seconds.
    pub observed_block_time_secs: f64,
    /// Target inter-block time, seconds.
    pub target_block_time_secs: f64,
    /// Median block propagation delay, milliseconds.
    pub median_propagation_ms: f64,
}

/// Congestion factor: `clamp(2 × fill, 0.5, 2.0)`.
pub fn congestion_factor(mempool_fill: f64) -> f64 {
    (mempool_fill * 2.0).clamp(0.5, 2.0)
}

/// Block-time factor: `clamp(target / observed, 0.8, 1.2)`.
pub fn block_time_factor(target_secs: f64, observed_secs: f64) -> f64 {
    if observed_secs <= 0.0 {
        return 1.0;
    }
    (target_secs / observed_secs).clamp(0.8, 1.2)
}

/// Propagation factor: `clamp(1000 / median_ms, 0.7, 1.3)`.
pub fn propagation_factor(median_propagation_ms: f64) -> f64 {
    if median_propagation_ms <= 0.0 {
        return 1.0;
    }
    (1_000.0 / median_propagation_ms).clamp(0.7, 1.3)
}

/// The enforced byte-size limit for the next block.
pub fn dynamic_block_size_limit(inputs: &SizeInputs) -> u64 {
    let prev = inputs.previous_size as f64;
    let nominal = prev
        * congestion_factor(inputs.mempool_fill)
        * block_time_factor(
            inputs.target_block_time_secs,
            inputs.observed_block_time_secs,
        )
        * propagation_factor(inputs.median_propagation_ms);

    // Per-block change cap, then the absolute envelope.
    let low = prev * (1.0 - BLOCK_SIZE_CHANGE_LIMIT);
    let high = prev * (1.0 + BLOCK_SIZE_CHANGE_LIMIT);
    let capped = nominal.clamp(low, high);
    (capped as u64).clamp(MIN_BLOCK_SIZE, MAX_BLOCK_SIZE)
}

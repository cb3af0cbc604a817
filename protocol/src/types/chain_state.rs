//! Process-wide chain tip record, rewritten on every block commit.

use serde::{Deserialize, Serialize};

/// The single authoritative "where is the tip" record.
///
/// Height is strictly monotonic: the storage layer refuses to commit a
/// chain state whose height does not exceed the stored one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainState {
    /// Current chain height.
    pub height: u64,
    /// Hash of the block at `height`.
    pub last_block_hash: String,
    /// Commit time, milliseconds since epoch.
    pub timestamp: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_round_trip() {
        let state = ChainState {
            height: 42,
            last_block_hash: "ab".repeat(32),
            timestamp: 1_000,
        };
        let json = serde_json::to_string(&state).unwrap();
        let back: ChainState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, back);
    }
}

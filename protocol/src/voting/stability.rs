//! # Network Stability Gate
//!
//! Governance decisions made on a partitioned or syncing node are worse
//! than no decisions, so every period-opening and fork-resolution path
//! runs through this gate first:
//!
//! `stable ⇔ peer_count >= MIN_PEER_COUNT ∧ sync_state = Synced`
//!
//! Consecutive failures count up; at [`crate::config::MAX_STABILITY_FAILURES`]
//! the gate latches unstable for the cooldown window, absorbing flapping
//! connectivity instead of re-probing on every call.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::collaborators::{NodeApi, SyncApi, SyncState};
use crate::config::{MAX_STABILITY_FAILURES, MIN_PEER_COUNT, STABILITY_COOLDOWN};

struct GateState {
    consecutive_failures: u32,
    cooldown_until: Option<Instant>,
}

/// Latching peer-count + sync-state gate.
pub struct NetworkStabilityGate {
    node: Arc<dyn NodeApi>,
    sync: Arc<dyn SyncApi>,
    state: Mutex<GateState>,
}

impl NetworkStabilityGate {
    pub fn new(node: Arc<dyn NodeApi>, sync: Arc<dyn SyncApi>) -> Self {
        Self {
            node,
            sync,
            state: Mutex::new(GateState {
                consecutive_failures: 0,
                cooldown_until: None,
            }),
        }
    }

    /// Probe the network. During a cooldown this returns `false` without
    /// consulting the collaborators at all.
    pub fn is_stable(&self) -> bool {
        let mut state = self.state.lock();

        if let Some(until) = state.cooldown_until {
            if Instant::now() < until {
                return false;
            }
            // Cooldown elapsed; reset and probe fresh.
            state.cooldown_until = None;
            state.consecutive_failures = 0;
        }

        let peers = self.node.get_peer_count();
        let sync_state = self.sync.get_state();
        let stable = peers >= MIN_PEER_COUNT && sync_state == SyncState::Synced;

        if stable {
            state.consecutive_failures = 0;
            true
        } else {
            state.consecutive_failures += 1;
            debug!(
                peers,
                ?sync_state,
                failures = state.consecutive_failures,
                "network stability check failed"
            );
            if state.consecutive_failures >= MAX_STABILITY_FAILURES {
                warn!(
                    cooldown_secs = STABILITY_COOLDOWN.as_secs(),
                    "stability gate latched unstable"
                );
                state.cooldown_until = Some(Instant::now() + STABILITY_COOLDOWN);
            }
            false
        }
    }

    /// Current consecutive-failure count, for metrics.
    pub fn failure_count(&self) -> u32 {
        self.state.lock().consecutive_failures
    }

    /// `true` while the gate is latched in its cooldown window.
    pub fn in_cooldown(&self) -> bool {
        self.state
            .lock()
            .cooldown_until
            .map(|until| Instant::now() < until)
            .unwrap_or(false)
    }
}

//! # External Collaborators
//!
//! The consensus core does not own the mempool, the peer table, the sync
//! machinery, or the audit sink — it consumes them. Each collaborator is a
//! capability trait, and components hold `Arc<dyn Trait>` fields injected
//! at construction. No globals, no concrete cross-references, and the old
//! engine↔mempool cycle is gone: both sides depend on this module instead
//! of each other.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::types::validator::Validator;

// ---------------------------------------------------------------------------
// Mempool
// ---------------------------------------------------------------------------

/// The slice of the mempool the consensus core consumes.
pub trait MempoolApi: Send + Sync {
    /// Validators expected to attest to the next block.
    fn get_expected_validators(&self) -> Vec<Validator>;

    /// Report a validator that failed its validation duty. Fire-and-forget.
    fn handle_validation_failure(&self, reason: &str, validator: &Validator);

    /// Number of pending transactions, used for congestion estimation.
    fn get_size(&self) -> u32;
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// The slice of the node runtime the consensus core consumes.
pub trait NodeApi: Send + Sync {
    /// Currently connected peer count.
    fn get_peer_count(&self) -> u32;

    /// Validators the node currently considers active.
    fn get_active_validators(&self) -> Vec<Validator>;

    /// Release node resources. Called from `dispose()`.
    fn close(&self);
}

// ---------------------------------------------------------------------------
// Sync
// ---------------------------------------------------------------------------

/// Chain synchronization state as reported by the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncState {
    /// Not currently syncing (fresh node, or sync disabled).
    Idle,
    /// Downloading and replaying blocks.
    Syncing,
    /// Caught up with the network tip.
    Synced,
}

/// The slice of the sync engine the consensus core consumes.
pub trait SyncApi: Send + Sync {
    /// Current sync state.
    fn get_state(&self) -> SyncState;
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

/// Severity of an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
    Info,
    Warning,
    Error,
}

/// A structured audit record. Every failure path in the voting engine and
/// the storage layer emits one of these alongside its error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event id, for correlation in downstream sinks.
    pub id: String,
    /// Event family, e.g. `"storage"`, `"voting"`, `"shard"`.
    pub event_type: String,
    /// What happened, e.g. `"SHARD_SYNC_FAILED"`.
    pub action: String,
    /// How bad it is.
    pub severity: AuditSeverity,
    /// Emitting component.
    pub source: String,
    /// Milliseconds since epoch.
    pub timestamp: u64,
    /// Free-form context.
    pub details: serde_json::Value,
}

impl AuditEvent {
    /// Convenience constructor stamping the current time.
    pub fn now(
        event_type: &str,
        action: &str,
        severity: AuditSeverity,
        source: &str,
        details: serde_json::Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_type: event_type.to_string(),
            action: action.to_string(),
            severity,
            source: source.to_string(),
            timestamp: crate::types::now_ms(),
            details,
        }
    }
}

/// Fire-and-forget audit sink. Implementations MUST NOT fail the caller;
/// a broken audit pipeline is an operational problem, not a consensus one.
pub trait AuditLog: Send + Sync {
    fn log_event(&self, event: AuditEvent);
}

/// Audit sink that forwards events to `tracing` at the matching level.
#[derive(Debug, Default)]
pub struct TracingAudit;

impl AuditLog for TracingAudit {
    fn log_event(&self, event: AuditEvent) {
        match event.severity {
            AuditSeverity::Info => info!(
                event_type = %event.event_type,
                action = %event.action,
                source = %event.source,
                details = %event.details,
                "audit"
            ),
            AuditSeverity::Warning => warn!(
                event_type = %event.event_type,
                action = %event.action,
                source = %event.source,
                details = %event.details,
                "audit"
            ),
            AuditSeverity::Error => error!(
                event_type = %event.event_type,
                action = %event.action,
                source = %event.source,
                details = %event.details,
                "audit"
            ),
        }
    }
}

/// In-memory audit sink capturing events for assertions in tests.
#[derive(Debug, Default)]
pub struct MemoryAudit {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAudit {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Snapshot of everything logged so far.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    /// `true` if any event carries the given action tag.
    pub fn has_action(&self, action: &str) -> bool {
        self.events.lock().iter().any(|e| e.action == action)
    }
}

impl AuditLog for MemoryAudit {
    fn log_event(&self, event: AuditEvent) {
        self.events.lock().push(event);
    }
}

//! Sync lifecycle events for observability/analytics.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::resolve::ConflictChoice;

/// Events emitted while the engine runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SyncEvent {
    /// Bootstrap finished and the canvas is live.
    BootstrapCompleted {
        version: String,
        transactions: usize,
        /// True when the remote fetch failed and the canvas opened local-only.
        degraded: bool,
    },
    /// A local edit was captured into the log.
    TransactionCaptured {
        tx_id: Uuid,
        nodes_changed: usize,
        edges_changed: usize,
    },
    /// Pending transactions were acknowledged by the server.
    TransactionsPushed { count: usize },
    /// New remote transactions were merged into the local log.
    TransactionsMerged { count: usize },
    /// Full reconciliation re-pushed transactions the server had lost.
    DriftRepaired { count: usize },
    /// The log was collapsed into a fresh baseline.
    VersionCollapsed { previous: String, adopted: String },
    /// A divergence was resolved; `context` names the code path that hit it.
    ConflictResolved {
        context: String,
        choice: ConflictChoice,
    },
    /// The failure monitor crossed its threshold.
    RecoveryRecommended { consecutive_failures: u32 },
}

/// Callback for sync events.
pub type SyncEventHandler = Box<dyn Fn(SyncEvent) + Send + Sync>;

/// Shared fan-out of events to registered handlers.
#[derive(Clone, Default)]
pub struct EventSink {
    handlers: Arc<RwLock<Vec<SyncEventHandler>>>,
}

impl EventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, handler: SyncEventHandler) {
        self.handlers.write().push(handler);
    }

    pub fn emit(&self, event: SyncEvent) {
        for handler in self.handlers.read().iter() {
            handler(event.clone());
        }
    }
}

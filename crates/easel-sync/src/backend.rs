//! The server port.
//!
//! The engine never speaks a concrete transport; it is handed a
//! [`CanvasBackend`] trait object. Transport failures are plain errors;
//! the loops convert them into failure-counter ticks and retry next cycle.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use easel_core::{CanvasState, Transaction, VersionConflict};
use serde::{Deserialize, Serialize};

/// Server acknowledgement of a transaction push. `transactions` echoes the
/// pushed set with server-assigned `synced_at` stamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncAck {
    pub success: bool,
    pub transactions: Vec<Transaction>,
}

/// Result of asking the server to collapse a log into a new baseline.
#[derive(Debug, Clone)]
pub enum VersionOutcome {
    /// The server adopted the baseline and assigned it a fresh version.
    Created(CanvasState),
    /// Another session bumped the version first.
    Conflict(VersionConflict),
}

/// Remote authority for canvas state.
#[async_trait]
pub trait CanvasBackend: Send + Sync {
    /// Fetch the authoritative state for a canvas. The server materializes an
    /// empty state on first access, so this never reads as "missing".
    async fn fetch_state(&self, canvas_id: &str) -> anyhow::Result<CanvasState>;

    /// Overwrite the authoritative state (conflict override path).
    async fn put_state(&self, canvas_id: &str, state: &CanvasState) -> anyhow::Result<()>;

    /// Push transactions applying on top of `version`. Duplicate `tx_id`s
    /// must be tolerated server-side; delivery here is at-least-once.
    async fn sync_transactions(
        &self,
        canvas_id: &str,
        version: &str,
        transactions: &[Transaction],
    ) -> anyhow::Result<SyncAck>;

    /// Transactions for `version` created at or after `since`.
    async fn transactions_since(
        &self,
        canvas_id: &str,
        version: &str,
        since: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Transaction>>;

    /// Collapse `state` into a new baseline version.
    async fn create_version(
        &self,
        canvas_id: &str,
        state: &CanvasState,
    ) -> anyhow::Result<VersionOutcome>;
}

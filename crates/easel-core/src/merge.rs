//! Combining a local canvas state with the remote replica.
//!
//! ```text
//! merge(local, remote)
//!   ├── same version ───► union of both logs, deduped by tx_id,
//!   │                     sorted by created_at (never a conflict)
//!   └── versions differ
//!         ├── local fully synced ──► remote wins (fast-forward)
//!         └── local has un-synced ──► VersionConflict (user mediates)
//! ```
//!
//! For a `tx_id` present on both sides, the local copy wins only while it
//! still awaits sync; its cleared `synced_at` and `revoked` flag are local
//! intent the server has not seen yet. Otherwise the remote copy is kept.

use crate::{CanvasState, VersionConflict};

/// Result of a merge attempt.
#[derive(Debug, Clone)]
pub enum MergeOutcome {
    Merged(CanvasState),
    Conflict(VersionConflict),
}

/// Merge two states sharing a canvas. Pure and total: every input pair
/// produces either a merged state or a structured conflict.
pub fn merge_states(local: &CanvasState, remote: &CanvasState) -> MergeOutcome {
    if local.version != remote.version {
        if !local.has_unsynced() {
            // Everything local is already server-acknowledged; the remote
            // baseline supersedes it.
            return MergeOutcome::Merged(remote.clone());
        }
        return MergeOutcome::Conflict(VersionConflict {
            local: local.clone(),
            remote: remote.clone(),
        });
    }

    // Same version: both logs apply to the same baseline. Take the remote
    // baseline and fold the local log in, id by id.
    let mut merged = remote.clone();
    for local_tx in &local.transactions {
        match merged
            .transactions
            .iter_mut()
            .find(|t| t.tx_id == local_tx.tx_id)
        {
            Some(remote_tx) => {
                if local_tx.synced_at.is_none() {
                    *remote_tx = local_tx.clone();
                }
            }
            None => merged.transactions.push(local_tx.clone()),
        }
    }
    merged.sort_log();
    merged.updated_at = local.updated_at.max(remote.updated_at);
    MergeOutcome::Merged(merged)
}

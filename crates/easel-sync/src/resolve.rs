//! User-mediated conflict resolution.
//!
//! When the merge engine cannot reconcile two states, exactly one side must
//! become canonical. That choice is a strategy ([`ConflictResolver`]): the
//! headless default prefers the remote, the interactive implementation
//! blocks on the user. Every resolution is logged with its source context
//! and, when the local side wins, pushed to the server as an overriding
//! write.

use std::sync::Arc;

use async_trait::async_trait;
use easel_core::{CanvasState, VersionConflict};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::backend::CanvasBackend;
use crate::events::{EventSink, SyncEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictChoice {
    Local,
    Remote,
}

#[async_trait]
pub trait ConflictResolver: Send + Sync {
    /// Pick a side. `context` names the code path that surfaced the
    /// divergence (bootstrap, version collapse, ...).
    async fn resolve(&self, conflict: &VersionConflict, context: &str) -> ConflictChoice;
}

/// Dismiss-default resolution: the remote candidate wins.
pub struct PreferRemote;

#[async_trait]
impl ConflictResolver for PreferRemote {
    async fn resolve(&self, _conflict: &VersionConflict, _context: &str) -> ConflictChoice {
        ConflictChoice::Remote
    }
}

/// What the UI needs to render the choice: both candidates' last-modified
/// stamps, plus a reply channel. Dropping the reply counts as dismissal.
#[derive(Debug)]
pub struct ConflictPrompt {
    pub context: String,
    pub local_updated_at: chrono::DateTime<chrono::Utc>,
    pub remote_updated_at: chrono::DateTime<chrono::Utc>,
    pub reply: oneshot::Sender<ConflictChoice>,
}

/// Blocking user mediation over a channel to the UI.
pub struct PromptResolver {
    prompts: mpsc::Sender<ConflictPrompt>,
}

impl PromptResolver {
    /// Returns the resolver and the receiving end the UI listens on.
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<ConflictPrompt>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { prompts: tx }, rx)
    }
}

#[async_trait]
impl ConflictResolver for PromptResolver {
    async fn resolve(&self, conflict: &VersionConflict, context: &str) -> ConflictChoice {
        let (reply_tx, reply_rx) = oneshot::channel();
        let prompt = ConflictPrompt {
            context: context.to_string(),
            local_updated_at: conflict.local.updated_at,
            remote_updated_at: conflict.remote.updated_at,
            reply: reply_tx,
        };
        if self.prompts.send(prompt).await.is_err() {
            warn!(context, "conflict prompt channel closed; defaulting to remote");
            return ConflictChoice::Remote;
        }
        // A dropped reply is a dismissed dialog.
        reply_rx.await.unwrap_or(ConflictChoice::Remote)
    }
}

/// Route a conflict through the resolver and make the winner canonical.
///
/// Local wins are pushed to the server as an overriding write; a failed
/// override keeps local canonical here and lets the next cycle converge.
pub(crate) async fn arbitrate(
    resolver: &dyn ConflictResolver,
    backend: &Arc<dyn CanvasBackend>,
    canvas_id: &str,
    conflict: VersionConflict,
    context: &str,
    events: &EventSink,
) -> CanvasState {
    let choice = resolver.resolve(&conflict, context).await;
    info!(
        canvas = canvas_id,
        context,
        ?choice,
        local_version = %conflict.local.version,
        remote_version = %conflict.remote.version,
        local_updated_at = %conflict.local.updated_at,
        remote_updated_at = %conflict.remote.updated_at,
        "canvas conflict resolved"
    );
    events.emit(SyncEvent::ConflictResolved {
        context: context.to_string(),
        choice,
    });

    match choice {
        ConflictChoice::Remote => conflict.remote,
        ConflictChoice::Local => {
            if let Err(e) = backend.put_state(canvas_id, &conflict.local).await {
                warn!(canvas = canvas_id, error = %e, "conflict override write failed");
            }
            conflict.local
        }
    }
}

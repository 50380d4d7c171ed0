//! Transaction-log collapsing.
//!
//! The log is kept bounded: when the backlog crosses the configured
//! threshold, the push loop hands the cycle to the version manager, which
//! asks the server to adopt the materialized graph as a fresh baseline with
//! an empty log.

use std::sync::Arc;

use anyhow::Context;
use easel_core::CanvasState;
use easel_store::LocalStore;
use tracing::{info, warn};

use crate::backend::{CanvasBackend, VersionOutcome};
use crate::events::{EventSink, SyncEvent};
use crate::resolve::{arbitrate, ConflictResolver};
use crate::session::CanvasSession;
use crate::surface::GraphPort;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollapseOutcome {
    /// A new baseline (server-assigned or conflict-resolved) is now local.
    Adopted,
    /// Nothing to collapse, or the attempt could not be confirmed; the log
    /// is untouched and the next push cycle retries.
    Deferred,
}

pub struct VersionManager {
    pub(crate) backend: Arc<dyn CanvasBackend>,
    pub(crate) store: LocalStore,
    pub(crate) session: Arc<CanvasSession>,
    pub(crate) surface: Arc<dyn GraphPort>,
    pub(crate) resolver: Arc<dyn ConflictResolver>,
    pub(crate) events: EventSink,
}

impl VersionManager {
    /// Collapse the current log into a new baseline version.
    ///
    /// On a transport error the outcome is ambiguous: the server may have
    /// applied the collapse before the connection died. Re-fetching settles
    /// it: a changed remote version means the collapse landed, so it is
    /// adopted; an unchanged one leaves local state alone for a retry.
    pub async fn collapse(&self) -> anyhow::Result<CollapseOutcome> {
        let canvas_id = self.session.canvas_id();
        let Some(state) = self.store.load(canvas_id)? else {
            return Ok(CollapseOutcome::Deferred);
        };
        let prior_version = state.version.clone();

        let graph = state.materialize();
        let mut candidate = CanvasState::new(prior_version.clone());
        candidate.nodes = graph.nodes;
        candidate.edges = graph.edges;

        match self.backend.create_version(canvas_id, &candidate).await {
            Ok(VersionOutcome::Created(new_state)) => {
                info!(
                    canvas = canvas_id,
                    previous = %prior_version,
                    adopted = %new_state.version,
                    collapsed = state.transactions.len(),
                    "transaction log collapsed into new baseline"
                );
                self.adopt(&new_state)?;
                self.events.emit(SyncEvent::VersionCollapsed {
                    previous: prior_version,
                    adopted: new_state.version,
                });
                Ok(CollapseOutcome::Adopted)
            }
            Ok(VersionOutcome::Conflict(conflict)) => {
                let resolved = arbitrate(
                    self.resolver.as_ref(),
                    &self.backend,
                    canvas_id,
                    conflict,
                    "version-collapse",
                    &self.events,
                )
                .await;
                self.adopt(&resolved)?;
                Ok(CollapseOutcome::Adopted)
            }
            Err(create_err) => {
                warn!(
                    canvas = canvas_id,
                    error = %create_err,
                    "version collapse did not confirm; re-fetching to settle"
                );
                let remote = self
                    .backend
                    .fetch_state(canvas_id)
                    .await
                    .context("collapse unconfirmed and re-fetch failed")?;
                if remote.version != prior_version {
                    info!(
                        canvas = canvas_id,
                        adopted = %remote.version,
                        "collapse had landed server-side; adopting"
                    );
                    self.adopt(&remote)?;
                    self.events.emit(SyncEvent::VersionCollapsed {
                        previous: prior_version,
                        adopted: remote.version,
                    });
                    return Ok(CollapseOutcome::Adopted);
                }
                Err(create_err)
            }
        }
    }

    fn adopt(&self, state: &CanvasState) -> anyhow::Result<()> {
        self.store.save(self.session.canvas_id(), state)?;
        self.surface.set_graph(state.materialize());
        Ok(())
    }
}

//! The remote push loop body.
//!
//! Runs on a fixed tick plus on demand. A single-flight flag turns
//! overlapping triggers into no-ops; failures never escape; they become
//! failure-monitor ticks and the pending transactions simply ride the next
//! cycle (at-least-once delivery, duplicate-safe downstream via `tx_id`).

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::anyhow;
use easel_core::Transaction;
use easel_store::LocalStore;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::backend::CanvasBackend;
use crate::events::{EventSink, SyncEvent};
use crate::failure::FailureMonitor;
use crate::session::CanvasSession;
use crate::versioning::{CollapseOutcome, VersionManager};
use crate::SyncConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Another push was in flight, or the session is not initialized yet.
    Skipped,
    /// Nothing pending.
    Idle,
    Pushed { count: usize },
    /// The backlog crossed the threshold and was collapsed instead.
    Collapsed,
    /// The cycle failed; recorded on the failure monitor.
    Failed,
}

pub struct PushClient {
    pub(crate) backend: Arc<dyn CanvasBackend>,
    pub(crate) store: LocalStore,
    pub(crate) session: Arc<CanvasSession>,
    pub(crate) config: SyncConfig,
    pub(crate) failures: Arc<FailureMonitor>,
    pub(crate) versions: Arc<VersionManager>,
    pub(crate) events: EventSink,
    in_flight: AtomicBool,
}

impl PushClient {
    pub(crate) fn new(
        backend: Arc<dyn CanvasBackend>,
        store: LocalStore,
        session: Arc<CanvasSession>,
        config: SyncConfig,
        failures: Arc<FailureMonitor>,
        versions: Arc<VersionManager>,
        events: EventSink,
    ) -> Self {
        Self {
            backend,
            store,
            session,
            config,
            failures,
            versions,
            events,
            in_flight: AtomicBool::new(false),
        }
    }

    /// One push cycle: collapse when the backlog is long, otherwise send
    /// every pending transaction.
    pub async fn push_once(&self) -> PushOutcome {
        self.push(None).await
    }

    /// Push only the given transaction ids (drift repair, bootstrap repair).
    pub async fn push_subset(&self, tx_ids: &HashSet<Uuid>) -> PushOutcome {
        self.push(Some(tx_ids)).await
    }

    async fn push(&self, subset: Option<&HashSet<Uuid>>) -> PushOutcome {
        if !self.session.is_initialized() {
            return PushOutcome::Skipped;
        }
        if self.in_flight.swap(true, Ordering::SeqCst) {
            debug!("push already in flight; skipping tick");
            return PushOutcome::Skipped;
        }
        let result = self.run(subset).await;
        self.in_flight.store(false, Ordering::SeqCst);

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(canvas = self.session.canvas_id(), error = %e, "push cycle failed");
                self.failures.record_failure();
                PushOutcome::Failed
            }
        }
    }

    async fn run(&self, subset: Option<&HashSet<Uuid>>) -> anyhow::Result<PushOutcome> {
        let canvas_id = self.session.canvas_id();
        let Some(state) = self.store.load(canvas_id)? else {
            return Ok(PushOutcome::Idle);
        };

        // A long log means this cycle's job is collapsing, not pushing.
        if subset.is_none() && state.transactions.len() > self.config.collapse_threshold {
            return match self.versions.collapse().await? {
                CollapseOutcome::Adopted => {
                    self.failures.record_success();
                    Ok(PushOutcome::Collapsed)
                }
                CollapseOutcome::Deferred => Ok(PushOutcome::Idle),
            };
        }

        // A caller-supplied subset overrides the un-synced filter: drift
        // repair re-sends transactions the server lost even when they carry
        // a stale `synced_at`.
        let pending: Vec<Transaction> = state
            .transactions
            .iter()
            .filter(|t| match subset {
                Some(ids) => !t.revoked && ids.contains(&t.tx_id),
                None => t.is_pending(),
            })
            .cloned()
            .collect();
        if pending.is_empty() {
            return Ok(PushOutcome::Idle);
        }

        let ack = self
            .backend
            .sync_transactions(canvas_id, &state.version, &pending)
            .await?;
        if !ack.success {
            return Err(anyhow!("server rejected transaction sync"));
        }
        self.failures.record_success();

        // Re-read before stamping: a capture or poll may have landed while
        // the request was in flight.
        let mut current = self.store.load(canvas_id)?.unwrap_or(state);
        let stamped = current.stamp_synced(&ack.transactions);
        self.store.save(canvas_id, &current)?;

        debug!(
            canvas = canvas_id,
            pushed = pending.len(),
            stamped,
            "pending transactions acknowledged"
        );
        self.events.emit(SyncEvent::TransactionsPushed {
            count: pending.len(),
        });
        Ok(PushOutcome::Pushed {
            count: pending.len(),
        })
    }
}

//! Local edit capture.
//!
//! One capture routine, two entry points:
//! - [`LocalScheduler::trigger`] coalesces bursts of edits behind a
//!   quiescence window;
//! - [`LocalScheduler::capture_now`] is awaitable and serializes through a
//!   fair FIFO mutex, so concurrent callers execute in trigger order, one at
//!   a time.
//!
//! Captures stay muted until the session has been initialized for the
//! warm-up period, so bootstrap rehydration never registers as an edit.

use std::sync::Arc;

use easel_core::diff_transaction;
use easel_store::LocalStore;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::events::{EventSink, SyncEvent};
use crate::session::CanvasSession;
use crate::surface::GraphPort;
use crate::SyncConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Session not initialized, still warming up, or no local record yet.
    NotReady,
    /// The surface matches the persisted log; nothing to record.
    NoChanges,
    Captured { tx_id: Uuid },
}

/// The shared capture routine: surface graph → strip → diff against the
/// materialized record → append + persist.
pub(crate) struct CaptureCore {
    pub(crate) session: Arc<CanvasSession>,
    pub(crate) store: LocalStore,
    pub(crate) surface: Arc<dyn GraphPort>,
    pub(crate) config: SyncConfig,
    pub(crate) events: EventSink,
}

impl CaptureCore {
    fn capture(&self) -> anyhow::Result<CaptureOutcome> {
        if !self.session.warmed_up(self.config.warmup) {
            return Ok(CaptureOutcome::NotReady);
        }
        let canvas_id = self.session.canvas_id();
        let Some(mut state) = self.store.load(canvas_id)? else {
            return Ok(CaptureOutcome::NotReady);
        };

        let current = self.surface.current_graph().stripped();
        let baseline = state.materialize();
        let Some(tx) = diff_transaction(&baseline, &current) else {
            return Ok(CaptureOutcome::NoChanges);
        };

        let tx_id = tx.tx_id;
        let nodes_changed = tx.node_diffs.change_count();
        let edges_changed = tx.edge_diffs.change_count();
        state.transactions.push(tx);
        state.touch();
        self.store.save(canvas_id, &state)?;

        debug!(
            canvas = canvas_id,
            %tx_id,
            nodes_changed,
            edges_changed,
            "captured local edit"
        );
        self.events.emit(SyncEvent::TransactionCaptured {
            tx_id,
            nodes_changed,
            edges_changed,
        });
        Ok(CaptureOutcome::Captured { tx_id })
    }
}

/// The two-faced local scheduler over one [`CaptureCore`].
pub struct LocalScheduler {
    core: Arc<CaptureCore>,
    // tokio's Mutex queues waiters FIFO; that queue is the ordering
    // guarantee for immediate captures.
    serial: Arc<tokio::sync::Mutex<()>>,
    pending: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl LocalScheduler {
    pub(crate) fn new(core: CaptureCore) -> Self {
        Self {
            core: Arc::new(core),
            serial: Arc::new(tokio::sync::Mutex::new(())),
            pending: parking_lot::Mutex::new(None),
        }
    }

    /// Coalescing entry point: (re)schedules one capture for after the
    /// quiescence window. Rapid triggers collapse into a single run.
    pub fn trigger(&self) {
        let core = self.core.clone();
        let serial = self.serial.clone();
        let window = core.config.debounce_window;

        let mut pending = self.pending.lock();
        if let Some(previous) = pending.take() {
            previous.abort();
        }
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let _guard = serial.lock().await;
            if let Err(e) = core.capture() {
                warn!(error = %e, "debounced capture failed");
            }
        }));
    }

    /// Ordered-immediate entry point: runs the capture as soon as the FIFO
    /// queue reaches this caller, and reports what happened.
    pub async fn capture_now(&self) -> anyhow::Result<CaptureOutcome> {
        let _guard = self.serial.lock().await;
        self.core.capture()
    }

    /// Teardown flush: cancel any scheduled capture and run one final
    /// capture so the latest edit is not lost.
    pub async fn flush(&self) -> anyhow::Result<CaptureOutcome> {
        let pending = self.pending.lock().take();
        if let Some(handle) = pending {
            handle.abort();
        }
        self.capture_now().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::SharedGraph;
    use easel_core::{CanvasState, Node};
    use std::time::Duration;
    use tempfile::tempdir;

    fn scheduler_with(
        warmup: Duration,
        debounce: Duration,
    ) -> (LocalScheduler, SharedGraph, LocalStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();

        let session = Arc::new(CanvasSession::new("c1"));
        session.mark_initialized();
        store.save("c1", &CanvasState::new("v1")).unwrap();

        let surface = SharedGraph::new();
        let config = SyncConfig {
            warmup,
            debounce_window: debounce,
            ..Default::default()
        };
        let scheduler = LocalScheduler::new(CaptureCore {
            session,
            store: store.clone(),
            surface: Arc::new(surface.clone()),
            config,
            events: EventSink::new(),
        });
        (scheduler, surface, store, dir)
    }

    #[tokio::test]
    async fn capture_is_muted_during_warmup() {
        let (scheduler, surface, store, _dir) =
            scheduler_with(Duration::from_secs(3600), Duration::from_millis(10));
        surface.update(|g| g.nodes.push(Node::new("a", "note")));

        assert_eq!(
            scheduler.capture_now().await.unwrap(),
            CaptureOutcome::NotReady
        );
        assert!(store.load("c1").unwrap().unwrap().transactions.is_empty());
    }

    #[tokio::test]
    async fn capture_appends_one_transaction_per_distinct_edit() {
        let (scheduler, surface, store, _dir) =
            scheduler_with(Duration::ZERO, Duration::from_millis(10));
        surface.update(|g| g.nodes.push(Node::new("a", "note")));

        assert!(matches!(
            scheduler.capture_now().await.unwrap(),
            CaptureOutcome::Captured { .. }
        ));
        assert_eq!(
            scheduler.capture_now().await.unwrap(),
            CaptureOutcome::NoChanges
        );

        let state = store.load("c1").unwrap().unwrap();
        assert_eq!(state.transactions.len(), 1);
        assert_eq!(state.transactions[0].node_diffs.added[0].id, "a");
    }

    #[tokio::test]
    async fn ephemeral_churn_is_not_an_edit() {
        let (scheduler, surface, _store, _dir) =
            scheduler_with(Duration::ZERO, Duration::from_millis(10));
        surface.update(|g| {
            let mut node = Node::new("a", "note");
            node.selected = true;
            node.dragging = true;
            g.nodes.push(node);
        });

        // The node itself lands; its ephemeral flags do not.
        let outcome = scheduler.capture_now().await.unwrap();
        assert!(matches!(outcome, CaptureOutcome::Captured { .. }));

        surface.update(|g| g.nodes[0].selected = false);
        assert_eq!(
            scheduler.capture_now().await.unwrap(),
            CaptureOutcome::NoChanges
        );
    }

    #[tokio::test]
    async fn rapid_triggers_coalesce_into_one_capture() {
        let (scheduler, surface, store, _dir) =
            scheduler_with(Duration::ZERO, Duration::from_millis(40));
        surface.update(|g| g.nodes.push(Node::new("a", "note")));

        scheduler.trigger();
        scheduler.trigger();
        scheduler.trigger();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(store.load("c1").unwrap().unwrap().transactions.len(), 1);
    }

    #[tokio::test]
    async fn flush_runs_pending_capture_immediately() {
        let (scheduler, surface, store, _dir) =
            scheduler_with(Duration::ZERO, Duration::from_secs(3600));
        surface.update(|g| g.nodes.push(Node::new("a", "note")));

        scheduler.trigger(); // would fire an hour from now
        let outcome = scheduler.flush().await.unwrap();
        assert!(matches!(outcome, CaptureOutcome::Captured { .. }));
        assert_eq!(store.load("c1").unwrap().unwrap().transactions.len(), 1);
    }
}

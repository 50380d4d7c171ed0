//! The sync engine: one instance per open canvas per session.
//!
//! Owns the capture scheduler, the push and poll loops, conflict routing,
//! and the bootstrap sequence. The only mutating entry points outside the
//! loops are [`SyncEngine::force_sync`], [`SyncEngine::undo`], and
//! [`SyncEngine::redo`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use easel_core::merge::MergeOutcome;
use easel_core::{merge_states, CanvasState, Transaction};
use easel_store::LocalStore;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::CanvasBackend;
use crate::capture::{CaptureCore, CaptureOutcome, LocalScheduler};
use crate::events::{EventSink, SyncEvent, SyncEventHandler};
use crate::failure::{FailureMonitor, LogRecovery, RecoveryHandler};
use crate::poll::{PollClient, PollOutcome};
use crate::push::{PushClient, PushOutcome};
use crate::resolve::{arbitrate, ConflictResolver, PreferRemote};
use crate::session::CanvasSession;
use crate::surface::GraphPort;
use crate::versioning::VersionManager;
use crate::SyncConfig;

/// Snapshot of the engine's health for status surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStats {
    pub version: String,
    pub total_transactions: usize,
    pub pending_transactions: usize,
    pub consecutive_failures: u32,
    pub initialized: bool,
    pub updated_at: Option<DateTime<Utc>>,
    /// Most recent server acknowledgement in the current log.
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// Bridges threshold escalation into the event stream before the host's
/// handler runs.
struct EscalationBridge {
    inner: Arc<dyn RecoveryHandler>,
    events: EventSink,
}

impl RecoveryHandler for EscalationBridge {
    fn on_repeated_failures(&self, consecutive: u32) {
        self.events.emit(SyncEvent::RecoveryRecommended {
            consecutive_failures: consecutive,
        });
        self.inner.on_repeated_failures(consecutive);
    }
}

pub struct SyncEngine {
    session: Arc<CanvasSession>,
    store: LocalStore,
    backend: Arc<dyn CanvasBackend>,
    surface: Arc<dyn GraphPort>,
    config: SyncConfig,
    resolver: Arc<dyn ConflictResolver>,
    failures: Arc<FailureMonitor>,
    scheduler: LocalScheduler,
    push: Arc<PushClient>,
    poll: Arc<PollClient>,
    events: EventSink,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncEngine {
    /// Engine with the headless defaults: remote-preferring conflict
    /// resolution and log-only recovery escalation.
    pub fn new(
        canvas_id: &str,
        backend: Arc<dyn CanvasBackend>,
        store: LocalStore,
        surface: Arc<dyn GraphPort>,
        config: SyncConfig,
    ) -> Self {
        Self::with_parts(
            canvas_id,
            backend,
            store,
            surface,
            config,
            Arc::new(PreferRemote),
            Arc::new(LogRecovery),
        )
    }

    pub fn with_parts(
        canvas_id: &str,
        backend: Arc<dyn CanvasBackend>,
        store: LocalStore,
        surface: Arc<dyn GraphPort>,
        config: SyncConfig,
        resolver: Arc<dyn ConflictResolver>,
        recovery: Arc<dyn RecoveryHandler>,
    ) -> Self {
        let session = Arc::new(CanvasSession::new(canvas_id));
        let events = EventSink::new();
        let failures = Arc::new(FailureMonitor::new(
            config.failure_threshold,
            Arc::new(EscalationBridge {
                inner: recovery,
                events: events.clone(),
            }),
        ));
        let versions = Arc::new(VersionManager {
            backend: backend.clone(),
            store: store.clone(),
            session: session.clone(),
            surface: surface.clone(),
            resolver: resolver.clone(),
            events: events.clone(),
        });
        let push = Arc::new(PushClient::new(
            backend.clone(),
            store.clone(),
            session.clone(),
            config.clone(),
            failures.clone(),
            versions,
            events.clone(),
        ));
        let poll = Arc::new(PollClient::new(
            backend.clone(),
            store.clone(),
            session.clone(),
            surface.clone(),
            config.clone(),
            failures.clone(),
            push.clone(),
            events.clone(),
        ));
        let scheduler = LocalScheduler::new(CaptureCore {
            session: session.clone(),
            store: store.clone(),
            surface: surface.clone(),
            config: config.clone(),
            events: events.clone(),
        });

        Self {
            session,
            store,
            backend,
            surface,
            config,
            resolver,
            failures,
            scheduler,
            push,
            poll,
            events,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn session(&self) -> &Arc<CanvasSession> {
        &self.session
    }

    /// Register an observer for sync lifecycle events.
    pub fn on_event(&self, handler: SyncEventHandler) {
        self.events.subscribe(handler);
    }

    // ========================================================================
    // Bootstrap & lifecycle
    // ========================================================================

    /// Initial fetch, run once per canvas open.
    ///
    /// A cached record rehydrates the surface immediately while the remote
    /// fetch proceeds; a failed fetch leaves the canvas usable local-only
    /// (degraded, still un-synced) rather than blocking the open.
    pub async fn bootstrap(&self) -> anyhow::Result<()> {
        if !self.session.begin_bootstrap() {
            debug!(canvas = self.session.canvas_id(), "bootstrap already ran");
            return Ok(());
        }
        let canvas_id = self.session.canvas_id();

        let mut local = self.store.load(canvas_id)?;
        if let Some(cached) = &local {
            // Fast path: show the cached canvas while the fetch runs.
            self.surface.set_graph(cached.materialize());
        }

        let remote = match self.backend.fetch_state(canvas_id).await {
            Ok(remote) => remote,
            Err(e) => {
                warn!(
                    canvas = canvas_id,
                    error = %e,
                    "bootstrap fetch failed; opening local-only"
                );
                self.failures.record_failure();
                let state = local.unwrap_or_else(|| CanvasState::new(""));
                self.store.save(canvas_id, &state)?;
                self.surface.set_graph(state.materialize());
                self.session.mark_initialized();
                self.events.emit(SyncEvent::BootstrapCompleted {
                    version: state.version.clone(),
                    transactions: state.transactions.len(),
                    degraded: true,
                });
                return Ok(());
            }
        };

        // Same version but the server is missing some of our unrevoked
        // transactions: a previous push never landed. Repair before merging.
        let repair = match &local {
            Some(cached) if cached.version == remote.version => {
                let remote_ids = remote.known_tx_ids();
                let missing: Vec<Transaction> = cached
                    .transactions
                    .iter()
                    .filter(|t| !t.revoked && !remote_ids.contains(&t.tx_id))
                    .cloned()
                    .collect();
                if missing.is_empty() {
                    None
                } else {
                    Some((cached.version.clone(), missing))
                }
            }
            _ => None,
        };
        if let Some((version, missing)) = repair {
            info!(
                canvas = canvas_id,
                count = missing.len(),
                "bootstrap re-pushing transactions the server is missing"
            );
            match self
                .backend
                .sync_transactions(canvas_id, &version, &missing)
                .await
            {
                Ok(ack) if ack.success => {
                    if let Some(mut current) = self.store.load(canvas_id)? {
                        current.stamp_synced(&ack.transactions);
                        self.store.save(canvas_id, &current)?;
                        local = Some(current);
                    }
                }
                Ok(_) => {
                    warn!(canvas = canvas_id, "bootstrap repair push rejected");
                    self.failures.record_failure();
                }
                Err(e) => {
                    warn!(canvas = canvas_id, error = %e, "bootstrap repair push failed");
                    self.failures.record_failure();
                }
            }
        }

        let merged = match &local {
            None => remote,
            Some(cached) => match merge_states(cached, &remote) {
                MergeOutcome::Merged(merged) => merged,
                MergeOutcome::Conflict(conflict) => {
                    arbitrate(
                        self.resolver.as_ref(),
                        &self.backend,
                        canvas_id,
                        conflict,
                        "bootstrap",
                        &self.events,
                    )
                    .await
                }
            },
        };

        self.store.save(canvas_id, &merged)?;
        self.surface.set_graph(merged.materialize());
        self.session.mark_initialized();
        self.failures.record_success();
        info!(
            canvas = canvas_id,
            version = %merged.version,
            transactions = merged.transactions.len(),
            "canvas initialized"
        );
        self.events.emit(SyncEvent::BootstrapCompleted {
            version: merged.version.clone(),
            transactions: merged.transactions.len(),
            degraded: false,
        });
        Ok(())
    }

    /// Spawn the push and poll interval loops. Idempotent while running.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            return;
        }

        let push = self.push.clone();
        let push_interval = self.config.push_interval;
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(push_interval);
            loop {
                ticker.tick().await;
                push.push_once().await;
            }
        }));

        let poll = self.poll.clone();
        let poll_interval = self.config.poll_interval;
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            loop {
                ticker.tick().await;
                poll.poll_once().await;
            }
        }));
    }

    /// Bootstrap, then start the loops.
    pub async fn open(&self) -> anyhow::Result<()> {
        self.bootstrap().await?;
        self.start();
        Ok(())
    }

    /// Flush any pending capture, stop the loops, clear the session gate.
    pub async fn teardown(&self) {
        if let Err(e) = self.scheduler.flush().await {
            warn!(canvas = self.session.canvas_id(), error = %e, "teardown flush failed");
        }
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.session.clear_initialized();
    }

    // ========================================================================
    // Entry points
    // ========================================================================

    /// Coalescing capture trigger: call on every surface edit.
    pub fn notify_change(&self) {
        self.scheduler.trigger();
    }

    /// Awaitable ordered capture (FIFO with other immediate captures).
    pub async fn capture_now(&self) -> anyhow::Result<CaptureOutcome> {
        self.scheduler.capture_now().await
    }

    /// Capture whatever the surface holds, then push immediately.
    pub async fn force_sync(&self) -> anyhow::Result<PushOutcome> {
        self.scheduler.capture_now().await?;
        Ok(self.push.push_once().await)
    }

    /// One on-demand push cycle (the loop body).
    pub async fn push_once(&self) -> PushOutcome {
        self.push.push_once().await
    }

    /// One on-demand poll cycle (the loop body).
    pub async fn poll_once(&self) -> PollOutcome {
        self.poll.poll_once().await
    }

    /// Revoke the most recent live transaction and rehydrate.
    pub fn undo(&self) -> anyhow::Result<bool> {
        let canvas_id = self.session.canvas_id();
        let Some(mut state) = self.store.load(canvas_id)? else {
            return Ok(false);
        };
        let Some(tx_id) = state.undo() else {
            return Ok(false);
        };
        self.store.save(canvas_id, &state)?;
        self.surface.set_graph(state.materialize());
        debug!(canvas = canvas_id, %tx_id, "transaction revoked");
        Ok(true)
    }

    /// Restore the earliest revoked transaction and rehydrate.
    pub fn redo(&self) -> anyhow::Result<bool> {
        let canvas_id = self.session.canvas_id();
        let Some(mut state) = self.store.load(canvas_id)? else {
            return Ok(false);
        };
        let Some(tx_id) = state.redo() else {
            return Ok(false);
        };
        self.store.save(canvas_id, &state)?;
        self.surface.set_graph(state.materialize());
        debug!(canvas = canvas_id, %tx_id, "transaction restored");
        Ok(true)
    }

    pub fn stats(&self) -> anyhow::Result<SyncStats> {
        let state = self.store.load(self.session.canvas_id())?;
        Ok(SyncStats {
            version: state.as_ref().map(|s| s.version.clone()).unwrap_or_default(),
            total_transactions: state.as_ref().map(|s| s.transactions.len()).unwrap_or(0),
            pending_transactions: state
                .as_ref()
                .map(|s| s.pending_transactions().len())
                .unwrap_or(0),
            consecutive_failures: self.failures.consecutive(),
            initialized: self.session.is_initialized(),
            updated_at: state.as_ref().map(|s| s.updated_at),
            last_synced_at: state
                .as_ref()
                .and_then(|s| s.transactions.iter().filter_map(|t| t.synced_at).max()),
        })
    }
}

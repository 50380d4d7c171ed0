//! The remote poll loop body.
//!
//! Pulls recent transactions from the other sessions on its own tick,
//! dedups them by id into the local log, and rehydrates the surface. Every
//! Nth successful poll widens the window to the epoch and repairs drift:
//! anything we hold that the server somehow lost gets pushed again.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use easel_store::LocalStore;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::backend::CanvasBackend;
use crate::events::{EventSink, SyncEvent};
use crate::failure::FailureMonitor;
use crate::push::PushClient;
use crate::session::CanvasSession;
use crate::surface::GraphPort;
use crate::SyncConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Another poll was in flight.
    Skipped,
    /// No local record yet, or the session is not initialized.
    NotReady,
    Merged {
        new_transactions: usize,
    },
    /// This was a reconciliation tick; drift was repaired by re-pushing.
    Reconciled {
        repushed: usize,
    },
    Failed,
}

pub struct PollClient {
    pub(crate) backend: Arc<dyn CanvasBackend>,
    pub(crate) store: LocalStore,
    pub(crate) session: Arc<CanvasSession>,
    pub(crate) surface: Arc<dyn GraphPort>,
    pub(crate) config: SyncConfig,
    pub(crate) failures: Arc<FailureMonitor>,
    pub(crate) push: Arc<PushClient>,
    pub(crate) events: EventSink,
    in_flight: AtomicBool,
    successes: AtomicU32,
}

impl PollClient {
    pub(crate) fn new(
        backend: Arc<dyn CanvasBackend>,
        store: LocalStore,
        session: Arc<CanvasSession>,
        surface: Arc<dyn GraphPort>,
        config: SyncConfig,
        failures: Arc<FailureMonitor>,
        push: Arc<PushClient>,
        events: EventSink,
    ) -> Self {
        Self {
            backend,
            store,
            session,
            surface,
            config,
            failures,
            push,
            events,
            in_flight: AtomicBool::new(false),
            successes: AtomicU32::new(0),
        }
    }

    /// One poll cycle.
    pub async fn poll_once(&self) -> PollOutcome {
        if !self.session.is_initialized() {
            return PollOutcome::NotReady;
        }
        if self.in_flight.swap(true, Ordering::SeqCst) {
            debug!("poll already in flight; skipping tick");
            return PollOutcome::Skipped;
        }
        let result = self.run().await;
        self.in_flight.store(false, Ordering::SeqCst);

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(canvas = self.session.canvas_id(), error = %e, "poll cycle failed");
                self.failures.record_failure();
                PollOutcome::Failed
            }
        }
    }

    async fn run(&self) -> anyhow::Result<PollOutcome> {
        let canvas_id = self.session.canvas_id();
        let Some(state) = self.store.load(canvas_id)? else {
            return Ok(PollOutcome::NotReady);
        };

        let lookback = chrono::Duration::seconds(self.config.poll_lookback.as_secs() as i64);
        let since = Utc::now() - lookback;
        let incoming = self
            .backend
            .transactions_since(canvas_id, &state.version, since)
            .await?;
        self.failures.record_success();

        let merged = self.merge_in(canvas_id, incoming)?;
        if merged > 0 {
            self.events
                .emit(SyncEvent::TransactionsMerged { count: merged });
        }

        let successes = self.successes.fetch_add(1, Ordering::SeqCst) + 1;
        if successes % self.config.reconcile_every == 0 {
            if let Some(repushed) = self.reconcile(canvas_id).await? {
                return Ok(PollOutcome::Reconciled { repushed });
            }
        }

        Ok(PollOutcome::Merged {
            new_transactions: merged,
        })
    }

    /// Dedup `incoming` into the log, restore order, persist, rehydrate.
    fn merge_in(
        &self,
        canvas_id: &str,
        incoming: Vec<easel_core::Transaction>,
    ) -> anyhow::Result<usize> {
        // Re-read right before merging: captures and pushes interleave with
        // the request that produced `incoming`.
        let Some(mut current) = self.store.load(canvas_id)? else {
            return Ok(0);
        };
        let merged = current.merge_transactions(incoming);
        if merged > 0 {
            current.touch();
            self.store.save(canvas_id, &current)?;
            self.surface.set_graph(current.materialize());
            debug!(canvas = canvas_id, merged, "merged remote transactions");
        }
        Ok(merged)
    }

    /// Full-window reconciliation: query since the epoch and re-push any
    /// unrevoked local transaction the result does not contain.
    async fn reconcile(&self, canvas_id: &str) -> anyhow::Result<Option<usize>> {
        let Some(state) = self.store.load(canvas_id)? else {
            return Ok(None);
        };
        let full = self
            .backend
            .transactions_since(canvas_id, &state.version, DateTime::UNIX_EPOCH)
            .await?;

        let remote_ids: HashSet<Uuid> = full.iter().map(|t| t.tx_id).collect();
        let missing: HashSet<Uuid> = state
            .transactions
            .iter()
            .filter(|t| !t.revoked && !remote_ids.contains(&t.tx_id))
            .map(|t| t.tx_id)
            .collect();
        if missing.is_empty() {
            return Ok(None);
        }

        warn!(
            canvas = canvas_id,
            missing = missing.len(),
            "server is missing local transactions; re-pushing"
        );
        self.push.push_subset(&missing).await;
        self.events.emit(SyncEvent::DriftRepaired {
            count: missing.len(),
        });
        Ok(Some(missing.len()))
    }
}

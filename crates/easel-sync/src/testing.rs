//! Deterministic in-memory backend for the test suites.
//!
//! Models the server contract closely enough for scenario tests: per-canvas
//! authoritative state, dedup by `tx_id`, server-assigned `synced_at` stamps
//! and versions, plus scriptable transport failures and version conflicts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use anyhow::bail;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use easel_core::{CanvasState, Transaction, VersionConflict};
use parking_lot::Mutex;

use crate::backend::{CanvasBackend, SyncAck, VersionOutcome};

pub struct MemoryBackend {
    canvases: Mutex<HashMap<String, CanvasState>>,
    fail_next: AtomicU32,
    conflict_next_version: AtomicBool,
    next_version: AtomicU64,
    sync_calls: AtomicU32,
    version_calls: AtomicU32,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self {
            canvases: Mutex::new(HashMap::new()),
            fail_next: AtomicU32::new(0),
            conflict_next_version: AtomicBool::new(false),
            next_version: AtomicU64::new(2),
            sync_calls: AtomicU32::new(0),
            version_calls: AtomicU32::new(0),
        }
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install an authoritative state for a canvas.
    pub fn seed(&self, canvas_id: &str, state: CanvasState) {
        self.canvases.lock().insert(canvas_id.to_string(), state);
    }

    /// Current authoritative state, if the canvas has been touched.
    pub fn state_of(&self, canvas_id: &str) -> Option<CanvasState> {
        self.canvases.lock().get(canvas_id).cloned()
    }

    /// Fail the next `n` calls (any operation) with a transport error.
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Answer the next `create_version` with a conflict.
    pub fn conflict_on_next_version(&self) {
        self.conflict_next_version.store(true, Ordering::SeqCst);
    }

    pub fn sync_calls(&self) -> u32 {
        self.sync_calls.load(Ordering::SeqCst)
    }

    pub fn version_calls(&self) -> u32 {
        self.version_calls.load(Ordering::SeqCst)
    }

    fn check_failure(&self) -> anyhow::Result<()> {
        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next.store(remaining - 1, Ordering::SeqCst);
            bail!("injected transport failure");
        }
        Ok(())
    }
}

#[async_trait]
impl CanvasBackend for MemoryBackend {
    async fn fetch_state(&self, canvas_id: &str) -> anyhow::Result<CanvasState> {
        self.check_failure()?;
        let mut canvases = self.canvases.lock();
        let state = canvases
            .entry(canvas_id.to_string())
            .or_insert_with(|| CanvasState::new("v1"));
        Ok(state.clone())
    }

    async fn put_state(&self, canvas_id: &str, state: &CanvasState) -> anyhow::Result<()> {
        self.check_failure()?;
        self.canvases
            .lock()
            .insert(canvas_id.to_string(), state.clone());
        Ok(())
    }

    async fn sync_transactions(
        &self,
        canvas_id: &str,
        version: &str,
        transactions: &[Transaction],
    ) -> anyhow::Result<SyncAck> {
        self.check_failure()?;
        self.sync_calls.fetch_add(1, Ordering::SeqCst);

        let mut canvases = self.canvases.lock();
        let state = canvases
            .entry(canvas_id.to_string())
            .or_insert_with(|| CanvasState::new("v1"));
        if state.version != version {
            return Ok(SyncAck {
                success: false,
                transactions: Vec::new(),
            });
        }

        let base = Utc::now();
        let mut stamped = Vec::with_capacity(transactions.len());
        for (i, tx) in transactions.iter().enumerate() {
            let mut tx = tx.clone();
            // Distinct stamps even within one batch.
            tx.synced_at = Some(base + chrono::Duration::microseconds(i as i64));
            match state
                .transactions
                .iter_mut()
                .find(|existing| existing.tx_id == tx.tx_id)
            {
                Some(existing) => *existing = tx.clone(),
                None => state.transactions.push(tx.clone()),
            }
            stamped.push(tx);
        }
        state.sort_log();
        state.touch();

        Ok(SyncAck {
            success: true,
            transactions: stamped,
        })
    }

    async fn transactions_since(
        &self,
        canvas_id: &str,
        version: &str,
        since: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Transaction>> {
        self.check_failure()?;
        let canvases = self.canvases.lock();
        let Some(state) = canvases.get(canvas_id) else {
            return Ok(Vec::new());
        };
        if state.version != version {
            return Ok(Vec::new());
        }
        Ok(state
            .transactions
            .iter()
            .filter(|t| t.created_at >= since)
            .cloned()
            .collect())
    }

    async fn create_version(
        &self,
        canvas_id: &str,
        state: &CanvasState,
    ) -> anyhow::Result<VersionOutcome> {
        self.check_failure()?;
        self.version_calls.fetch_add(1, Ordering::SeqCst);

        let mut canvases = self.canvases.lock();
        if self.conflict_next_version.swap(false, Ordering::SeqCst) {
            let remote = canvases
                .get(canvas_id)
                .cloned()
                .unwrap_or_else(|| CanvasState::new("v1"));
            return Ok(VersionOutcome::Conflict(VersionConflict {
                local: state.clone(),
                remote,
            }));
        }

        let mut adopted = state.clone();
        adopted.version = format!("v{}", self.next_version.fetch_add(1, Ordering::SeqCst));
        adopted.transactions.clear();
        adopted.touch();
        canvases.insert(canvas_id.to_string(), adopted.clone());
        Ok(VersionOutcome::Created(adopted))
    }
}

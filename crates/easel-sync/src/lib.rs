//! Easel sync: keeps a locally-edited canvas converging with the remote
//! authority without ever losing a captured edit.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                        CANVAS SYNC PIPELINE                          │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │                                                                      │
//! │  editing surface ──GraphPort──► LocalScheduler ──capture──┐          │
//! │                                 (debounce / FIFO)         ▼          │
//! │                                                      LocalStore      │
//! │        ┌───────────────── rehydrate ◄────────────────┤  (record)     │
//! │        │                                             │               │
//! │        │      PushClient ──every 2s── pending txs ──►│               │
//! │        │          │ backlog > threshold               │              │
//! │        │          ▼                                   │              │
//! │        │    VersionManager ──collapse──► CanvasBackend (server)      │
//! │        │          │ conflict                          ▲              │
//! │        │          ▼                                   │              │
//! │        │    ConflictResolver                          │              │
//! │        │                                              │              │
//! │        └───── PollClient ──every 3s── new remote txs ─┘              │
//! │                  (every 5th poll: full reconciliation)               │
//! │                                                                      │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The loops run as independent tokio tasks; each guards itself with a
//! single-flight flag and nothing acts before the session's bootstrap marks
//! the canvas initialized. The persisted record is the only shared mutable
//! resource: every read-modify-write re-reads immediately before merging and
//! writes straight back, and log merges dedup by transaction id, so
//! interleavings and replays are harmless.

pub mod backend;
pub mod capture;
pub mod engine;
pub mod events;
pub mod failure;
pub mod poll;
pub mod push;
pub mod resolve;
pub mod session;
pub mod surface;
pub mod testing;
pub mod versioning;

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use backend::{CanvasBackend, SyncAck, VersionOutcome};
pub use capture::CaptureOutcome;
pub use engine::{SyncEngine, SyncStats};
pub use events::{SyncEvent, SyncEventHandler};
pub use failure::{FailureMonitor, RecoveryHandler};
pub use poll::PollOutcome;
pub use push::PushOutcome;
pub use resolve::{ConflictChoice, ConflictPrompt, ConflictResolver, PreferRemote, PromptResolver};
pub use session::CanvasSession;
pub use surface::{GraphPort, SharedGraph};

/// Tunables for the capture/push/poll loops.
///
/// The defaults mirror production cadence; tests shrink them to keep runs
/// fast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Quiescence window for coalesced captures.
    pub debounce_window: Duration,
    /// How long after initialization captures stay muted, so bootstrap churn
    /// is never recorded as an edit.
    pub warmup: Duration,
    /// Cadence of the remote push loop.
    pub push_interval: Duration,
    /// Cadence of the remote poll loop.
    pub poll_interval: Duration,
    /// How far back incremental polls look.
    pub poll_lookback: Duration,
    /// Every Nth successful poll runs a full reconciliation.
    pub reconcile_every: u32,
    /// Transaction-log length beyond which the push loop collapses the log
    /// into a new baseline version instead of pushing.
    pub collapse_threshold: usize,
    /// Consecutive sync failures tolerated before recovery escalates.
    pub failure_threshold: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_window: Duration::from_millis(200),
            warmup: Duration::from_millis(300),
            push_interval: Duration::from_secs(2),
            poll_interval: Duration::from_secs(3),
            poll_lookback: Duration::from_secs(60),
            reconcile_every: 5,
            collapse_threshold: 50,
            failure_threshold: 5,
        }
    }
}

//! Per-canvas session lifecycle.
//!
//! The initialized flag is an explicit field here rather than ambient
//! process-wide state: every scheduler gate reads it through the session
//! object it was constructed with, which keeps isolated tests honest.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Identity and lifecycle flags for one open canvas in one session.
///
/// Two sessions editing the same canvas run fully independent engines (and
/// sessions) against the shared remote.
#[derive(Debug)]
pub struct CanvasSession {
    canvas_id: String,
    initialized_at: Mutex<Option<Instant>>,
    bootstrap_started: AtomicBool,
}

impl CanvasSession {
    pub fn new(canvas_id: impl Into<String>) -> Self {
        Self {
            canvas_id: canvas_id.into(),
            initialized_at: Mutex::new(None),
            bootstrap_started: AtomicBool::new(false),
        }
    }

    pub fn canvas_id(&self) -> &str {
        &self.canvas_id
    }

    /// Claim the one bootstrap slot for this open. Returns false when a
    /// bootstrap already ran (or is running).
    pub(crate) fn begin_bootstrap(&self) -> bool {
        !self.bootstrap_started.swap(true, Ordering::SeqCst)
    }

    /// Set on bootstrap completion; gates capture, push, and poll.
    pub fn mark_initialized(&self) {
        *self.initialized_at.lock() = Some(Instant::now());
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized_at.lock().is_some()
    }

    /// Initialized, and past the warm-up mute during which bootstrap churn
    /// must not be captured as an edit.
    pub fn warmed_up(&self, warmup: Duration) -> bool {
        self.initialized_at
            .lock()
            .map(|at| at.elapsed() >= warmup)
            .unwrap_or(false)
    }

    /// Teardown: clears the gate and re-arms bootstrap for the next open.
    pub fn clear_initialized(&self) {
        *self.initialized_at.lock() = None;
        self.bootstrap_started.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_slot_claimed_once() {
        let session = CanvasSession::new("c1");
        assert!(session.begin_bootstrap());
        assert!(!session.begin_bootstrap());

        session.clear_initialized();
        assert!(session.begin_bootstrap());
    }

    #[test]
    fn warmup_gate() {
        let session = CanvasSession::new("c1");
        assert!(!session.warmed_up(Duration::ZERO));

        session.mark_initialized();
        assert!(session.warmed_up(Duration::ZERO));
        assert!(!session.warmed_up(Duration::from_secs(60)));
    }
}

//! Consecutive-failure accounting and bounded escalation.
//!
//! Loop-boundary errors never escape to callers; they land here as counter
//! ticks. Crossing the threshold fires the recovery handler exactly once,
//! latched until a success resets the run.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use tracing::{debug, error};

/// Invoked once per failure run when the threshold is crossed. The UI's
/// implementation raises the blocking "reload recommended" prompt.
pub trait RecoveryHandler: Send + Sync {
    fn on_repeated_failures(&self, consecutive: u32);
}

/// Default handler: log loudly and keep running.
pub struct LogRecovery;

impl RecoveryHandler for LogRecovery {
    fn on_repeated_failures(&self, consecutive: u32) {
        error!(
            consecutive,
            "canvas sync keeps failing; recommend reloading the canvas"
        );
    }
}

/// Shared counter of consecutive sync failures across push, poll, and
/// bootstrap.
pub struct FailureMonitor {
    threshold: u32,
    consecutive: AtomicU32,
    escalated: AtomicBool,
    handler: Arc<dyn RecoveryHandler>,
}

impl FailureMonitor {
    pub fn new(threshold: u32, handler: Arc<dyn RecoveryHandler>) -> Self {
        Self {
            threshold,
            consecutive: AtomicU32::new(0),
            escalated: AtomicBool::new(false),
            handler,
        }
    }

    /// One more failed cycle. Escalates (once) past the threshold.
    pub fn record_failure(&self) {
        let consecutive = self.consecutive.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(consecutive, "sync cycle failed");
        if consecutive > self.threshold && !self.escalated.swap(true, Ordering::SeqCst) {
            self.handler.on_repeated_failures(consecutive);
        }
    }

    /// A successful cycle ends the failure run and re-arms escalation.
    pub fn record_success(&self) {
        self.consecutive.store(0, Ordering::SeqCst);
        self.escalated.store(false, Ordering::SeqCst);
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingHandler(AtomicUsize);

    impl RecoveryHandler for CountingHandler {
        fn on_repeated_failures(&self, _consecutive: u32) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn escalates_exactly_once_past_threshold() {
        let handler = Arc::new(CountingHandler(AtomicUsize::new(0)));
        let monitor = FailureMonitor::new(5, handler.clone());

        for _ in 0..6 {
            monitor.record_failure();
        }
        assert_eq!(handler.0.load(Ordering::SeqCst), 1);

        // Further failures stay silent.
        monitor.record_failure();
        monitor.record_failure();
        assert_eq!(handler.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn below_threshold_is_silent() {
        let handler = Arc::new(CountingHandler(AtomicUsize::new(0)));
        let monitor = FailureMonitor::new(5, handler.clone());

        for _ in 0..5 {
            monitor.record_failure();
        }
        assert_eq!(handler.0.load(Ordering::SeqCst), 0);
        assert_eq!(monitor.consecutive(), 5);
    }

    #[test]
    fn success_resets_and_rearms() {
        let handler = Arc::new(CountingHandler(AtomicUsize::new(0)));
        let monitor = FailureMonitor::new(2, handler.clone());

        for _ in 0..3 {
            monitor.record_failure();
        }
        monitor.record_success();
        assert_eq!(monitor.consecutive(), 0);

        for _ in 0..3 {
            monitor.record_failure();
        }
        assert_eq!(handler.0.load(Ordering::SeqCst), 2);
    }
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Stop flags shared between a worker and whoever supervises it.
///
/// Checked only between protocol attempts, never in the middle of a store call.
#[derive(Debug, Clone, Default)]
pub struct WorkerControl {
    terminated: Arc<AtomicBool>,
    interrupted: Arc<AtomicBool>,
}

impl WorkerControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the worker to finish; the in-flight operation is abandoned.
    pub fn terminate(&self) {
        self.terminated.store(true, Ordering::Release);
    }

    /// Interrupt the worker, e.g. on harness shutdown.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Release);
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }

    pub fn should_stop(&self) -> bool {
        self.is_terminated() || self.is_interrupted()
    }
}

//! Cooperative cancellation flag handed to every blocking worker.
//!
//! Workers poll [`CancelFlag::is_cancelled`] at their natural unblocking
//! points (once per network chunk, once per recognizer block, once per
//! playback slice).  Nothing is ever interrupted preemptively.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Granularity of [`CancelFlag::sleep`].
const SLEEP_SLICE: Duration = Duration::from_millis(10);

/// Shared boolean cancellation request.
///
/// A flag created with [`CancelFlag::child`] is also considered cancelled
/// when its parent is, which lets a helper thread be stopped on its own
/// without losing sight of the enclosing task's cancellation.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    own: Arc<AtomicBool>,
    parent: Option<Arc<AtomicBool>>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new flag that reports cancelled when either it or `self` is.
    pub fn child(&self) -> Self {
        Self {
            own: Arc::new(AtomicBool::new(false)),
            parent: Some(Arc::clone(&self.own)),
        }
    }

    pub fn cancel(&self) {
        self.own.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.own.load(Ordering::SeqCst)
            || self
                .parent
                .as_ref()
                .is_some_and(|p| p.load(Ordering::SeqCst))
    }

    /// Sleep for `duration`, waking early on cancellation.
    ///
    /// Returns `true` when the sleep was cut short by a cancel request.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}

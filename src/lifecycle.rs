//! Process-wide cooperative shutdown.
//!
//! [`Shutdown`] is the wake signal every long-running loop watches: the edge
//! watcher checks it between bounded edge waits, the state machine and the
//! task runner check it on every poll.  Raising it is idempotent.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};

/// Cloneable shutdown token.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    raised: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every loop holding a clone of this token to exit.
    pub fn raise(&self) {
        if !self.raised.swap(true, Ordering::SeqCst) {
            log::info!("shutdown raised");
        }
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }
}

/// Wait for SIGINT or SIGTERM, then raise `shutdown`.
///
/// Returns early (without raising) if the signal handlers cannot be
/// registered; the process can still be stopped by a hardware fault.
pub async fn listen_for_signals(shutdown: Shutdown) {
    let (mut sigterm, mut sigint) =
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(term), Ok(int)) => (term, int),
            (Err(e), _) | (_, Err(e)) => {
                log::error!("failed to register signal handlers: {e}");
                return;
            }
        };

    tokio::select! {
        _ = sigterm.recv() => log::debug!("received SIGTERM"),
        _ = sigint.recv() => log::debug!("received SIGINT"),
    }

    shutdown.raise();
}

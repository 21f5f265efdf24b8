//! Dedicated OS-thread edge watcher.
//!
//! The watcher blocks on the edge source in bounded waits and appends every
//! event to the [`EventMailbox`].  Between waits it checks the shared
//! [`Shutdown`] token, which is its only clean exit path, so it leaves
//! within one wait interval of shutdown being raised.
//!
//! Read errors are retried; a run of [`MAX_CONSECUTIVE_FAILURES`] failures,
//! or any non-transient error, means the line handle is gone.  That is a
//! [`Fault::Hardware`]: the watcher raises shutdown for the whole process
//! and returns the fault through [`EdgeWatcher::join`].

use std::thread::JoinHandle;
use std::time::Duration;

use crate::error::Fault;
use crate::lifecycle::Shutdown;

use super::mailbox::EventMailbox;
use super::source::EdgeSource;

/// Consecutive read failures tolerated before the source is considered lost.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 5;

/// Handle to the running watcher thread.
pub struct EdgeWatcher {
    thread: JoinHandle<Result<(), Fault>>,
}

impl EdgeWatcher {
    /// Spawn the watcher thread.
    ///
    /// * `wait`: upper bound on each blocking edge wait; also the shutdown
    ///   latency.
    pub fn spawn<S>(
        source: S,
        mailbox: EventMailbox,
        shutdown: Shutdown,
        wait: Duration,
    ) -> std::io::Result<Self>
    where
        S: EdgeSource + 'static,
    {
        let thread = std::thread::Builder::new()
            .name("edge-watcher".into())
            .spawn(move || {
                log::info!("edge watcher started");
                let result = watch(source, &mailbox, &shutdown, wait);
                log::info!("edge watcher stopped");
                result
            })?;

        Ok(Self { thread })
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the watcher to exit and return its fault, if any.
    pub fn join(self) -> Result<(), Fault> {
        match self.thread.join() {
            Ok(result) => result,
            Err(_) => Err(Fault::Hardware("edge watcher thread panicked".into())),
        }
    }
}

fn watch<S: EdgeSource>(
    mut source: S,
    mailbox: &EventMailbox,
    shutdown: &Shutdown,
    wait: Duration,
) -> Result<(), Fault> {
    let mut failures = 0u32;

    while !shutdown.is_raised() {
        match source.wait_edges(wait) {
            Ok(events) => {
                failures = 0;
                for event in events {
                    log::debug!("edge: {event}");
                    mailbox.append(event);
                }
            }
            Err(e) if e.is_transient() && failures + 1 < MAX_CONSECUTIVE_FAILURES => {
                failures += 1;
                log::warn!("edge read failed ({failures}/{MAX_CONSECUTIVE_FAILURES}): {e}");
                std::thread::sleep(wait);
            }
            Err(e) => {
                log::error!("edge source lost: {e}");
                shutdown.raise();
                return Err(e.into());
            }
        }
    }

    Ok(())
}

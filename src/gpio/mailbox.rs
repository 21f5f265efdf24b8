//! Ordered event mailbox between the edge watcher and the state machine.
//!
//! The watcher thread is the only writer ([`EventMailbox::append`]); the
//! state machine and its task runner are the only readers and the only ones
//! allowed to clear.  A mutex guards the deque so an inspection and the
//! clear that follows it happen as one step: an event looked at by one
//! transition can never be counted again by the next.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::event::{ButtonEvent, Edge, LineId};

/// FIFO buffer of [`ButtonEvent`]s.  Cheap to clone (`Arc`).
#[derive(Debug, Clone, Default)]
pub struct EventMailbox {
    events: Arc<Mutex<VecDeque<ButtonEvent>>>,
}

impl EventMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<ButtonEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `event` at the back.  Watcher only.
    pub fn append(&self, event: ButtonEvent) {
        self.lock().push_back(event);
    }

    /// Number of pending events on `line` with the given `edge`.
    pub fn count_matching(&self, line: LineId, edge: Edge) -> usize {
        self.lock()
            .iter()
            .filter(|e| e.line == line && e.edge == edge)
            .count()
    }

    /// `true` when a press is pending on any of `lines`.
    pub fn any_press(&self, lines: &[LineId]) -> bool {
        self.lock().iter().any(|e| e.is_press_on(lines))
    }

    /// Take the earliest press on any of `lines` and clear the mailbox in
    /// the same critical section.
    ///
    /// Returns `None` (and leaves the mailbox untouched) when no press is
    /// pending, so a lone release edge stays visible to later inspection
    /// until the next clear.
    pub fn take_first_press(&self, lines: &[LineId]) -> Option<ButtonEvent> {
        let mut events = self.lock();
        let first = events.iter().copied().find(|e| e.is_press_on(lines))?;
        events.clear();
        Some(first)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Copy of the pending events, oldest first.
    pub fn snapshot(&self) -> Vec<ButtonEvent> {
        self.lock().iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

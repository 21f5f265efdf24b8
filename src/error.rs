//! Fault taxonomy shared by every worker.
//!
//! Each subsystem has its own `thiserror` enum; at the worker boundary those
//! are folded into a [`Fault`] so the task runner and the state machine only
//! ever deal with one error type.  User cancellation is *not* a fault; it is
//! reported as [`crate::pipeline::TaskOutcome::Cancelled`].

use thiserror::Error;

/// A failure surfaced by a worker or by the edge watcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    /// The button interrupt source is gone.  Fatal for the process.
    #[error("hardware fault: {0}")]
    Hardware(String),

    /// A file or audio device could not be used.
    #[error("I/O fault: {0}")]
    Io(String),

    /// Connecting to or reading from the inference server failed.
    #[error("network fault: {0}")]
    Network(String),

    /// The speech recognizer failed internally.
    #[error("recognition fault: {0}")]
    Recognition(String),

    /// A worker panicked before producing a result.
    #[error("worker fault: {0}")]
    Worker(String),
}

impl Fault {
    /// Only a lost interrupt source ends the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Fault::Hardware(_))
    }

    /// Short label used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Fault::Hardware(_) => "hardware",
            Fault::Io(_) => "io",
            Fault::Network(_) => "network",
            Fault::Recognition(_) => "recognition",
            Fault::Worker(_) => "worker",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_hardware_is_fatal() {
        assert!(Fault::Hardware("gpiochip gone".into()).is_fatal());
        assert!(!Fault::Io("x".into()).is_fatal());
        assert!(!Fault::Network("x".into()).is_fatal());
        assert!(!Fault::Recognition("x".into()).is_fatal());
        assert!(!Fault::Worker("x".into()).is_fatal());
    }

    #[test]
    fn display_includes_detail() {
        let f = Fault::Network("connection refused".into());
        assert_eq!(f.to_string(), "network fault: connection refused");
        assert_eq!(f.kind(), "network");
    }
}

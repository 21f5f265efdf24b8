//! Cancellable task runner: one blocking worker, watched from the async loop.
//!
//! ```text
//! run(spec, op)
//!   ├─ spawn_blocking(op(cancel))
//!   ├─ every poll: settle window over? press on A/B in mailbox? shutdown?
//!   │     └─ yes → cancel.set → POST remote_cancel → sleep(grace)
//!   ├─ await worker (always; the worker owns devices until it returns)
//!   └─ clear mailbox → Completed | Cancelled | Failed
//! ```
//!
//! `run` takes `&mut self`, so a runner can never have two workers in
//! flight: the next task cannot start until the previous `run` has joined.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::Fault;
use crate::gpio::{EventMailbox, LineId};
use crate::lifecycle::Shutdown;
use crate::remote::CancelNotifier;

use super::cancel::CancelFlag;

// ---------------------------------------------------------------------------
// TaskOutcome / TaskSpec / RunnerTiming
// ---------------------------------------------------------------------------

/// How a task ended.  User cancellation is an outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome<T> {
    Completed(T),
    Cancelled,
    Failed(Fault),
}

impl<T> TaskOutcome<T> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskOutcome::Cancelled)
    }
}

/// Per-task parameters.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    /// Label for log lines.
    pub name: &'static str,
    /// Endpoint to POST when the task is cancelled.
    pub remote_cancel: Option<String>,
}

impl TaskSpec {
    pub fn local(name: &'static str) -> Self {
        Self {
            name,
            remote_cancel: None,
        }
    }

    pub fn remote(name: &'static str, cancel_url: impl Into<String>) -> Self {
        Self {
            name,
            remote_cancel: Some(cancel_url.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerTiming {
    /// Mailbox poll interval.
    pub poll: Duration,
    /// Time the worker gets to notice cancellation before it is joined.
    pub grace: Duration,
    /// Presses arriving this soon after start are discarded.
    pub settle: Duration,
}

impl Default for RunnerTiming {
    fn default() -> Self {
        Self {
            poll: Duration::from_millis(10),
            grace: Duration::from_millis(100),
            settle: Duration::from_millis(1000),
        }
    }
}

// ---------------------------------------------------------------------------
// TaskRunner
// ---------------------------------------------------------------------------

pub struct TaskRunner {
    mailbox: EventMailbox,
    buttons: Vec<LineId>,
    notifier: Arc<dyn CancelNotifier>,
    shutdown: Shutdown,
    timing: RunnerTiming,
}

impl TaskRunner {
    /// * `buttons`: lines whose press cancels a running task.
    pub fn new(
        mailbox: EventMailbox,
        buttons: Vec<LineId>,
        notifier: Arc<dyn CancelNotifier>,
        shutdown: Shutdown,
        timing: RunnerTiming,
    ) -> Self {
        Self {
            mailbox,
            buttons,
            notifier,
            shutdown,
            timing,
        }
    }

    pub fn timing(&self) -> RunnerTiming {
        self.timing
    }

    /// Run `op` on a blocking worker and supervise it until it returns.
    pub async fn run<T, F>(&mut self, spec: TaskSpec, op: F) -> TaskOutcome<T>
    where
        T: Send + 'static,
        F: FnOnce(CancelFlag) -> Result<T, Fault> + Send + 'static,
    {
        let cancel = CancelFlag::new();
        let worker_flag = cancel.clone();
        let handle = tokio::task::spawn_blocking(move || op(worker_flag));
        log::debug!("task '{}' started", spec.name);

        let started = Instant::now();
        let mut settled = self.timing.settle.is_zero();

        while !handle.is_finished() {
            if !settled && started.elapsed() >= self.timing.settle {
                self.mailbox.clear();
                settled = true;
            }

            let pressed = settled && self.mailbox.any_press(&self.buttons);
            if pressed || self.shutdown.is_raised() {
                self.request_cancel(&spec, &cancel).await;
                break;
            }

            tokio::time::sleep(self.timing.poll).await;
        }

        let joined = handle.await;
        self.mailbox.clear();

        match joined {
            Err(e) => {
                log::warn!("task '{}' worker died: {e}", spec.name);
                TaskOutcome::Failed(Fault::Worker(e.to_string()))
            }
            Ok(_) if cancel.is_cancelled() => {
                log::info!("task '{}' cancelled", spec.name);
                TaskOutcome::Cancelled
            }
            Ok(Ok(value)) => {
                log::debug!("task '{}' completed in {:?}", spec.name, started.elapsed());
                TaskOutcome::Completed(value)
            }
            Ok(Err(fault)) => {
                log::warn!("task '{}' failed ({}): {fault}", spec.name, fault.kind());
                TaskOutcome::Failed(fault)
            }
        }
    }

    async fn request_cancel(&self, spec: &TaskSpec, cancel: &CancelFlag) {
        log::info!("cancelling task '{}'", spec.name);
        cancel.cancel();

        if let Some(url) = &spec.remote_cancel {
            match self.notifier.notify(url).await {
                Ok(()) => log::info!("remote cancel sent to {url}"),
                Err(e) => log::warn!("remote cancel to {url} failed: {e}"),
            }
        }

        tokio::time::sleep(self.timing.grace).await;
    }
}

/// Notifier that records calls, for runner and machine tests.
#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::remote::{CancelNotifier, StreamError};

    #[derive(Default)]
    pub struct RecordingNotifier {
        pub urls: Mutex<Vec<String>>,
        pub fail: bool,
    }

    impl RecordingNotifier {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub fn calls(&self) -> Vec<String> {
            self.urls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CancelNotifier for RecordingNotifier {
        async fn notify(&self, url: &str) -> Result<(), StreamError> {
            self.urls.lock().unwrap().push(url.to_string());
            if self.fail {
                Err(StreamError::Request("connection refused".into()))
            } else {
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::testing::RecordingNotifier;
    use super::*;
    use crate::gpio::{ButtonEvent, Edge};

    const A: LineId = 2;
    const B: LineId = 3;
    const CANCEL_URL: &str = "http://server/cancel";

    fn timing(settle_ms: u64) -> RunnerTiming {
        RunnerTiming {
            poll: Duration::from_millis(5),
            grace: Duration::from_millis(20),
            settle: Duration::from_millis(settle_ms),
        }
    }

    fn runner(
        mailbox: &EventMailbox,
        notifier: Arc<RecordingNotifier>,
        shutdown: &Shutdown,
        settle_ms: u64,
    ) -> TaskRunner {
        TaskRunner::new(
            mailbox.clone(),
            vec![A, B],
            notifier,
            shutdown.clone(),
            timing(settle_ms),
        )
    }

    fn press_later(mailbox: &EventMailbox, line: LineId, edge: Edge, after_ms: u64) {
        let mailbox = mailbox.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(after_ms));
            mailbox.append(ButtonEvent::new(line, edge, 1));
        });
    }

    /// Blocks until cancelled (or 5 s), like a stream waiting on the network.
    fn wait_for_cancel(cancel: CancelFlag) -> Result<&'static str, Fault> {
        cancel.sleep(Duration::from_secs(5));
        Ok("finished")
    }

    #[tokio::test]
    async fn completed_task_returns_value() {
        let mailbox = EventMailbox::new();
        let notifier = Arc::new(RecordingNotifier::default());
        let mut r = runner(&mailbox, notifier.clone(), &Shutdown::new(), 0);

        let outcome = r.run(TaskSpec::local("add"), |_| Ok(2 + 2)).await;

        assert_eq!(outcome, TaskOutcome::Completed(4));
        assert!(notifier.calls().is_empty());
    }

    #[tokio::test]
    async fn press_cancels_and_posts_remote_cancel_once() {
        let mailbox = EventMailbox::new();
        let notifier = Arc::new(RecordingNotifier::default());
        let mut r = runner(&mailbox, notifier.clone(), &Shutdown::new(), 0);

        press_later(&mailbox, B, Edge::Falling, 50);
        press_later(&mailbox, A, Edge::Falling, 60);
        let started = std::time::Instant::now();
        let outcome = r
            .run(TaskSpec::remote("describe", CANCEL_URL), wait_for_cancel)
            .await;

        assert_eq!(outcome, TaskOutcome::Cancelled);
        assert_eq!(notifier.calls(), vec![CANCEL_URL.to_string()]);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(mailbox.is_empty());
    }

    #[tokio::test]
    async fn release_edge_does_not_cancel() {
        let mailbox = EventMailbox::new();
        let notifier = Arc::new(RecordingNotifier::default());
        let mut r = runner(&mailbox, notifier.clone(), &Shutdown::new(), 0);

        press_later(&mailbox, A, Edge::Rising, 10);
        let outcome = r
            .run(TaskSpec::local("short"), |c: CancelFlag| {
                c.sleep(Duration::from_millis(80));
                Ok(())
            })
            .await;

        assert_eq!(outcome, TaskOutcome::Completed(()));
    }

    #[tokio::test]
    async fn presses_inside_settle_window_are_discarded() {
        let mailbox = EventMailbox::new();
        mailbox.append(ButtonEvent::new(A, Edge::Falling, 1));
        let notifier = Arc::new(RecordingNotifier::default());
        let mut r = runner(&mailbox, notifier.clone(), &Shutdown::new(), 60);

        press_later(&mailbox, B, Edge::Falling, 20);
        let outcome = r
            .run(TaskSpec::remote("chat", CANCEL_URL), |c: CancelFlag| {
                c.sleep(Duration::from_millis(150));
                Ok(())
            })
            .await;

        assert_eq!(outcome, TaskOutcome::Completed(()));
        assert!(notifier.calls().is_empty());
    }

    #[tokio::test]
    async fn press_after_settle_window_cancels() {
        let mailbox = EventMailbox::new();
        let notifier = Arc::new(RecordingNotifier::default());
        let mut r = runner(&mailbox, notifier.clone(), &Shutdown::new(), 40);

        press_later(&mailbox, A, Edge::Falling, 100);
        let outcome = r.run(TaskSpec::local("listen"), wait_for_cancel).await;

        assert!(outcome.is_cancelled());
    }

    #[tokio::test]
    async fn worker_fault_is_failed() {
        let mailbox = EventMailbox::new();
        let mut r = runner(
            &mailbox,
            Arc::new(RecordingNotifier::default()),
            &Shutdown::new(),
            0,
        );

        let outcome: TaskOutcome<()> = r
            .run(TaskSpec::local("stream"), |_| {
                Err(Fault::Network("connection refused".into()))
            })
            .await;

        assert_eq!(
            outcome,
            TaskOutcome::Failed(Fault::Network("connection refused".into()))
        );
    }

    #[tokio::test]
    async fn worker_panic_is_worker_fault() {
        let mailbox = EventMailbox::new();
        let mut r = runner(
            &mailbox,
            Arc::new(RecordingNotifier::default()),
            &Shutdown::new(),
            0,
        );

        let outcome: TaskOutcome<()> = r
            .run(TaskSpec::local("boom"), |_| panic!("worker exploded"))
            .await;

        assert!(matches!(outcome, TaskOutcome::Failed(Fault::Worker(_))));
    }

    #[tokio::test]
    async fn failed_remote_cancel_still_cancels_locally() {
        let mailbox = EventMailbox::new();
        let notifier = Arc::new(RecordingNotifier::failing());
        let mut r = runner(&mailbox, notifier.clone(), &Shutdown::new(), 0);

        press_later(&mailbox, A, Edge::Falling, 30);
        let outcome = r
            .run(TaskSpec::remote("describe", CANCEL_URL), wait_for_cancel)
            .await;

        assert!(outcome.is_cancelled());
        assert_eq!(notifier.calls().len(), 1);
    }

    #[tokio::test]
    async fn slow_worker_is_always_joined() {
        let mailbox = EventMailbox::new();
        let notifier = Arc::new(RecordingNotifier::default());
        let mut r = runner(&mailbox, notifier, &Shutdown::new(), 0);

        let done = Arc::new(AtomicBool::new(false));
        let worker_done = Arc::clone(&done);
        press_later(&mailbox, B, Edge::Falling, 20);

        // Ignores the flag for well past the grace period.
        let outcome = r
            .run(TaskSpec::local("stubborn"), move |_| {
                std::thread::sleep(Duration::from_millis(300));
                worker_done.store(true, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert!(done.load(Ordering::SeqCst));
        assert!(outcome.is_cancelled());
    }

    #[tokio::test]
    async fn shutdown_cancels_running_task() {
        let mailbox = EventMailbox::new();
        let shutdown = Shutdown::new();
        let notifier = Arc::new(RecordingNotifier::default());
        let mut r = runner(&mailbox, notifier.clone(), &shutdown, 1000);

        let trigger = shutdown.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            trigger.raise();
        });

        let outcome = r
            .run(TaskSpec::remote("describe", CANCEL_URL), wait_for_cancel)
            .await;

        assert!(outcome.is_cancelled());
        assert_eq!(notifier.calls().len(), 1);
    }
}

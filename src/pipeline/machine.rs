//! The top-level interaction loop.
//!
//! ```text
//!            press A                       press B
//!   Idle ───────────────▶ Describe    Idle ───────▶ Chat
//!    ▲                      │                        │ ack, listen
//!    │ done / cancel / fail │ ack, frame, stream     │ transcript? ── no ──▶ cancel sound
//!    └──────────────────────┘                        │ yes: frame, stream
//!    ▲                                               │
//!    └───────────────────────────────────────────────┘
//! ```
//!
//! Every blocking operation runs through the [`TaskRunner`] or on a blocking
//! thread whose flag follows shutdown; the loop itself only ever sleeps for
//! one poll interval.
//! No single interaction can take the loop down: every path ends in Idle.

use std::sync::Arc;
use std::time::Duration;

use crate::audio::sounds::{names, SoundLibrary};
use crate::camera::FrameSource;
use crate::config::SharedPrompt;
use crate::gpio::{EventMailbox, LineId};
use crate::lifecycle::Shutdown;
use crate::remote::RemoteAudio;
use crate::stt::SpeechCapture;

use super::cancel::CancelFlag;
use super::runner::{TaskOutcome, TaskRunner, TaskSpec};
use super::state::InteractionState;

/// Line offsets of the two buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Buttons {
    pub describe: LineId,
    pub chat: LineId,
}

impl Buttons {
    pub fn lines(&self) -> [LineId; 2] {
        [self.describe, self.chat]
    }
}

/// Everything the machine talks to, built once in `main`.
pub struct AppContext {
    pub mailbox: EventMailbox,
    pub sounds: Arc<SoundLibrary>,
    pub remote: Arc<dyn RemoteAudio>,
    pub speech: Arc<dyn SpeechCapture>,
    pub camera: Arc<dyn FrameSource>,
    pub prompt: SharedPrompt,
    pub buttons: Buttons,
    pub shutdown: Shutdown,
}

pub struct InteractionMachine {
    ctx: AppContext,
    runner: TaskRunner,
    state: InteractionState,
    poll: Duration,
}

impl InteractionMachine {
    pub fn new(ctx: AppContext, runner: TaskRunner) -> Self {
        let poll = runner.timing().poll;
        Self {
            ctx,
            runner,
            state: InteractionState::Idle,
            poll,
        }
    }

    pub fn state(&self) -> InteractionState {
        self.state
    }

    /// Run until shutdown is raised.
    pub async fn run(mut self) {
        log::info!(
            "interaction loop started (describe = line {}, chat = line {})",
            self.ctx.buttons.describe,
            self.ctx.buttons.chat
        );
        while !self.ctx.shutdown.is_raised() {
            self.step().await;
        }
        log::info!("interaction loop stopped");
    }

    /// Advance by one poll (Idle) or one whole interaction (Describe, Chat).
    pub async fn step(&mut self) -> InteractionState {
        match self.state {
            InteractionState::Idle => match self.poll_idle() {
                Some(next) => self.transition(next),
                None => tokio::time::sleep(self.poll).await,
            },
            InteractionState::Describe => {
                self.describe().await;
                self.transition(InteractionState::Idle);
            }
            InteractionState::Chat => {
                self.chat().await;
                self.transition(InteractionState::Idle);
            }
        }
        self.state
    }

    fn transition(&mut self, to: InteractionState) {
        log::info!("{} -> {}", self.state, to);
        self.state = to;
    }

    /// Earliest press on either button decides; the mailbox is cleared in
    /// the same step.
    fn poll_idle(&self) -> Option<InteractionState> {
        let buttons = self.ctx.buttons;
        let press = self.ctx.mailbox.take_first_press(&buttons.lines())?;
        log::debug!("idle: {press}");
        if press.line == buttons.describe {
            Some(InteractionState::Describe)
        } else {
            Some(InteractionState::Chat)
        }
    }

    // -----------------------------------------------------------------------
    // Describe / Chat
    // -----------------------------------------------------------------------

    async fn describe(&mut self) {
        self.play(names::DESCRIBE).await;
        let image = self.capture_frame().await;
        if self.ctx.shutdown.is_raised() {
            return;
        }
        let prompt = self.ctx.prompt.get();
        self.stream_reply("describe", image, prompt).await;
    }

    async fn chat(&mut self) {
        self.play(names::CHAT).await;
        let image = self.capture_frame().await;
        if self.ctx.shutdown.is_raised() {
            return;
        }

        let speech = Arc::clone(&self.ctx.speech);
        let outcome = self
            .runner
            .run(TaskSpec::local("listen"), move |cancel| speech.listen(&cancel))
            .await;

        let question = match outcome {
            TaskOutcome::Completed(Some(text)) if !text.trim().is_empty() => text,
            TaskOutcome::Completed(_) => {
                log::info!("chat: nothing heard");
                self.play_cancel().await;
                return;
            }
            TaskOutcome::Cancelled => {
                self.play_cancel().await;
                return;
            }
            TaskOutcome::Failed(fault) => {
                log::warn!("chat: listening failed: {fault}");
                self.play_cancel().await;
                return;
            }
        };

        self.stream_reply("chat", image, question).await;
    }

    async fn stream_reply(&mut self, name: &'static str, image: Vec<u8>, prompt: String) {
        let remote = Arc::clone(&self.ctx.remote);
        let spec = TaskSpec::remote(name, remote.cancel_url());

        let outcome = self
            .runner
            .run(spec, move |cancel| remote.stream(&image, &prompt, &cancel))
            .await;

        match outcome {
            TaskOutcome::Completed(report) => {
                log::info!("{name}: reply finished ({} bytes)", report.bytes);
            }
            TaskOutcome::Cancelled => self.play_cancel().await,
            // The client has already played the network notice.
            TaskOutcome::Failed(fault) => log::warn!("{name}: {fault}"),
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn play_cancel(&self) {
        if !self.ctx.shutdown.is_raised() {
            self.play(names::CANCEL).await;
        }
    }

    /// Run `op` on a blocking thread.  Its flag is set once shutdown is
    /// raised; button presses do not interrupt it.
    async fn blocking<T, F>(&self, op: F) -> Result<T, tokio::task::JoinError>
    where
        T: Send + 'static,
        F: FnOnce(CancelFlag) -> T + Send + 'static,
    {
        let stop = CancelFlag::new();
        let worker_stop = stop.clone();
        let handle = tokio::task::spawn_blocking(move || op(worker_stop));

        while !handle.is_finished() {
            if self.ctx.shutdown.is_raised() {
                stop.cancel();
                break;
            }
            tokio::time::sleep(self.poll).await;
        }
        handle.await
    }

    /// Play a clip to the end, or until shutdown.
    async fn play(&self, name: &'static str) {
        let sounds = Arc::clone(&self.ctx.sounds);
        let played = self
            .blocking(move |stop| sounds.play_cancellable(name, &stop))
            .await;
        match played {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!("failed to play '{name}': {e}"),
            Err(e) => log::warn!("playback of '{name}' panicked: {e}"),
        }
    }

    /// Latest camera frame; empty when none is available.
    async fn capture_frame(&self) -> Vec<u8> {
        let camera = Arc::clone(&self.ctx.camera);
        match self.blocking(move |stop| camera.capture(&stop)).await {
            Ok(Ok(frame)) => frame,
            Ok(Err(e)) => {
                log::warn!("no camera frame: {e}");
                Vec::new()
            }
            Err(e) => {
                log::warn!("camera capture panicked: {e}");
                Vec::new()
            }
        }
    }
}

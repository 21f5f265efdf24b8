//! The Describe prompt and its live reload.
//!
//! The prompt is built from the `[prompt]` section of `settings.toml`.
//! [`PromptWatcher`] re-reads the file periodically and swaps the shared
//! prompt when that section changes; the state machine reads the current
//! value at the start of each Describe.

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::lifecycle::Shutdown;

use super::settings::{AppConfig, PromptConfig};

/// How often the settings file is re-read.
pub const RELOAD_INTERVAL: Duration = Duration::from_secs(5);

/// Shutdown check granularity while waiting for the next reload.
const SHUTDOWN_SLICE: Duration = Duration::from_millis(100);

pub fn describe_prompt(config: &PromptConfig) -> String {
    format!(
        "Describe the content in {} words or less. {}",
        config.max_length, config.input_text
    )
}

// ---------------------------------------------------------------------------
// SharedPrompt
// ---------------------------------------------------------------------------

/// Current Describe prompt, shared between the watcher and the state machine.
#[derive(Debug, Clone)]
pub struct SharedPrompt {
    inner: Arc<RwLock<String>>,
}

impl SharedPrompt {
    pub fn new(config: &PromptConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(describe_prompt(config))),
        }
    }

    pub fn get(&self) -> String {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set(&self, prompt: String) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = prompt;
    }
}

// ---------------------------------------------------------------------------
// PromptWatcher
// ---------------------------------------------------------------------------

pub struct PromptWatcher {
    path: PathBuf,
    prompt: SharedPrompt,
    current: PromptConfig,
    interval: Duration,
}

impl PromptWatcher {
    pub fn new(path: impl Into<PathBuf>, initial: PromptConfig, prompt: SharedPrompt) -> Self {
        Self {
            path: path.into(),
            prompt,
            current: initial,
            interval: RELOAD_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Re-read the file once.  Returns `true` if the prompt changed.
    ///
    /// A read or parse error keeps the last good prompt.
    pub fn poll_once(&mut self) -> bool {
        let loaded = AppConfig::load_from(&self.path);
        self.apply(loaded)
    }

    /// [`poll_once`](Self::poll_once) with the file read on the blocking pool.
    pub async fn reload(&mut self) -> bool {
        let path = self.path.clone();
        let loaded = match tokio::task::spawn_blocking(move || AppConfig::load_from(&path)).await {
            Ok(loaded) => loaded,
            Err(e) => {
                log::warn!("settings reload task failed: {e}");
                return false;
            }
        };
        self.apply(loaded)
    }

    fn apply(&mut self, loaded: anyhow::Result<AppConfig>) -> bool {
        let config = match loaded {
            Ok(c) => c,
            Err(e) => {
                log::warn!("failed to reload {}: {e:#}", self.path.display());
                return false;
            }
        };
        if config.prompt == self.current {
            return false;
        }

        self.current = config.prompt;
        let prompt = describe_prompt(&self.current);
        log::info!("describe prompt updated: {prompt:?}");
        self.prompt.set(prompt);
        true
    }

    /// Poll every interval until `shutdown` is raised.
    pub async fn run(mut self, shutdown: Shutdown) {
        'outer: loop {
            let mut waited = Duration::ZERO;
            while waited < self.interval {
                if shutdown.is_raised() {
                    break 'outer;
                }
                let step = SHUTDOWN_SLICE.min(self.interval - waited);
                tokio::time::sleep(step).await;
                waited += step;
            }
            self.reload().await;
        }
        log::debug!("prompt watcher stopped");
    }
}

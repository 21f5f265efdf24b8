//! Batch speech-to-text engine.
//!
//! [`SttEngine`] turns one finished utterance (16 kHz mono `f32`) into text.
//! The streaming side (deciding *when* an utterance is finished) lives in
//! [`crate::stt::recognizer`].
//!
//! [`WhisperEngine`] wraps a `whisper_rs::WhisperContext`; a fresh
//! `WhisperState` is created per call so the engine can be shared behind an
//! `Arc<dyn SttEngine>` without locking.

use std::path::{Path, PathBuf};

use thiserror::Error;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::error::Fault;

/// Rate every engine expects its input at.
pub const ENGINE_SAMPLE_RATE: u32 = 16_000;

/// Minimum utterance: 0.25 s at 16 kHz.
pub const MIN_AUDIO_SAMPLES: usize = 4_000;
/// Maximum utterance: 30 s at 16 kHz (one Whisper window).
pub const MAX_AUDIO_SAMPLES: usize = 480_000;

// ---------------------------------------------------------------------------
// SttError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error)]
pub enum SttError {
    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("whisper context initialisation failed: {0}")]
    ContextInit(String),

    #[error("transcription error: {0}")]
    Transcription(String),

    #[error("audio too short for transcription")]
    AudioTooShort,

    #[error("audio too long for transcription")]
    AudioTooLong,

    #[error("speech recognition unavailable: {0}")]
    Unavailable(String),
}

impl From<SttError> for Fault {
    fn from(e: SttError) -> Self {
        Fault::Recognition(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// SttEngine trait
// ---------------------------------------------------------------------------

/// Thread-safe batch transcriber.
///
/// `audio` must be 16 kHz mono `f32`, between [`MIN_AUDIO_SAMPLES`] and
/// [`MAX_AUDIO_SAMPLES`] long.
pub trait SttEngine: Send + Sync {
    fn transcribe(&self, audio: &[f32]) -> Result<String, SttError>;
}

fn check_length(audio: &[f32]) -> Result<(), SttError> {
    if audio.len() < MIN_AUDIO_SAMPLES {
        return Err(SttError::AudioTooShort);
    }
    if audio.len() > MAX_AUDIO_SAMPLES {
        return Err(SttError::AudioTooLong);
    }
    Ok(())
}

/// On-disk location of model `id` under `models_dir`.
///
/// `"whisper-base.en"` and `"base.en"` both resolve to `ggml-base.en.bin`.
pub fn model_path(models_dir: &Path, id: &str) -> PathBuf {
    let stem = id.strip_prefix("whisper-").unwrap_or(id);
    models_dir.join(format!("ggml-{stem}.bin"))
}

fn default_threads() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get().min(4) as i32)
        .unwrap_or(2)
}

// ---------------------------------------------------------------------------
// WhisperEngine
// ---------------------------------------------------------------------------

pub struct WhisperEngine {
    ctx: WhisperContext,
    language: String,
    n_threads: i32,
}

impl std::fmt::Debug for WhisperEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperEngine")
            .field("language", &self.language)
            .field("n_threads", &self.n_threads)
            .finish_non_exhaustive()
    }
}

impl WhisperEngine {
    /// Load a GGML model.  `language` is an ISO-639-1 code or `"auto"`.
    pub fn load(model_path: impl AsRef<Path>, language: &str) -> Result<Self, SttError> {
        let path = model_path.as_ref();
        if !path.exists() {
            return Err(SttError::ModelNotFound(path.display().to_string()));
        }
        let path_str = path.to_str().ok_or_else(|| {
            SttError::ModelNotFound(format!("non-UTF-8 model path: {}", path.display()))
        })?;

        let ctx = WhisperContext::new_with_params(path_str, WhisperContextParameters::default())
            .map_err(|e| SttError::ContextInit(e.to_string()))?;

        log::info!("loaded whisper model {}", path.display());
        Ok(Self {
            ctx,
            language: language.to_string(),
            n_threads: default_threads(),
        })
    }
}

impl SttEngine for WhisperEngine {
    fn transcribe(&self, audio: &[f32]) -> Result<String, SttError> {
        check_length(audio)?;

        let mut fp = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        let lang = (self.language != "auto").then_some(self.language.as_str());
        fp.set_language(lang);
        fp.set_n_threads(self.n_threads);
        fp.set_print_progress(false);
        fp.set_print_realtime(false);
        fp.set_single_segment(true);

        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| SttError::ContextInit(e.to_string()))?;

        let started = std::time::Instant::now();
        state
            .full(fp, audio)
            .map_err(|e| SttError::Transcription(e.to_string()))?;

        let n_segments = state
            .full_n_segments()
            .map_err(|e| SttError::Transcription(e.to_string()))?;

        let mut text = String::new();
        for i in 0..n_segments {
            let segment = state
                .full_get_segment_text(i)
                .map_err(|e| SttError::Transcription(format!("segment {i}: {e}")))?;
            text.push_str(&segment);
        }

        log::debug!(
            "transcribed {:.1}s of audio in {} ms",
            audio.len() as f32 / ENGINE_SAMPLE_RATE as f32,
            started.elapsed().as_millis()
        );
        Ok(text.trim().to_string())
    }
}

// ---------------------------------------------------------------------------
// UnavailableEngine
// ---------------------------------------------------------------------------

/// Stand-in used when no model could be loaded.  Every call fails, so Chat
/// degrades to "no transcript" instead of taking the appliance down.
#[derive(Debug)]
pub struct UnavailableEngine {
    reason: String,
}

impl UnavailableEngine {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl SttEngine for UnavailableEngine {
    fn transcribe(&self, _audio: &[f32]) -> Result<String, SttError> {
        Err(SttError::Unavailable(self.reason.clone()))
    }
}

// ---------------------------------------------------------------------------
// MockSttEngine  (test-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
pub struct MockSttEngine {
    response: Result<String, SttError>,
    pub calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockSttEngine {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            response: Ok(text.into()),
            calls: Default::default(),
        }
    }

    pub fn err(error: SttError) -> Self {
        Self {
            response: Err(error),
            calls: Default::default(),
        }
    }
}

#[cfg(test)]
impl SttEngine for MockSttEngine {
    fn transcribe(&self, audio: &[f32]) -> Result<String, SttError> {
        self.calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        check_length(audio)?;
        self.response.clone()
    }
}

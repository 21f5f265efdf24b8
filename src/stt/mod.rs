//! Speech-to-text for the Chat turn.
//!
//! ```text
//! AudioInput ──blocks──▶ SpeechRecognizer (energy endpointing)
//!                               │ utterance
//!                               ▼
//!                          SttEngine (whisper) ──▶ text
//! ```

pub mod engine;
pub mod recognizer;
pub mod session;

pub use engine::{model_path, SttEngine, SttError, UnavailableEngine, WhisperEngine};
pub use recognizer::{
    RecognizerFactory, SpeechRecognizer, WhisperRecognizer, WhisperRecognizerFactory,
};
pub use session::{SpeechCapture, SpeechSession};

#[cfg(test)]
pub use engine::MockSttEngine;

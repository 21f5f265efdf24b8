//! Streaming recogniser: raw PCM blocks in, finalised utterances out.
//!
//! [`SpeechRecognizer::accept`] is called once per microphone block and
//! answers whether an utterance has just been finalised; the text is then
//! collected with [`SpeechRecognizer::result`].  [`WhisperRecognizer`]
//! endpoints with the energy detector and transcribes each finished
//! utterance in one batch call.

use std::sync::Arc;

use crate::audio::pcm::{i16_to_f32, resample_linear};
use crate::audio::vad::{EndpointDetector, EndpointSettings};

use super::engine::{SttEngine, SttError, ENGINE_SAMPLE_RATE, MAX_AUDIO_SAMPLES};

/// Audio kept from before the first voiced frame, so word onsets survive.
const PRE_ROLL_SECS: f32 = 0.3;

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

pub trait SpeechRecognizer: Send {
    /// Consume one block.  `Ok(true)` means an utterance is ready in
    /// [`result`](Self::result).
    fn accept(&mut self, block: &[i16]) -> Result<bool, SttError>;

    /// Text of the last finalised utterance.  Empties the slot.
    fn result(&mut self) -> String;
}

/// Builds one recogniser per capture session, for the microphone's rate.
pub trait RecognizerFactory: Send + Sync {
    fn create(&self, sample_rate: u32) -> Result<Box<dyn SpeechRecognizer>, SttError>;
}

// ---------------------------------------------------------------------------
// WhisperRecognizer
// ---------------------------------------------------------------------------

pub struct WhisperRecognizer {
    engine: Arc<dyn SttEngine>,
    detector: EndpointDetector,
    sample_rate: u32,
    pre_roll: usize,
    max_samples: usize,
    utterance: Vec<f32>,
    text: String,
}

impl WhisperRecognizer {
    pub fn new(engine: Arc<dyn SttEngine>, settings: EndpointSettings, sample_rate: u32) -> Self {
        let per_engine_sample = sample_rate as f32 / ENGINE_SAMPLE_RATE as f32;
        Self {
            engine,
            detector: EndpointDetector::new(settings, sample_rate),
            sample_rate,
            pre_roll: (sample_rate as f32 * PRE_ROLL_SECS) as usize,
            max_samples: (MAX_AUDIO_SAMPLES as f32 * per_engine_sample) as usize,
            utterance: Vec::new(),
            text: String::new(),
        }
    }

    fn finalize(&mut self) -> Result<bool, SttError> {
        let audio = resample_linear(&self.utterance, self.sample_rate, ENGINE_SAMPLE_RATE);
        self.utterance.clear();
        self.detector.reset();

        match self.engine.transcribe(&audio) {
            Ok(text) if !text.is_empty() => {
                log::debug!("utterance finalised: {text:?}");
                self.text = text;
                Ok(true)
            }
            Ok(_) => Ok(false),
            Err(SttError::AudioTooShort) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl SpeechRecognizer for WhisperRecognizer {
    fn accept(&mut self, block: &[i16]) -> Result<bool, SttError> {
        let samples: Vec<f32> = block.iter().copied().map(i16_to_f32).collect();
        self.utterance.extend_from_slice(&samples);

        if self.detector.push(&samples) || self.utterance.len() >= self.max_samples {
            return self.finalize();
        }

        if !self.detector.in_speech() && self.utterance.len() > self.pre_roll {
            let excess = self.utterance.len() - self.pre_roll;
            self.utterance.drain(..excess);
        }
        Ok(false)
    }

    fn result(&mut self) -> String {
        std::mem::take(&mut self.text)
    }
}

/// Factory sharing one loaded engine across sessions.
pub struct WhisperRecognizerFactory {
    engine: Arc<dyn SttEngine>,
    settings: EndpointSettings,
}

impl WhisperRecognizerFactory {
    pub fn new(engine: Arc<dyn SttEngine>, settings: EndpointSettings) -> Self {
        Self { engine, settings }
    }
}

impl RecognizerFactory for WhisperRecognizerFactory {
    fn create(&self, sample_rate: u32) -> Result<Box<dyn SpeechRecognizer>, SttError> {
        Ok(Box::new(WhisperRecognizer::new(
            Arc::clone(&self.engine),
            self.settings,
            sample_rate,
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use super::*;
    use crate::stt::engine::MockSttEngine;

    const RATE: u32 = 16_000;

    fn settings() -> EndpointSettings {
        EndpointSettings {
            threshold: 0.05,
            min_speech: Duration::from_millis(90),
            end_silence: Duration::from_millis(150),
        }
    }

    fn recognizer(engine: Arc<MockSttEngine>) -> WhisperRecognizer {
        WhisperRecognizer::new(engine, settings(), RATE)
    }

    fn loud(n: usize) -> Vec<i16> {
        vec![10_000; n]
    }

    fn quiet(n: usize) -> Vec<i16> {
        vec![0; n]
    }

    #[test]
    fn silence_never_calls_engine() {
        let engine = Arc::new(MockSttEngine::ok("hi"));
        let mut rec = recognizer(Arc::clone(&engine));
        for _ in 0..20 {
            assert!(!rec.accept(&quiet(8000)).unwrap());
        }
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn utterance_is_finalised_after_trailing_silence() {
        let engine = Arc::new(MockSttEngine::ok("what is this"));
        let mut rec = recognizer(Arc::clone(&engine));

        assert!(!rec.accept(&loud(8000)).unwrap());
        assert!(rec.accept(&quiet(8000)).unwrap());
        assert_eq!(rec.result(), "what is this");
        assert_eq!(rec.result(), "");
    }

    #[test]
    fn empty_transcript_is_not_an_utterance() {
        let engine = Arc::new(MockSttEngine::ok(""));
        let mut rec = recognizer(engine);
        rec.accept(&loud(8000)).unwrap();
        assert!(!rec.accept(&quiet(8000)).unwrap());
    }

    #[test]
    fn engine_errors_propagate() {
        let engine = Arc::new(MockSttEngine::err(SttError::Transcription("boom".into())));
        let mut rec = recognizer(engine);
        rec.accept(&loud(8000)).unwrap();
        assert!(rec.accept(&quiet(8000)).is_err());
    }

    #[test]
    fn factory_builds_for_given_rate() {
        let factory = WhisperRecognizerFactory::new(Arc::new(MockSttEngine::ok("x")), settings());
        let mut rec = factory.create(48_000).unwrap();
        assert!(!rec.accept(&quiet(8000)).unwrap());
    }
}

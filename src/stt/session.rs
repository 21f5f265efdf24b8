//! One listening turn: microphone → recogniser → transcript.
//!
//! The microphone callback pushes buffers into an mpsc queue; the session
//! regroups them into fixed-size blocks and hands each block to the
//! recogniser.  The cancel flag is checked before and after every block, and
//! the input stream is a scoped guard, so the microphone is released on
//! every exit path (utterance, cancel, timeout, error).

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::audio::capture::AudioInput;
use crate::audio::sounds::{names, SoundLibrary};
use crate::error::Fault;
use crate::pipeline::CancelFlag;

use super::recognizer::RecognizerFactory;

/// How long a queue read may block before the cancel flag is rechecked.
const RECV_SLICE: Duration = Duration::from_millis(50);

/// Something that can listen for one utterance.
pub trait SpeechCapture: Send + Sync {
    /// `Ok(Some(text))` for a recognised utterance, `Ok(None)` on cancel or
    /// silence timeout.
    fn listen(&self, cancel: &CancelFlag) -> Result<Option<String>, Fault>;
}

pub struct SpeechSession {
    input: Arc<dyn AudioInput>,
    recognizers: Arc<dyn RecognizerFactory>,
    sounds: Arc<SoundLibrary>,
    block_samples: usize,
    max_listen: Duration,
}

impl SpeechSession {
    pub fn new(
        input: Arc<dyn AudioInput>,
        recognizers: Arc<dyn RecognizerFactory>,
        sounds: Arc<SoundLibrary>,
        block_samples: usize,
        max_listen: Duration,
    ) -> Self {
        Self {
            input,
            recognizers,
            sounds,
            block_samples: block_samples.max(1),
            max_listen,
        }
    }
}

impl SpeechCapture for SpeechSession {
    fn listen(&self, cancel: &CancelFlag) -> Result<Option<String>, Fault> {
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let (tx, rx) = mpsc::channel::<Vec<i16>>();
        let input = self.input.open(tx)?;
        let mut recognizer = self.recognizers.create(input.sample_rate)?;
        log::info!("listening ({} Hz)", input.sample_rate);

        let deadline = Instant::now() + self.max_listen;
        let mut pending: Vec<i16> = Vec::with_capacity(self.block_samples * 2);

        let transcript = 'listen: loop {
            if cancel.is_cancelled() {
                log::info!("listening cancelled");
                break None;
            }
            if Instant::now() >= deadline {
                log::info!("no utterance within {:?}", self.max_listen);
                break None;
            }

            match rx.recv_timeout(RECV_SLICE) {
                Ok(buffer) => pending.extend_from_slice(&buffer),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(Fault::Io("microphone stream closed".into()));
                }
            }

            while pending.len() >= self.block_samples {
                let block: Vec<i16> = pending.drain(..self.block_samples).collect();
                if cancel.is_cancelled() {
                    continue 'listen;
                }
                let finalized = recognizer.accept(&block)?;
                if finalized && !cancel.is_cancelled() {
                    break 'listen Some(recognizer.result());
                }
            }
        };

        drop(input);

        if let Some(text) = &transcript {
            log::info!("heard: {text:?}");
            if let Err(e) = self.sounds.play_blocking(names::PING) {
                log::warn!("failed to play ping: {e}");
            }
        }
        Ok(transcript)
    }
}

//! Streaming energy-based end-of-utterance detection.
//!
//! Audio is fed in arbitrary-sized pieces and split into 30 ms frames.  A
//! frame is *voice* when its RMS exceeds the threshold.  An utterance ends
//! after `end_silence` of consecutive quiet frames following at least
//! `min_speech` of voice; shorter bursts are treated as noise and dropped.

use std::time::Duration;

/// Frame length used for the energy decision.
const FRAME: Duration = Duration::from_millis(30);

/// Tunables for [`EndpointDetector`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EndpointSettings {
    /// RMS amplitude above which a frame counts as voice.
    pub threshold: f32,
    /// Voice needed before an utterance can end.
    pub min_speech: Duration,
    /// Trailing silence that ends an utterance.
    pub end_silence: Duration,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            threshold: 0.01,
            min_speech: Duration::from_millis(300),
            end_silence: Duration::from_millis(800),
        }
    }
}

fn frames_in(d: Duration) -> usize {
    ((d.as_millis() / FRAME.as_millis()) as usize).max(1)
}

fn rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    (frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32).sqrt()
}

pub struct EndpointDetector {
    threshold: f32,
    frame_len: usize,
    min_speech_frames: usize,
    end_silence_frames: usize,
    partial: Vec<f32>,
    speech_frames: usize,
    silence_run: usize,
}

impl EndpointDetector {
    pub fn new(settings: EndpointSettings, sample_rate: u32) -> Self {
        let frame_len = ((sample_rate as u128 * FRAME.as_millis()) / 1000).max(1) as usize;
        Self {
            threshold: settings.threshold,
            frame_len,
            min_speech_frames: frames_in(settings.min_speech),
            end_silence_frames: frames_in(settings.end_silence),
            partial: Vec::with_capacity(frame_len),
            speech_frames: 0,
            silence_run: 0,
        }
    }

    /// `true` while voice has been heard and the utterance has not ended.
    pub fn in_speech(&self) -> bool {
        self.speech_frames > 0
    }

    /// Feed `samples`; returns `true` if an utterance ended inside them.
    pub fn push(&mut self, samples: &[f32]) -> bool {
        let mut ended = false;
        let mut rest = samples;

        while !rest.is_empty() {
            let need = self.frame_len - self.partial.len();
            let take = need.min(rest.len());
            self.partial.extend_from_slice(&rest[..take]);
            rest = &rest[take..];

            if self.partial.len() == self.frame_len {
                let voiced = rms(&self.partial) > self.threshold;
                self.partial.clear();
                ended |= self.frame(voiced);
            }
        }
        ended
    }

    fn frame(&mut self, voiced: bool) -> bool {
        if voiced {
            self.speech_frames += 1;
            self.silence_run = 0;
            return false;
        }
        if self.speech_frames == 0 {
            return false;
        }

        self.silence_run += 1;
        if self.silence_run < self.end_silence_frames {
            return false;
        }

        let complete = self.speech_frames >= self.min_speech_frames;
        self.speech_frames = 0;
        self.silence_run = 0;
        complete
    }

    pub fn reset(&mut self) {
        self.partial.clear();
        self.speech_frames = 0;
        self.silence_run = 0;
    }
}

//! Speaker output via `cpal`.
//!
//! [`AudioOutput`] is the device seam: `open` hands back a [`PcmSink`] that
//! exclusively owns one output stream until it is dropped.  Writes block
//! once roughly half a second of audio is queued, so a producer (network
//! reader, clip player) is paced by the device rather than racing ahead of
//! it.  Dropping the sink stops the stream and discards anything still
//! queued, which is how cancellation closes the device.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use thiserror::Error;

use crate::error::Fault;
use crate::pipeline::CancelFlag;

use super::pcm::LinearResampler;

/// Seconds of audio the sink buffers before `write` blocks.
const QUEUE_SECONDS: f32 = 0.5;

/// Back-pressure / drain polling interval.
const PACE: Duration = Duration::from_millis(5);

/// Extra time after the queue empties for the device buffer to play out.
const DRAIN_TAIL: Duration = Duration::from_millis(60);

// ---------------------------------------------------------------------------
// AudioError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("no output device found on the default audio host")]
    NoDevice,

    #[error("no usable output config: {0}")]
    Config(String),

    #[error("failed to build output stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start output stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("output stream failed")]
    StreamFailed,

    #[error("failed to decode sound file: {0}")]
    Decode(#[from] hound::Error),

    #[error("unsupported sound format: {0}")]
    Unsupported(String),
}

impl From<AudioError> for Fault {
    fn from(e: AudioError) -> Self {
        Fault::Io(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

/// An open output stream.  Mono `f32` in, speaker out.
pub trait PcmSink {
    /// Queue `samples`, blocking while the device is behind.
    fn write(&mut self, samples: &[f32]) -> Result<(), AudioError>;

    /// Block until everything queued has been played, or `cancel` is set.
    fn drain(&mut self, cancel: &CancelFlag) -> Result<(), AudioError>;
}

/// Factory for output streams.
pub trait AudioOutput: Send + Sync {
    /// Open the device for mono audio at `sample_rate` Hz.
    fn open(&self, sample_rate: u32) -> Result<Box<dyn PcmSink>, AudioError>;
}

// ---------------------------------------------------------------------------
// CpalOutput
// ---------------------------------------------------------------------------

/// Default output device of the default cpal host.
#[derive(Debug, Default)]
pub struct CpalOutput;

impl CpalOutput {
    pub fn new() -> Self {
        Self
    }

    /// Prefer a device config that runs natively at `sample_rate`; fall back
    /// to the default config and resample in software.
    fn pick_config(device: &cpal::Device, sample_rate: u32) -> Result<StreamConfig, AudioError> {
        let native = device
            .supported_output_configs()
            .map_err(|e| AudioError::Config(e.to_string()))?
            .filter(|c| {
                c.min_sample_rate() <= SampleRate(sample_rate)
                    && c.max_sample_rate() >= SampleRate(sample_rate)
            })
            .min_by_key(|c| c.channels());

        match native {
            Some(range) => Ok(range.with_sample_rate(SampleRate(sample_rate)).config()),
            None => device
                .default_output_config()
                .map(|c| c.config())
                .map_err(|e| AudioError::Config(e.to_string())),
        }
    }
}

impl AudioOutput for CpalOutput {
    fn open(&self, sample_rate: u32) -> Result<Box<dyn PcmSink>, AudioError> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or(AudioError::NoDevice)?;
        let config = Self::pick_config(&device, sample_rate)?;

        let channels = usize::from(config.channels.max(1));
        let device_rate = config.sample_rate.0;
        let capacity = (device_rate as f32 * QUEUE_SECONDS) as usize;

        let queue: Arc<Mutex<VecDeque<f32>>> =
            Arc::new(Mutex::new(VecDeque::with_capacity(capacity)));
        let failed = Arc::new(AtomicBool::new(false));

        let cb_queue = Arc::clone(&queue);
        let cb_failed = Arc::clone(&failed);
        let stream = device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut q = cb_queue.lock().unwrap_or_else(PoisonError::into_inner);
                for frame in data.chunks_mut(channels) {
                    let sample = q.pop_front().unwrap_or(0.0);
                    frame.fill(sample);
                }
            },
            move |err: cpal::StreamError| {
                log::error!("cpal output error: {err}");
                cb_failed.store(true, Ordering::SeqCst);
            },
            None,
        )?;
        stream.play()?;

        log::debug!(
            "output opened: {sample_rate} Hz source, {device_rate} Hz x{channels} device"
        );

        Ok(Box::new(CpalSink {
            _stream: stream,
            queue,
            failed,
            capacity,
            resampler: (sample_rate != device_rate)
                .then(|| LinearResampler::new(sample_rate, device_rate)),
        }))
    }
}

struct CpalSink {
    _stream: cpal::Stream,
    queue: Arc<Mutex<VecDeque<f32>>>,
    failed: Arc<AtomicBool>,
    capacity: usize,
    /// `None` when the device runs at the source rate.
    resampler: Option<LinearResampler>,
}

impl CpalSink {
    fn queued(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn check(&self) -> Result<(), AudioError> {
        if self.failed.load(Ordering::SeqCst) {
            Err(AudioError::StreamFailed)
        } else {
            Ok(())
        }
    }
}

impl PcmSink for CpalSink {
    fn write(&mut self, samples: &[f32]) -> Result<(), AudioError> {
        let resampled;
        let mut pending: &[f32] = match self.resampler.as_mut() {
            None => samples,
            Some(resampler) => {
                resampled = resampler.process(samples);
                &resampled
            }
        };

        while !pending.is_empty() {
            self.check()?;
            let room = {
                let mut q = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
                let room = self.capacity.saturating_sub(q.len()).min(pending.len());
                q.extend(&pending[..room]);
                room
            };
            pending = &pending[room..];
            if !pending.is_empty() {
                std::thread::sleep(PACE);
            }
        }
        Ok(())
    }

    fn drain(&mut self, cancel: &CancelFlag) -> Result<(), AudioError> {
        let started = Instant::now();
        while self.queued() > 0 {
            self.check()?;
            if cancel.is_cancelled() {
                return Ok(());
            }
            std::thread::sleep(PACE);
        }
        cancel.sleep(DRAIN_TAIL);
        log::trace!("output drained in {:?}", started.elapsed());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Test double
// ---------------------------------------------------------------------------

/// Recording output shared by the unit tests of every module that plays
/// audio.  Each `open` starts a new [`Playback`] entry.
#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct Playback {
        pub sample_rate: u32,
        pub samples: usize,
        pub drained: bool,
    }

    #[derive(Clone, Default)]
    pub struct RecordingOutput {
        pub log: Arc<Mutex<Vec<Playback>>>,
        open_now: Arc<AtomicUsize>,
        pub max_open: Arc<AtomicUsize>,
        /// Delay per `write`, to simulate a real-time device.
        pub write_delay: Duration,
        pub fail_open: bool,
    }

    impl RecordingOutput {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn paced(write_delay: Duration) -> Self {
            Self {
                write_delay,
                ..Self::default()
            }
        }

        pub fn playbacks(&self) -> Vec<Playback> {
            self.log.lock().unwrap().clone()
        }

        /// Sample rates of every opened stream, in order.
        pub fn rates(&self) -> Vec<u32> {
            self.playbacks().iter().map(|p| p.sample_rate).collect()
        }

        pub fn open_count(&self) -> usize {
            self.open_now.load(Ordering::SeqCst)
        }
    }

    impl AudioOutput for RecordingOutput {
        fn open(&self, sample_rate: u32) -> Result<Box<dyn PcmSink>, AudioError> {
            if self.fail_open {
                return Err(AudioError::NoDevice);
            }
            let index = {
                let mut log = self.log.lock().unwrap();
                log.push(Playback {
                    sample_rate,
                    ..Playback::default()
                });
                log.len() - 1
            };
            let now = self.open_now.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_open.fetch_max(now, Ordering::SeqCst);

            Ok(Box::new(RecordingSink {
                output: self.clone(),
                index,
            }))
        }
    }

    struct RecordingSink {
        output: RecordingOutput,
        index: usize,
    }

    impl PcmSink for RecordingSink {
        fn write(&mut self, samples: &[f32]) -> Result<(), AudioError> {
            if !self.output.write_delay.is_zero() {
                std::thread::sleep(self.output.write_delay);
            }
            self.output.log.lock().unwrap()[self.index].samples += samples.len();
            Ok(())
        }

        fn drain(&mut self, _cancel: &CancelFlag) -> Result<(), AudioError> {
            self.output.log.lock().unwrap()[self.index].drained = true;
            Ok(())
        }
    }

    impl Drop for RecordingSink {
        fn drop(&mut self) {
            self.output.open_now.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

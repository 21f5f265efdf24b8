//! Microphone capture via `cpal`.
//!
//! [`AudioInput::open`] starts the default input device at its native rate
//! and forwards every callback buffer, downmixed to mono `i16`, over an mpsc
//! channel.  The returned [`InputHandle`] is a RAII guard: dropping it stops
//! the stream, after which the sender is dropped and the receiver sees the
//! channel disconnect.

use std::any::Any;
use std::sync::mpsc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;

use crate::error::Fault;

use super::pcm::{downmix, f32_to_i16};

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start input stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}

impl From<CaptureError> for Fault {
    fn from(e: CaptureError) -> Self {
        Fault::Io(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// InputHandle
// ---------------------------------------------------------------------------

/// Keeps an input stream alive.  Drop to stop capturing.
pub struct InputHandle {
    /// Native rate of the samples being sent, in Hz.
    pub sample_rate: u32,
    _guard: Box<dyn Any>,
}

impl InputHandle {
    pub fn new(sample_rate: u32, guard: Box<dyn Any>) -> Self {
        Self {
            sample_rate,
            _guard: guard,
        }
    }
}

// ---------------------------------------------------------------------------
// Seam
// ---------------------------------------------------------------------------

/// Source of mono `i16` microphone buffers.
pub trait AudioInput: Send + Sync {
    fn open(&self, tx: mpsc::Sender<Vec<i16>>) -> Result<InputHandle, CaptureError>;
}

// ---------------------------------------------------------------------------
// CpalInput
// ---------------------------------------------------------------------------

/// Default input device of the default cpal host.
#[derive(Debug, Default)]
pub struct CpalInput;

impl CpalInput {
    pub fn new() -> Self {
        Self
    }
}

impl AudioInput for CpalInput {
    fn open(&self, tx: mpsc::Sender<Vec<i16>>) -> Result<InputHandle, CaptureError> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or(CaptureError::NoDevice)?;

        let supported = device.default_input_config()?;
        let channels = supported.channels();
        let sample_rate = supported.sample_rate().0;
        let config: cpal::StreamConfig = supported.into();

        let stream = device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let block: Vec<i16> = downmix(data, channels)
                    .into_iter()
                    .map(f32_to_i16)
                    .collect();
                // The receiver goes away when the session ends.
                let _ = tx.send(block);
            },
            |err: cpal::StreamError| {
                log::error!("cpal input error: {err}");
            },
            None,
        )?;
        stream.play()?;

        log::debug!("microphone opened at {sample_rate} Hz x{channels}");
        Ok(InputHandle::new(sample_rate, Box::new(stream)))
    }
}

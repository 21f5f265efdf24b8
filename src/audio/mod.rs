//! Audio devices, clips and sample plumbing.
//!
//! ```text
//! SoundLibrary ──play──▶ AudioOutput::open ──▶ PcmSink (cpal output stream)
//! remote stream ─────────────────────────────▶ PcmSink
//! microphone ──cpal callback──▶ AudioInput ──mpsc<Vec<i16>>──▶ stt::SpeechSession
//! ```

pub mod capture;
pub mod output;
pub mod pcm;
pub mod sounds;
pub mod tones;
pub mod vad;

pub use capture::{AudioInput, CaptureError, CpalInput, InputHandle};
pub use output::{AudioError, AudioOutput, CpalOutput, PcmSink};
pub use pcm::{downmix, resample_linear, LinearResampler, PcmDecoder};
pub use sounds::{names, SoundAsset, SoundLibrary};
pub use vad::{EndpointDetector, EndpointSettings};

//! PCM sample helpers: format conversion, channel mixing and resampling.
//!
//! The inference server streams raw little-endian `i16` mono PCM; the
//! microphone delivers interleaved `f32`; Whisper wants 16 kHz mono `f32`.
//! Everything in between goes through this module.

// ---------------------------------------------------------------------------
// Sample format conversion
// ---------------------------------------------------------------------------

/// Full-scale divisor for signed 16-bit samples.
const I16_SCALE: f32 = 32768.0;

/// Convert one `i16` sample to `[-1.0, 1.0)`.
#[inline]
pub fn i16_to_f32(sample: i16) -> f32 {
    f32::from(sample) / I16_SCALE
}

/// Convert one `f32` sample to `i16`, clamping out-of-range input.
#[inline]
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32767.0).round() as i16
}

// ---------------------------------------------------------------------------
// downmix
// ---------------------------------------------------------------------------

/// Average interleaved multi-channel audio down to mono.
///
/// `channels == 1` copies the input; `channels == 0` yields nothing.
pub fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = usize::from(n);
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// resample_linear
// ---------------------------------------------------------------------------

/// Resample mono `samples` from `from` Hz to `to` Hz by linear interpolation.
pub fn resample_linear(samples: &[f32], from: u32, to: u32) -> Vec<f32> {
    if from == to || samples.is_empty() || from == 0 || to == 0 {
        return samples.to_vec();
    }

    let ratio = f64::from(to) / f64::from(from);
    let out_len = (samples.len() as f64 * ratio).ceil() as usize;
    let last = samples.len() - 1;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 / ratio;
            let idx = (pos as usize).min(last);
            let frac = (pos - idx as f64) as f32;
            match samples.get(idx + 1) {
                Some(&next) => samples[idx] * (1.0 - frac) + next * frac,
                None => samples[idx],
            }
        })
        .collect()
}

/// Streaming linear resampler.
///
/// Unlike [`resample_linear`], which treats every call as a complete signal,
/// this keeps the read position and the last input sample between calls, so
/// a stream fed in small windows comes out at the true rate ratio with no
/// seam at window boundaries.
#[derive(Debug, Clone)]
pub struct LinearResampler {
    /// Input samples advanced per output sample.
    step: f64,
    /// Read position relative to `prev` (or to the next input if `None`).
    pos: f64,
    prev: Option<f32>,
}

impl LinearResampler {
    pub fn new(from: u32, to: u32) -> Self {
        Self {
            step: f64::from(from.max(1)) / f64::from(to.max(1)),
            pos: 0.0,
            prev: None,
        }
    }

    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        let mut buf = Vec::with_capacity(input.len() + 1);
        buf.extend(self.prev);
        buf.extend_from_slice(input);
        if buf.is_empty() {
            return Vec::new();
        }

        let mut out = Vec::with_capacity((input.len() as f64 / self.step) as usize + 1);
        loop {
            let idx = self.pos as usize;
            if idx + 1 >= buf.len() {
                break;
            }
            let frac = (self.pos - idx as f64) as f32;
            out.push(buf[idx] * (1.0 - frac) + buf[idx + 1] * frac);
            self.pos += self.step;
        }

        // The last sample becomes index 0 of the next call.
        self.pos -= (buf.len() - 1) as f64;
        self.prev = buf.last().copied();
        out
    }
}

// ---------------------------------------------------------------------------
// PcmDecoder
// ---------------------------------------------------------------------------

/// Incremental decoder for a little-endian `i16` byte stream.
///
/// Network chunks do not respect sample boundaries.  A trailing odd byte is
/// held back and prepended to the next chunk.
#[derive(Debug, Default)]
pub struct PcmDecoder {
    carry: Option<u8>,
}

impl PcmDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode as many whole samples as `bytes` (plus any carried byte) hold.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<f32> {
        let mut out = Vec::with_capacity((bytes.len() + 1) / 2);
        let mut rest = bytes;

        if let Some(lo) = self.carry.take() {
            match rest.split_first() {
                Some((&hi, tail)) => {
                    out.push(i16_to_f32(i16::from_le_bytes([lo, hi])));
                    rest = tail;
                }
                None => {
                    self.carry = Some(lo);
                    return out;
                }
            }
        }

        let mut pairs = rest.chunks_exact(2);
        out.extend(
            pairs
                .by_ref()
                .map(|p| i16_to_f32(i16::from_le_bytes([p[0], p[1]]))),
        );
        self.carry = pairs.remainder().first().copied();
        out
    }

    /// `true` when half a sample is waiting for its second byte.
    pub fn has_carry(&self) -> bool {
        self.carry.is_some()
    }
}

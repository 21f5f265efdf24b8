//! Synthesised acknowledgement tones.

use std::f32::consts::TAU;

/// Sample rate of every synthesised tone.
pub const TONE_SAMPLE_RATE: u32 = 44_100;

/// Two-tone "ping" played when an utterance has been recognised.
///
/// 1500 Hz + 1800 Hz sines for 150 ms, peak-normalised, with an
/// `exp(-30 t)` decay envelope.
pub fn ping() -> Vec<f32> {
    two_tone(1500.0, 1800.0, 0.15, TONE_SAMPLE_RATE)
}

fn two_tone(freq1: f32, freq2: f32, duration: f32, sample_rate: u32) -> Vec<f32> {
    let len = (sample_rate as f32 * duration) as usize;
    let rate = sample_rate as f32;

    let mut tone: Vec<f32> = (0..len)
        .map(|i| {
            let t = i as f32 / rate;
            (TAU * freq1 * t).sin() + (TAU * freq2 * t).sin()
        })
        .collect();

    let peak = tone.iter().fold(0.0_f32, |m, s| m.max(s.abs()));
    if peak > 0.0 {
        for (i, s) in tone.iter_mut().enumerate() {
            let t = i as f32 / rate;
            *s = *s / peak * (-30.0 * t).exp();
        }
    }
    tone
}

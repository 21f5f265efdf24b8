//! Named notification clips loaded once at startup.
//!
//! Every clip is decoded to mono `f32` and stored behind an `Arc<[f32]>`, so
//! playback never copies or mutates it.  The library does not serialise
//! playback itself: callers must not play two clips on the device at once.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::pipeline::CancelFlag;

use super::output::{AudioError, AudioOutput};
use super::pcm::downmix;

/// Clip names used by the interaction flow.
pub mod names {
    pub const CANCEL: &str = "cancel";
    pub const DESCRIBE: &str = "desc";
    pub const CHAT: &str = "chat";
    pub const HELPER: &str = "helper";
    pub const WAITING: &str = "waiting";
    pub const NO_INTERNET: &str = "no_internet";
    pub const PING: &str = "ping";
}

/// Playback slice between cancel checks.
const SLICE: Duration = Duration::from_millis(20);

// ---------------------------------------------------------------------------
// SoundAsset
// ---------------------------------------------------------------------------

/// An immutable mono clip.
#[derive(Debug, Clone)]
pub struct SoundAsset {
    pub name: String,
    pub samples: Arc<[f32]>,
    pub sample_rate: u32,
}

impl SoundAsset {
    pub fn new(name: impl Into<String>, samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            name: name.into(),
            samples: samples.into(),
            sample_rate,
        }
    }

    /// Decode a WAV file to mono `f32`.
    pub fn from_wav(name: impl Into<String>, path: &Path) -> Result<Self, AudioError> {
        let mut reader = hound::WavReader::open(path)?;
        let spec = reader.spec();

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
            hound::SampleFormat::Int => {
                if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                    return Err(AudioError::Unsupported(format!(
                        "{}-bit integer samples",
                        spec.bits_per_sample
                    )));
                }
                let scale = (1_i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<_, _>>()?
            }
        };

        Ok(Self::new(
            name,
            downmix(&interleaved, spec.channels),
            spec.sample_rate,
        ))
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }
}

// ---------------------------------------------------------------------------
// SoundLibrary
// ---------------------------------------------------------------------------

/// Clip store plus the output device they are played on.
pub struct SoundLibrary {
    assets: HashMap<String, SoundAsset>,
    output: Arc<dyn AudioOutput>,
}

impl SoundLibrary {
    pub fn new(output: Arc<dyn AudioOutput>) -> Self {
        Self {
            assets: HashMap::new(),
            output,
        }
    }

    /// Load the WAV file at `path` under `name`.
    pub fn load(&mut self, name: &str, path: &Path) -> Result<(), AudioError> {
        let asset = SoundAsset::from_wav(name, path)?;
        log::debug!(
            "loaded sound '{name}' ({:.2}s @ {} Hz)",
            asset.duration().as_secs_f32(),
            asset.sample_rate
        );
        self.insert(asset);
        Ok(())
    }

    /// Load every `(name, path)`; failures are logged and skipped.
    ///
    /// Returns the number of clips loaded.
    pub fn load_all<'a, I>(&mut self, files: I) -> usize
    where
        I: IntoIterator<Item = (&'a str, &'a Path)>,
    {
        let mut loaded = 0;
        for (name, path) in files {
            match self.load(name, path) {
                Ok(()) => loaded += 1,
                Err(e) => log::warn!("skipping sound '{name}' ({}): {e}", path.display()),
            }
        }
        loaded
    }

    pub fn insert(&mut self, asset: SoundAsset) {
        self.assets.insert(asset.name.clone(), asset);
    }

    pub fn get(&self, name: &str) -> Option<&SoundAsset> {
        self.assets.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.assets.contains_key(name)
    }

    /// Play `name` on a detached thread.  Unknown names and device errors are
    /// logged only.
    pub fn play(&self, name: &str) {
        let Some(asset) = self.get(name).cloned() else {
            log::warn!("sound '{name}' not found");
            return;
        };
        let output = Arc::clone(&self.output);

        let spawned = std::thread::Builder::new()
            .name(format!("sound-{name}"))
            .spawn(move || {
                if let Err(e) = play_asset(output.as_ref(), &asset, &CancelFlag::new()) {
                    log::warn!("failed to play '{}': {e}", asset.name);
                }
            });
        if let Err(e) = spawned {
            log::warn!("failed to spawn playback of '{name}': {e}");
        }
    }

    /// Play `name` to the end on the calling thread.
    pub fn play_blocking(&self, name: &str) -> Result<(), AudioError> {
        self.play_cancellable(name, &CancelFlag::new())
    }

    /// Play `name` until it ends or `cancel` is set, then close the device.
    ///
    /// An unknown name is logged and treated as an empty clip.
    pub fn play_cancellable(&self, name: &str, cancel: &CancelFlag) -> Result<(), AudioError> {
        match self.get(name) {
            Some(asset) => play_asset(self.output.as_ref(), asset, cancel),
            None => {
                log::warn!("sound '{name}' not found");
                Ok(())
            }
        }
    }
}

fn play_asset(
    output: &dyn AudioOutput,
    asset: &SoundAsset,
    cancel: &CancelFlag,
) -> Result<(), AudioError> {
    if cancel.is_cancelled() {
        return Ok(());
    }

    let mut sink = output.open(asset.sample_rate)?;
    let slice = ((asset.sample_rate as f32 * SLICE.as_secs_f32()) as usize).max(1);

    for part in asset.samples.chunks(slice) {
        if cancel.is_cancelled() {
            log::debug!("playback of '{}' cancelled", asset.name);
            return Ok(());
        }
        sink.write(part)?;
    }
    sink.drain(cancel)
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::audio::output::testing::RecordingOutput;

    fn write_wav(path: &Path, rate: u32, channels: u16, samples: &[i16]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut w = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            w.write_sample(s).unwrap();
        }
        w.finalize().unwrap();
    }

    fn library(output: &RecordingOutput) -> SoundLibrary {
        SoundLibrary::new(Arc::new(output.clone()))
    }

    #[test]
    fn load_decodes_and_downmixes_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.wav");
        write_wav(&path, 22_050, 2, &[16384, 16384, -16384, -16384]);

        let mut lib = library(&RecordingOutput::new());
        lib.load(names::CHAT, &path).unwrap();

        let asset = lib.get(names::CHAT).unwrap();
        assert_eq!(asset.sample_rate, 22_050);
        assert_eq!(asset.samples.len(), 2);
        assert!((asset.samples[0] - 0.5).abs() < 1e-4);
        assert!((asset.samples[1] + 0.5).abs() < 1e-4);
    }

    #[test]
    fn load_missing_file_is_an_error() {
        let mut lib = library(&RecordingOutput::new());
        let err = lib.load("cancel", Path::new("/nonexistent/cancel.wav"));
        assert!(matches!(err, Err(AudioError::Decode(_))));
        assert!(!lib.contains("cancel"));
    }

    #[test]
    fn load_all_skips_failures() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("desc.wav");
        write_wav(&good, 16_000, 1, &[0; 160]);
        let bad = dir.path().join("missing.wav");

        let mut lib = library(&RecordingOutput::new());
        let n = lib.load_all([(names::DESCRIBE, good.as_path()), (names::HELPER, bad.as_path())]);

        assert_eq!(n, 1);
        assert!(lib.contains(names::DESCRIBE));
        assert!(!lib.contains(names::HELPER));
    }

    #[test]
    fn play_blocking_writes_whole_clip() {
        let out = RecordingOutput::new();
        let mut lib = library(&out);
        lib.insert(SoundAsset::new(names::PING, vec![0.1; 4410], 44_100));

        lib.play_blocking(names::PING).unwrap();

        let p = &out.playbacks()[0];
        assert_eq!(p.samples, 4410);
        assert!(p.drained);
        assert_eq!(out.open_count(), 0);
    }

    #[test]
    fn unknown_sound_is_not_an_error() {
        let out = RecordingOutput::new();
        let lib = library(&out);
        lib.play("nope");
        assert!(lib.play_blocking("nope").is_ok());
        assert!(out.playbacks().is_empty());
    }

    #[test]
    fn play_cancellable_stops_and_closes_device() {
        let out = RecordingOutput::paced(Duration::from_millis(5));
        let mut lib = library(&out);
        // 10 s clip, far longer than the test.
        lib.insert(SoundAsset::new(names::WAITING, vec![0.0; 160_000], 16_000));
        let lib = Arc::new(lib);

        let cancel = CancelFlag::new();
        let remote = cancel.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(40));
            remote.cancel();
        });

        let started = Instant::now();
        lib.play_cancellable(names::WAITING, &cancel).unwrap();

        assert!(started.elapsed() < Duration::from_secs(1));
        let p = &out.playbacks()[0];
        assert!(p.samples < 160_000);
        assert!(!p.drained);
        assert_eq!(out.open_count(), 0);
    }

    #[test]
    fn already_cancelled_never_opens_device() {
        let out = RecordingOutput::new();
        let mut lib = library(&out);
        lib.insert(SoundAsset::new(names::CANCEL, vec![0.0; 100], 16_000));

        let cancel = CancelFlag::new();
        cancel.cancel();
        lib.play_cancellable(names::CANCEL, &cancel).unwrap();
        assert!(out.playbacks().is_empty());
    }

    #[test]
    fn play_is_fire_and_forget() {
        let out = RecordingOutput::new();
        let mut lib = library(&out);
        lib.insert(SoundAsset::new(names::HELPER, vec![0.0; 100], 16_000));

        lib.play(names::HELPER);

        let deadline = Instant::now() + Duration::from_secs(2);
        while out.playbacks().first().map_or(true, |p| !p.drained) {
            assert!(Instant::now() < deadline);
            std::thread::sleep(Duration::from_millis(5));
        }
    }
}

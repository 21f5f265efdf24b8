//! Application settings structs, defaults and TOML persistence.
//!
//! Every section carries `#[serde(default)]`, so a `settings.toml` only needs
//! the keys it wants to change.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::audio::vad::EndpointSettings;
use crate::gpio::LineId;

use super::AppPaths;

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

/// Inference server endpoint and stream format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub base_url: String,
    /// Rate of the raw PCM the server streams back.
    pub sample_rate: u32,
    pub channels: u16,
    /// Bytes read from the response per playback write.
    pub chunk_bytes: usize,
    pub connect_timeout_secs: u64,
    /// Bound on waiting for the reply and on each body read.
    pub read_timeout_secs: u64,
    pub cancel_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://192.168.193.33:8000".into(),
            sample_rate: 24_000,
            channels: 1,
            chunk_bytes: 56,
            connect_timeout_secs: 5,
            read_timeout_secs: 30,
            cancel_timeout_secs: 2,
        }
    }
}

// ---------------------------------------------------------------------------
// GpioConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpioConfig {
    pub chip: String,
    /// Line offset of the Describe button.
    pub button_a: LineId,
    /// Line offset of the Chat button.
    pub button_b: LineId,
    pub debounce_ms: u64,
    /// Upper bound on one blocking edge wait (shutdown latency).
    pub wait_ms: u64,
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            chip: "/dev/gpiochip4".into(),
            button_a: 2,
            button_b: 3,
            debounce_ms: 20,
            wait_ms: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// SoundsConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundsConfig {
    /// Directory relative file names resolve against.  `None` means
    /// `<data dir>/sounds`.
    pub dir: Option<PathBuf>,
    /// Clip name → WAV file.
    pub files: BTreeMap<String, PathBuf>,
}

impl Default for SoundsConfig {
    fn default() -> Self {
        let files = [
            ("cancel", "cancel.wav"),
            ("desc", "desc.wav"),
            ("chat", "chat.wav"),
            ("helper", "helper.wav"),
            ("waiting", "waiting.wav"),
            ("no_internet", "internot.wav"),
        ]
        .into_iter()
        .map(|(name, file)| (name.to_string(), PathBuf::from(file)))
        .collect();

        Self { dir: None, files }
    }
}

impl SoundsConfig {
    /// `(name, absolute path)` for every configured clip.
    pub fn resolved(&self, paths: &AppPaths) -> Vec<(String, PathBuf)> {
        let dir = self.dir.clone().unwrap_or_else(|| paths.sounds_dir.clone());
        self.files
            .iter()
            .map(|(name, file)| (name.clone(), dir.join(file)))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// SpeechConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Whisper model id; resolves to `<models dir>/ggml-<id>.bin`.
    pub model: String,
    /// ISO-639-1 code, or `"auto"`.
    pub language: String,
    /// Samples per recogniser block.
    pub block_samples: usize,
    /// RMS level above which a frame counts as voice.
    pub vad_threshold: f32,
    pub end_silence_ms: u64,
    pub min_speech_ms: u64,
    /// Give up listening after this long without an utterance.
    pub max_listen_secs: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            model: "whisper-base.en".into(),
            language: "en".into(),
            block_samples: 8000,
            vad_threshold: 0.01,
            end_silence_ms: 800,
            min_speech_ms: 300,
            max_listen_secs: 12,
        }
    }
}

impl SpeechConfig {
    pub fn endpoint(&self) -> EndpointSettings {
        EndpointSettings {
            threshold: self.vad_threshold,
            min_speech: Duration::from_millis(self.min_speech_ms),
            end_silence: Duration::from_millis(self.end_silence_ms),
        }
    }

    pub fn max_listen(&self) -> Duration {
        Duration::from_secs(self.max_listen_secs)
    }
}

// ---------------------------------------------------------------------------
// CameraConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// File kept fresh by an external camera service.
    pub snapshot_path: Option<PathBuf>,
    /// Still-capture command writing a JPEG to stdout.
    pub command: Option<Vec<String>>,
    /// The capture command is killed after this long.
    pub timeout_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            command: None,
            timeout_ms: 5000,
        }
    }
}

// ---------------------------------------------------------------------------
// PromptConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    pub input_text: String,
    pub max_length: u32,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            input_text: "Use natural language suitable for conversion to speech.".into(),
            max_length: 40,
        }
    }
}

// ---------------------------------------------------------------------------
// RunnerConfig / WaitingConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Mailbox poll interval.
    pub poll_ms: u64,
    /// Time a cancelled worker gets before it is joined.
    pub grace_ms: u64,
    /// Delay after a task starts before presses count as cancel.
    pub settle_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            poll_ms: 10,
            grace_ms: 100,
            settle_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitingConfig {
    pub initial_delay_ms: u64,
    pub interval_ms: u64,
}

impl Default for WaitingConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 2000,
            interval_ms: 2000,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level configuration, serialised as `settings.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub gpio: GpioConfig,
    pub sounds: SoundsConfig,
    pub speech: SpeechConfig,
    pub camera: CameraConfig,
    pub prompt: PromptConfig,
    pub runner: RunnerConfig,
    pub waiting: WaitingConfig,
}

impl AppConfig {
    /// Load from the resolved `settings.toml`.  A missing file yields the
    /// defaults.
    pub fn load(paths: &AppPaths) -> Result<Self> {
        Self::load_from(&paths.settings_file)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trip_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.toml");

        let mut original = AppConfig::default();
        original.server.base_url = "http://10.0.0.5:9000".into();
        original.camera.command = Some(vec!["rpicam-still".into(), "-o".into(), "-".into()]);
        original.prompt.max_length = 25;
        original.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().unwrap();
        let config = AppConfig::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(
            &path,
            "[prompt]\nmax_length = 15\n\n[gpio]\nchip = \"/dev/gpiochip0\"\n",
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.prompt.max_length, 15);
        assert_eq!(config.prompt.input_text, PromptConfig::default().input_text);
        assert_eq!(config.gpio.chip, "/dev/gpiochip0");
        assert_eq!(config.gpio.button_a, 2);
        assert_eq!(config.server.chunk_bytes, 56);
        assert_eq!(config.camera.timeout_ms, 5000);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "[prompt\nmax_length = ").unwrap();
        assert!(AppConfig::load_from(&path).is_err());
    }

    #[test]
    fn sounds_resolve_against_dir() {
        let paths = AppPaths::with_root(Path::new("/var/lib/voice-lens"));
        let mut sounds = SoundsConfig::default();

        let resolved = sounds.resolved(&paths);
        assert_eq!(resolved.len(), 6);
        assert!(resolved.contains(&(
            "no_internet".to_string(),
            PathBuf::from("/var/lib/voice-lens/sounds/internot.wav")
        )));

        sounds.dir = Some(PathBuf::from("/opt/sounds"));
        assert!(sounds
            .resolved(&paths)
            .iter()
            .all(|(_, p)| p.starts_with("/opt/sounds")));
    }

    #[test]
    fn speech_durations() {
        let speech = SpeechConfig::default();
        assert_eq!(speech.max_listen(), Duration::from_secs(12));
        assert_eq!(speech.endpoint().end_silence, Duration::from_millis(800));
    }
}

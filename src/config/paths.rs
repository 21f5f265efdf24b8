//! Application paths using the `dirs` crate.
//!
//! Linux layout:
//!
//!   ~/.config/voice-lens/settings.toml
//!   ~/.local/share/voice-lens/models/ggml-*.bin
//!   ~/.local/share/voice-lens/sounds/*.wav
//!
//! `VOICE_LENS_CONFIG` overrides the settings file location.

use std::path::{Path, PathBuf};

/// Environment variable naming an explicit `settings.toml`.
pub const CONFIG_ENV: &str = "VOICE_LENS_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub settings_file: PathBuf,
    /// Directory for GGML model files.
    pub models_dir: PathBuf,
    /// Default directory for notification clips.
    pub sounds_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "voice-lens";

    /// Resolve from the platform directories, honouring [`CONFIG_ENV`].
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let settings_file = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| config_dir.join("settings.toml"));

        Self {
            settings_file,
            models_dir: data_dir.join("models"),
            sounds_dir: data_dir.join("sounds"),
        }
    }

    /// Everything under one directory (`root/settings.toml`, `root/models`,
    /// `root/sounds`).
    pub fn with_root(root: &Path) -> Self {
        Self {
            settings_file: root.join("settings.toml"),
            models_dir: root.join("models"),
            sounds_dir: root.join("sounds"),
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_non_empty() {
        let paths = AppPaths::new();
        assert!(paths.models_dir.ends_with("voice-lens/models"));
        assert!(paths.sounds_dir.ends_with("voice-lens/sounds"));
        assert!(paths
            .settings_file
            .extension()
            .is_some_and(|e| e == "toml"));
    }

    #[test]
    fn with_root_nests_everything() {
        let paths = AppPaths::with_root(Path::new("/srv/lens"));
        assert_eq!(paths.settings_file, PathBuf::from("/srv/lens/settings.toml"));
        assert_eq!(paths.models_dir, PathBuf::from("/srv/lens/models"));
        assert_eq!(paths.sounds_dir, PathBuf::from("/srv/lens/sounds"));
    }
}

//! Configuration: `settings.toml` structs, paths, and the live Describe
//! prompt.

pub mod paths;
pub mod prompt;
pub mod settings;

pub use paths::{AppPaths, CONFIG_ENV};
pub use prompt::{describe_prompt, PromptWatcher, SharedPrompt};
pub use settings::{
    AppConfig, CameraConfig, GpioConfig, PromptConfig, RunnerConfig, ServerConfig, SoundsConfig,
    SpeechConfig, WaitingConfig,
};

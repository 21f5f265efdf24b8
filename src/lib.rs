//! Voice Lens: button-driven scene description and voice chat.
//!
//! Two physical buttons drive the appliance:
//!
//! * **Button A** captures a frame and asks the inference server to describe
//!   it; the spoken reply is streamed back and played as it arrives.
//! * **Button B** listens for a spoken question, then streams the server's
//!   spoken answer about the current frame.
//!
//! Any further press cancels whatever is running, locally and on the server.
//!
//! # Module map
//!
//! ```text
//! gpio::EdgeWatcher ──▶ gpio::EventMailbox ──▶ pipeline::InteractionMachine
//!                                                   │
//!                              pipeline::TaskRunner ┼─▶ remote::AudioStreamClient
//!                                                   ├─▶ stt::SpeechSession
//!                                                   └─▶ audio::SoundLibrary
//! ```

pub mod audio;
pub mod camera;
pub mod config;
pub mod error;
pub mod gpio;
pub mod lifecycle;
pub mod pipeline;
pub mod remote;
pub mod stt;

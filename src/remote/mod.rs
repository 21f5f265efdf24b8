//! Inference server client: streamed spoken replies and server-side cancel.

pub mod cancel;
pub mod error;
pub mod stream;

pub use cancel::{CancelNotifier, HttpCancelNotifier};
pub use error::StreamError;
pub use stream::{AudioStreamClient, RemoteAudio, StreamReport, StreamSettings};

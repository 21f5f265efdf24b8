//! Button input: kernel edge events → ordered mailbox.
//!
//! ```text
//! /dev/gpiochipN ──(debounced edges)──▶ EdgeWatcher thread
//!                                          │ append
//!                                          ▼
//!                                     EventMailbox ◀── count / take / clear ── state machine
//! ```

pub mod event;
pub mod mailbox;
pub mod source;
pub mod watcher;

pub use event::{ButtonEvent, Edge, LineId};
pub use mailbox::EventMailbox;
pub use source::{CdevEdgeSource, EdgeSource, GpioError};
pub use watcher::EdgeWatcher;

//! Interaction states.

use std::fmt;

/// What the appliance is doing.  Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InteractionState {
    /// Waiting for a button press.
    #[default]
    Idle,
    /// Describing the current camera frame (button A).
    Describe,
    /// Listening for a question, then answering it (button B).
    Chat,
}

impl fmt::Display for InteractionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            InteractionState::Idle => "Idle",
            InteractionState::Describe => "Describe",
            InteractionState::Chat => "Chat",
        };
        f.write_str(label)
    }
}

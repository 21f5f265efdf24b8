//! Normalised button edge events.

use std::fmt;

/// Offset of a monitored line on the GPIO chip.
pub type LineId = u32;

/// Direction of a hardware transition.
///
/// The buttons pull their line low while held, so a press arrives as
/// [`Edge::Falling`] and a release as [`Edge::Rising`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    Rising,
    Falling,
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edge::Rising => write!(f, "Rising"),
            Edge::Falling => write!(f, "Falling"),
        }
    }
}

/// One debounced edge on a monitored line, in arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub line: LineId,
    pub edge: Edge,
    /// Sequence number reported by the kernel for this request.
    pub sequence: u64,
}

impl ButtonEvent {
    pub fn new(line: LineId, edge: Edge, sequence: u64) -> Self {
        Self {
            line,
            edge,
            sequence,
        }
    }

    /// `true` for a press (falling edge) on any of `lines`.
    pub fn is_press_on(&self, lines: &[LineId]) -> bool {
        self.edge == Edge::Falling && lines.contains(&self.line)
    }
}

impl fmt::Display for ButtonEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {} {} #{}", self.line, self.edge, self.sequence)
    }
}

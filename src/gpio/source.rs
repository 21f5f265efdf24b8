//! Hardware edge source backed by the Linux GPIO character device.
//!
//! The kernel does the debouncing (`debounce_period`), so every event read
//! here is already a clean press or release.  [`EdgeSource`] is the seam the
//! watcher consumes; tests drive the watcher with a scripted source.

use std::path::{Path, PathBuf};
use std::time::Duration;

use gpiocdev::line::{EdgeDetection, EdgeKind};
use gpiocdev::Request;
use thiserror::Error;

use crate::error::Fault;

use super::event::{ButtonEvent, Edge, LineId};

/// Consumer label shown by `gpioinfo` for the requested lines.
const CONSUMER: &str = "voice-lens";

// ---------------------------------------------------------------------------
// GpioError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum GpioError {
    #[error("failed to request lines {lines:?} on {chip}: {reason}")]
    Request {
        chip: String,
        lines: Vec<LineId>,
        reason: String,
    },

    /// A wait or read on the line request failed; may succeed on retry.
    #[error("edge read failed: {0}")]
    Read(String),

    /// The line request is unusable.
    #[error("edge source lost: {0}")]
    Lost(String),
}

impl GpioError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GpioError::Read(_))
    }
}

/// Errno texts meaning the request's file descriptor is no longer usable.
const LOST_ERRNOS: [&str; 4] = [
    "No such device",
    "(os error 19)",
    "Bad file descriptor",
    "(os error 9)",
];

/// Sort a failed wait/read into retryable or fatal.
///
/// A chip that was unplugged (its device node is gone, or the kernel
/// reports ENODEV/EBADF) is lost; anything else is retried.
fn classify(node: &Path, reason: String) -> GpioError {
    if !node.exists() || LOST_ERRNOS.iter().any(|e| reason.contains(e)) {
        GpioError::Lost(format!("{}: {reason}", node.display()))
    } else {
        GpioError::Read(reason)
    }
}

/// Device node for a chip given as a path or as a bare name.
fn chip_node(chip: &str) -> PathBuf {
    let path = Path::new(chip);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        Path::new("/dev").join(chip)
    }
}

impl From<GpioError> for Fault {
    fn from(e: GpioError) -> Self {
        Fault::Hardware(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// EdgeSource
// ---------------------------------------------------------------------------

/// Blocking producer of debounced edge events.
pub trait EdgeSource: Send {
    /// Wait at most `timeout` for edges and return everything available.
    ///
    /// An empty vector means the wait timed out.
    fn wait_edges(&mut self, timeout: Duration) -> Result<Vec<ButtonEvent>, GpioError>;
}

// ---------------------------------------------------------------------------
// CdevEdgeSource
// ---------------------------------------------------------------------------

/// Both-edge line request on a GPIO chip.
pub struct CdevEdgeSource {
    request: Request,
    node: PathBuf,
}

impl CdevEdgeSource {
    /// Request `lines` on `chip` with both-edge detection and kernel
    /// debouncing.
    pub fn open(chip: &str, lines: &[LineId], debounce: Duration) -> Result<Self, GpioError> {
        let request = Request::builder()
            .on_chip(chip)
            .with_consumer(CONSUMER)
            .with_lines(lines)
            .with_edge_detection(EdgeDetection::BothEdges)
            .with_debounce_period(debounce)
            .request()
            .map_err(|e| GpioError::Request {
                chip: chip.to_string(),
                lines: lines.to_vec(),
                reason: e.to_string(),
            })?;

        log::info!("requested lines {lines:?} on {chip} (debounce {debounce:?})");
        Ok(Self {
            request,
            node: chip_node(chip),
        })
    }

    fn fail(&self, e: gpiocdev::Error) -> GpioError {
        classify(&self.node, e.to_string())
    }

    fn read_one(&self) -> Result<ButtonEvent, GpioError> {
        let event = self
            .request
            .read_edge_event()
            .map_err(|e| self.fail(e))?;
        let edge = match event.kind {
            EdgeKind::Rising => Edge::Rising,
            EdgeKind::Falling => Edge::Falling,
        };
        Ok(ButtonEvent::new(event.offset, edge, u64::from(event.line_seqno)))
    }
}

impl EdgeSource for CdevEdgeSource {
    fn wait_edges(&mut self, timeout: Duration) -> Result<Vec<ButtonEvent>, GpioError> {
        let ready = self
            .request
            .wait_edge_event(timeout)
            .map_err(|e| self.fail(e))?;
        if !ready {
            return Ok(Vec::new());
        }

        let mut events = vec![self.read_one()?];
        while self
            .request
            .has_edge_event()
            .map_err(|e| self.fail(e))?
        {
            events.push(self.read_one()?);
        }
        Ok(events)
    }
}

//! Visual context for Describe and Chat.
//!
//! The camera itself is run by something else (a capture service keeping a
//! snapshot file fresh, or a still-capture command).  [`FrameSource`] just
//! fetches the latest encoded frame.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::config::CameraConfig;
use crate::pipeline::CancelFlag;

/// How often a running capture command is checked for exit or cancel.
const CHILD_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("failed to read snapshot {path}: {source}")]
    Snapshot {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("capture command failed: {0}")]
    Command(String),

    #[error("no camera configured")]
    NotConfigured,

    #[error("camera returned an empty frame")]
    Empty,
}

pub trait FrameSource: Send + Sync {
    /// Latest encoded frame (JPEG or PNG).  Gives up once `cancel` is set.
    fn capture(&self, cancel: &CancelFlag) -> Result<Vec<u8>, CameraError>;
}

fn non_empty(bytes: Vec<u8>) -> Result<Vec<u8>, CameraError> {
    if bytes.is_empty() {
        Err(CameraError::Empty)
    } else {
        Ok(bytes)
    }
}

/// Reads a file an external camera service overwrites continuously.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl FrameSource for SnapshotFile {
    fn capture(&self, _cancel: &CancelFlag) -> Result<Vec<u8>, CameraError> {
        let bytes = std::fs::read(&self.path).map_err(|source| CameraError::Snapshot {
            path: self.path.clone(),
            source,
        })?;
        non_empty(bytes)
    }
}

/// Runs a still-capture command and takes the image from its stdout,
/// e.g. `["rpicam-still", "-n", "-o", "-"]`.
///
/// The child is killed if it outlives `timeout` or the capture is cancelled.
#[derive(Debug, Clone)]
pub struct CaptureCommand {
    argv: Vec<String>,
    timeout: Duration,
}

impl CaptureCommand {
    pub fn new(argv: Vec<String>, timeout: Duration) -> Self {
        Self { argv, timeout }
    }
}

fn kill(child: &mut Child, program: &str) {
    if let Err(e) = child.kill() {
        log::debug!("failed to kill {program}: {e}");
    }
    // Reap it so no zombie is left behind.
    let _ = child.wait();
}

impl FrameSource for CaptureCommand {
    fn capture(&self, cancel: &CancelFlag) -> Result<Vec<u8>, CameraError> {
        let (program, args) = self.argv.split_first().ok_or(CameraError::NotConfigured)?;
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| CameraError::Command(format!("{program}: {e}")))?;

        // Drained on its own thread so a large frame cannot fill the pipe
        // and stall the child.
        let Some(mut stdout) = child.stdout.take() else {
            kill(&mut child, program);
            return Err(CameraError::Command(format!("{program}: stdout not captured")));
        };
        let reader = std::thread::Builder::new()
            .name("camera-stdout".into())
            .spawn(move || {
                let mut frame = Vec::new();
                stdout.read_to_end(&mut frame).map(|_| frame)
            });
        let reader = match reader {
            Ok(handle) => handle,
            Err(e) => {
                kill(&mut child, program);
                return Err(CameraError::Command(format!("{program}: {e}")));
            }
        };

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(e) => {
                    kill(&mut child, program);
                    return Err(CameraError::Command(format!("{program}: {e}")));
                }
            }
            if cancel.is_cancelled() {
                kill(&mut child, program);
                return Err(CameraError::Command(format!("{program} cancelled")));
            }
            if Instant::now() >= deadline {
                kill(&mut child, program);
                return Err(CameraError::Command(format!(
                    "{program} timed out after {} ms",
                    self.timeout.as_millis()
                )));
            }
            std::thread::sleep(CHILD_POLL);
        };

        if !status.success() {
            return Err(CameraError::Command(format!("{program} exited with {status}")));
        }
        let frame = reader
            .join()
            .map_err(|_| CameraError::Command(format!("{program}: stdout reader panicked")))?
            .map_err(|e| CameraError::Command(format!("{program}: {e}")))?;
        non_empty(frame)
    }
}

/// No camera attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCamera;

impl FrameSource for NoCamera {
    fn capture(&self, _cancel: &CancelFlag) -> Result<Vec<u8>, CameraError> {
        Err(CameraError::NotConfigured)
    }
}

/// Pick the provider the config asks for.  A capture command wins over a
/// snapshot path.
pub fn from_config(config: &CameraConfig) -> Box<dyn FrameSource> {
    if let Some(argv) = config.command.as_ref().filter(|a| !a.is_empty()) {
        log::info!("camera: capture command {argv:?}");
        return Box::new(CaptureCommand::new(
            argv.clone(),
            Duration::from_millis(config.timeout_ms),
        ));
    }
    if let Some(path) = &config.snapshot_path {
        log::info!("camera: snapshot file {}", path.display());
        return Box::new(SnapshotFile::new(path.clone()));
    }
    log::warn!("camera: none configured, requests will carry no image");
    Box::new(NoCamera)
}

use thiserror::Error;

use crate::error::Fault;

/// Failures talking to the inference server.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("request timed out")]
    Timeout,

    #[error("server returned HTTP {0}")]
    Status(u16),

    #[error("stream interrupted: {0}")]
    Body(String),
}

impl From<reqwest::Error> for StreamError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            StreamError::Timeout
        } else {
            StreamError::Request(e.to_string())
        }
    }
}

impl From<StreamError> for Fault {
    fn from(e: StreamError) -> Self {
        Fault::Network(e.to_string())
    }
}

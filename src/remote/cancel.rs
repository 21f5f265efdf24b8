//! Server-side cancellation.
//!
//! `POST {base}/cancel` with no body asks the server to abandon the job it
//! is streaming.  Best effort: the response is ignored and a failure is only
//! reported back to the caller for logging.

use std::time::Duration;

use async_trait::async_trait;

use super::error::StreamError;

#[async_trait]
pub trait CancelNotifier: Send + Sync {
    async fn notify(&self, url: &str) -> Result<(), StreamError>;
}

/// [`CancelNotifier`] backed by an async `reqwest` client.
pub struct HttpCancelNotifier {
    client: reqwest::Client,
}

impl HttpCancelNotifier {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }
}

#[async_trait]
impl CancelNotifier for HttpCancelNotifier {
    async fn notify(&self, url: &str) -> Result<(), StreamError> {
        let response = self.client.post(url).send().await?;
        log::debug!("cancel POST {url} -> {}", response.status());
        Ok(())
    }
}

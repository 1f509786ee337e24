//! Issues the benchmark requests against the target over HTTP.

use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode, Url, Version};
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a single request attempt did not produce a measurement.
#[derive(Debug, Error)]
pub enum RequestError {
    /// Connecting, sending, or reading the body failed.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("unexpected status: {0}")]
    Status(StatusCode),

    /// The request did not complete within the configured timeout.
    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    /// The run was cancelled while the request was in flight.
    #[error("cancelled")]
    Cancelled,
}

/// The measured outcome of one request attempt.
#[derive(Debug)]
pub enum Sample {
    /// The request succeeded and its body was fully drained.
    Success {
        /// Wall-clock time from issuing the request until the body was drained.
        latency: Duration,
        /// Number of response bytes received, head and body.
        bytes: u64,
    },
    /// The attempt failed and contributes nothing but a completion.
    Failure(RequestError),
}

/// Performs GET requests against a single target URL.
///
/// The executor is shared by all connections of a run. The underlying [`Client`] keeps a
/// connection pool internally and is never reconfigured after construction.
#[derive(Debug, Clone)]
pub struct RequestExecutor {
    client: Client,
    url: Url,
    timeout: Duration,
}

impl RequestExecutor {
    /// Creates an executor that sends its requests through `client`.
    pub fn new(client: Client, url: Url, timeout: Duration) -> Self {
        Self {
            client,
            url,
            timeout,
        }
    }

    /// Returns the target URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Sends one GET request and drains the response.
    ///
    /// The whole exchange, including reading the body, is bounded by the timeout. Failures are
    /// never retried.
    pub async fn execute(&self, cancel: &CancellationToken) -> Sample {
        let start = Instant::now();

        let result = tokio::select! {
            result = tokio::time::timeout(self.timeout, self.fetch()) => match result {
                Ok(result) => result,
                Err(_) => Err(RequestError::TimedOut(self.timeout)),
            },
            _ = cancel.cancelled() => Err(RequestError::Cancelled),
        };

        match result {
            Ok(bytes) => Sample::Success {
                latency: start.elapsed(),
                bytes,
            },
            Err(err) => {
                tracing::debug!(url = %self.url, "request failed: {err}");
                Sample::Failure(err)
            }
        }
    }

    async fn fetch(&self) -> Result<u64, RequestError> {
        let mut response = self.client.get(self.url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RequestError::Status(status));
        }

        // Read chunk by chunk so nothing is buffered and the connection can be reused.
        let mut bytes = head_len(response.version(), status, response.headers());
        while let Some(chunk) = response.chunk().await? {
            bytes += chunk.len() as u64;
        }

        Ok(bytes)
    }
}

/// Size of the response head as it appears in HTTP/1.1 framing.
///
/// The client does not expose the raw bytes read from the socket, so the head is re-serialized
/// from the parsed status line and headers. For HTTP/2 this overestimates the compressed size.
fn head_len(version: Version, status: StatusCode, headers: &HeaderMap) -> u64 {
    let status_line = format!("{version:?} {status}\r\n").len();
    let fields: usize = headers
        .iter()
        .map(|(name, value)| name.as_str().len() + value.len() + 4)
        .sum();

    (status_line + fields + 2) as u64
}

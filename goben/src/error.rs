//! Error types of the engine.

use thiserror::Error;

/// Errors that can occur while setting up or running a benchmark.
#[derive(Debug, Error)]
pub enum Error {
    /// The target URL is empty, malformed, or does not use `http`/`https`.
    #[error("invalid target url `{url}`: {reason}")]
    InvalidUrl {
        /// The URL as it was passed in.
        url: String,
        /// Why the URL was rejected.
        reason: String,
    },

    /// At least one connection is required to make progress.
    #[error("concurrency must be at least 1")]
    ZeroConcurrency,

    /// The HTTP client could not be constructed.
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),

    /// A worker or the rate meter died unexpectedly.
    ///
    /// The run is aborted in this case instead of reporting statistics that silently miss
    /// completions.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Internal(err.to_string())
    }
}

/// Result type for fallible engine operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

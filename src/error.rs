//! Error types for fetching and configuration.
//!
//! Extraction misses and date-parse fallbacks are not errors:
//! a block without a title or link simply produces no item, and an
//! unrecognised date string is passed through unchanged.

use thiserror::Error;

/// Failure of a single [`Fetcher::fetch`](crate::fetcher::Fetcher::fetch) call.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The URL could not be parsed or has no host.
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The domain is on the configured skip list; no request was made.
    #[error("skipping {url}: domain {domain} is on the skip list")]
    Skipped { url: String, domain: String },

    /// Connection failure or timeout.
    #[error("transport error for {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Non-success status that is not retried under the status policy.
    #[error("unexpected status {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    /// Every allowed attempt failed with a retryable condition.
    #[error("exhausted {attempts} attempts for {url}; last failure: {last}")]
    ExhaustedRetries {
        url: String,
        attempts: u32,
        #[source]
        last: Box<FetchError>,
    },

    /// The 200 response body could not be read as text.
    #[error("failed to decode body from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Shutdown was requested before or during the call.
    #[error("fetch of {url} cancelled by shutdown")]
    Cancelled { url: String },

    /// The underlying HTTP client could not be built.
    #[error("failed to build http client: {0}")]
    ClientBuild(#[source] reqwest::Error),
}

impl FetchError {
    /// Status code observed for this failure, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::HttpStatus { status, .. } => Some(*status),
            FetchError::ExhaustedRetries { last, .. } => last.status(),
            FetchError::Transport { source, .. } | FetchError::Decode { source, .. } => {
                source.status().map(|s| s.as_u16())
            }
            _ => None,
        }
    }
}

/// Failure while loading or validating a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

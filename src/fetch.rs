//! Image download over HTTP

use crate::config::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_FETCH_TIMEOUT};
use crate::error::{RemovalError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Retrieves the raw bytes behind an image URL
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Download the full response body
    ///
    /// # Errors
    /// - Network failure, non-success HTTP status or timeout, all reported
    ///   as [`RemovalError::Fetch`]
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>>;
}

/// [`ImageFetcher`] backed by a shared `reqwest` client
///
/// No caching and no retries. The whole body is buffered in memory.
#[derive(Debug, Clone)]
pub struct HttpImageFetcher {
    client: Client,
}

impl HttpImageFetcher {
    /// Create a fetcher with the default timeouts
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn new() -> Result<Self> {
        Self::with_timeouts(DEFAULT_FETCH_TIMEOUT, DEFAULT_CONNECT_TIMEOUT)
    }

    /// Create a fetcher with explicit request and connect timeouts
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn with_timeouts(timeout: Duration, connect_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RemovalError::network_error("Failed to create HTTP client", e))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| describe_failure(url, &e))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| describe_failure(url, &e))?;

        debug!(url = %url, bytes = bytes.len(), "Fetched image");
        Ok(bytes.to_vec())
    }
}

fn describe_failure(url: &Url, error: &reqwest::Error) -> RemovalError {
    let reason = if error.is_timeout() {
        "request timed out".to_string()
    } else if let Some(status) = error.status() {
        format!("HTTP {}", status)
    } else if error.is_connect() {
        "connection failed".to_string()
    } else {
        error.to_string()
    };

    RemovalError::network_error(url.as_str(), reason)
}

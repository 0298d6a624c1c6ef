//! Error types for background removal requests

use thiserror::Error;

/// Result type alias for background removal operations
pub type Result<T> = std::result::Result<T, RemovalError>;

/// Error types for every stage of a removal request
#[derive(Error, Debug)]
pub enum RemovalError {
    /// The request body did not carry a usable `image_url`
    #[error("{0}")]
    InvalidRequest(String),

    /// Downloading the source image failed (network, HTTP status, timeout)
    #[error("Failed to fetch image: {0}")]
    Fetch(String),

    /// The downloaded bytes are not a decodable raster image
    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    /// Backend inference errors
    #[error("Inference error: {0}")]
    Inference(String),

    /// Pre- or post-processing around the model
    #[error("Processing error: {0}")]
    Processing(String),

    /// PNG or base64 encoding of the result
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Model resolution, download or loading errors
    #[error("Model error: {0}")]
    Model(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unexpected internal fault; surfaced as HTTP 500
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RemovalError {
    /// Create a new invalid request error
    pub fn invalid_request<S: Into<String>>(msg: S) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create a new fetch error
    pub fn fetch<S: Into<String>>(msg: S) -> Self {
        Self::Fetch(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new processing error
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    /// Create a new encoding error
    pub fn encoding<S: Into<String>>(msg: S) -> Self {
        Self::Encoding(msg.into())
    }

    /// Create a new model error
    pub fn model<S: Into<String>>(msg: S) -> Self {
        Self::Model(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create network error with request context
    pub fn network_error<S: Into<String>, E: std::fmt::Display>(context: S, error: E) -> Self {
        Self::Fetch(format!("{}: {}", context.into(), error))
    }

    /// Whether this error escapes the per-request boundary.
    ///
    /// Everything except [`RemovalError::Internal`] is an expected failure
    /// reported in the response body with HTTP 200.
    #[must_use]
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Internal(_))
    }
}

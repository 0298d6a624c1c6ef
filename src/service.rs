//! Request orchestration: parse, fetch, remove, encode
//!
//! [`RemovalService`] turns a raw `/rembg` request body into a
//! [`RemovalResponse`]. Expected failures become an `"error"` response;
//! only internal faults are returned as `Err` so the HTTP layer can answer
//! with a 500.

use crate::encoding::encode_png_base64;
use crate::error::{RemovalError, Result};
use crate::fetch::ImageFetcher;
use crate::remover::BackgroundRemover;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};
use url::Url;
use uuid::Uuid;

/// Message returned when the body has no usable `image_url`
pub const MISSING_IMAGE_URL: &str = "image_url is required";

/// Body of a `/rembg` response
///
/// Serialized with an internal `status` tag, so the only possible shapes are
/// `{"status":"success","image_base64":...}` and
/// `{"status":"error","message":...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RemovalResponse {
    Success { image_base64: String },
    Error { message: String },
}

impl RemovalResponse {
    #[must_use]
    pub fn success(image_base64: String) -> Self {
        Self::Success { image_base64 }
    }

    #[must_use]
    pub fn error(err: &RemovalError) -> Self {
        Self::Error {
            message: err.to_string(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Stages of one removal request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    Received,
    Fetching,
    Processing,
    Encoding,
    Responded,
}

impl ProcessingStage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Fetching => "fetching",
            Self::Processing => "processing",
            Self::Encoding => "encoding",
            Self::Responded => "responded",
        }
    }
}

impl fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn enter_stage(stage: ProcessingStage) {
    debug!(stage = %stage, "Request stage");
}

/// Extract and validate `image_url` from a raw JSON request body
///
/// # Errors
/// - Body is not JSON
/// - `image_url` missing or not a string
/// - `image_url` is not an absolute `http`/`https` URL
pub fn parse_image_url(body: &[u8]) -> Result<Url> {
    let value: serde_json::Value = serde_json::from_slice(body).map_err(|e| {
        RemovalError::invalid_request(format!("request body is not valid JSON: {e}"))
    })?;

    let raw = value
        .get("image_url")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| RemovalError::invalid_request(MISSING_IMAGE_URL))?;

    let url = Url::parse(raw)
        .map_err(|e| RemovalError::invalid_request(format!("invalid image_url '{raw}': {e}")))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(RemovalError::invalid_request(format!(
            "invalid image_url '{raw}': unsupported scheme '{scheme}'"
        ))),
    }
}

/// Runs the fetch, remove and encode pipeline for each request
#[derive(Clone)]
pub struct RemovalService {
    fetcher: Arc<dyn ImageFetcher>,
    remover: Arc<dyn BackgroundRemover>,
    log_payloads: bool,
}

impl fmt::Debug for RemovalService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemovalService")
            .field("model", &self.remover.model_name())
            .field("log_payloads", &self.log_payloads)
            .finish_non_exhaustive()
    }
}

impl RemovalService {
    #[must_use]
    pub fn new(fetcher: Arc<dyn ImageFetcher>, remover: Arc<dyn BackgroundRemover>) -> Self {
        Self {
            fetcher,
            remover,
            log_payloads: false,
        }
    }

    /// Emit the base64 result at DEBUG level
    #[must_use]
    pub fn with_payload_logging(mut self, enabled: bool) -> Self {
        self.log_payloads = enabled;
        self
    }

    /// Name of the model behind the remover
    #[must_use]
    pub fn model_name(&self) -> String {
        self.remover.model_name()
    }

    /// Handle one `/rembg` request body
    ///
    /// # Errors
    /// - Internal faults only ([`RemovalError::is_fault`]); every expected
    ///   failure is returned as [`RemovalResponse::Error`]
    pub async fn handle(&self, body: &[u8]) -> Result<RemovalResponse> {
        let span = info_span!(
            "rembg_request",
            request_id = %Uuid::new_v4(),
            image_url = tracing::field::Empty,
        );
        self.handle_in_span(body).instrument(span).await
    }

    async fn handle_in_span(&self, body: &[u8]) -> Result<RemovalResponse> {
        enter_stage(ProcessingStage::Received);

        let url = match parse_image_url(body) {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "Rejected request");
                enter_stage(ProcessingStage::Responded);
                return Ok(RemovalResponse::error(&e));
            },
        };
        Span::current().record("image_url", url.as_str());

        let response = match self.remove_from_url(&url).await {
            Ok(image_base64) => {
                info!(encoded_len = image_base64.len(), "Background removed");
                if self.log_payloads {
                    debug!(image_base64 = %image_base64, "Encoded result");
                }
                RemovalResponse::success(image_base64)
            },
            Err(e) if e.is_fault() => {
                error!(url = %url, error = %e, "Internal fault while processing request");
                return Err(e);
            },
            Err(e) => {
                warn!(url = %url, error = %e, "Background removal failed");
                RemovalResponse::error(&e)
            },
        };

        enter_stage(ProcessingStage::Responded);
        Ok(response)
    }

    /// Fetch an image, remove its background and return the base64 PNG
    ///
    /// Decoding, inference and encoding run on the blocking thread pool.
    ///
    /// # Errors
    /// - [`RemovalError::Fetch`] when the download fails
    /// - [`RemovalError::Decode`] when the bytes are not an image
    /// - Backend and encoding errors
    /// - [`RemovalError::Internal`] when the worker task panics
    pub async fn remove_from_url(&self, url: &Url) -> Result<String> {
        enter_stage(ProcessingStage::Fetching);
        let bytes = self.fetcher.fetch(url).await?;

        enter_stage(ProcessingStage::Processing);
        let remover = Arc::clone(&self.remover);
        let span = Span::current();

        tokio::task::spawn_blocking(move || -> Result<String> {
            let _entered = span.enter();
            let image = image::load_from_memory(&bytes)?;
            debug!(width = image.width(), height = image.height(), "Decoded image");
            let result = remover.remove(image)?;

            enter_stage(ProcessingStage::Encoding);
            encode_png_base64(&result)
        })
        .await
        .map_err(|e| RemovalError::internal(format!("image processing task failed: {e}")))?
    }
}

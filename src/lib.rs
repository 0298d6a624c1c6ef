#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # rembg server
//!
//! An HTTP service that removes the background of an image referenced by
//! URL and returns the result as a base64-encoded PNG.
//!
//! ## Features
//!
//! - **`POST /rembg`**: `{"image_url": "..."}` in, `{"status": "success", "image_base64": "..."}`
//!   or `{"status": "error", "message": "..."}` out, always with HTTP 200
//! - **Fault boundary**: anything unexpected becomes HTTP 500 `{"detail": "..."}`
//! - **Models**: u2net, u2netp, silueta and isnet-general-use, downloaded and cached on first use
//! - **Backends**: ONNX Runtime (CUDA, `CoreML`, CPU) and Tract (pure Rust)
//! - **Upload page**: `GET /` renders `templates/index.html`, `GET /static/*` serves assets
//!
//! ## Library usage
//!
//! The pipeline is assembled from two capabilities, an [`ImageFetcher`] and
//! a [`BackgroundRemover`], so the HTTP surface can run against any model:
//!
//! ```rust,no_run
//! use rembg_server::{
//!     BackgroundRemovalProcessor, HttpImageFetcher, ModelManager, ModelRemover,
//!     RemovalConfig, RemovalService, SegmentationModel,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let manager = ModelManager::new(SegmentationModel::U2net, "/models/u2net.onnx")?;
//! let mut processor = BackgroundRemovalProcessor::new(RemovalConfig::default(), manager)?;
//! processor.initialize()?;
//!
//! let service = RemovalService::new(
//!     Arc::new(HttpImageFetcher::new()?),
//!     Arc::new(ModelRemover::new(processor)?),
//! );
//! let response = service.handle(br#"{"image_url": "https://example.com/cat.jpg"}"#).await?;
//! assert!(response.is_success());
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime backend with GPU acceleration support
//! - `tract` (default): Pure Rust backend
//! - `cli` (default): the `rembg-server` binary, logging setup and download progress bars
//! - `webp-support` (default): WebP input decoding

pub mod backends;
pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod download;
pub mod encoding;
pub mod error;
pub mod fetch;
pub mod inference;
pub mod models;
pub mod processor;
pub mod remover;
pub mod server;
pub mod service;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod utils;

pub use backends::*;
pub use cache::{format_size, ModelCache};
pub use config::{
    parse_provider_string, BackendType, ExecutionProvider, RemovalConfig, ServerConfig,
};
pub use download::ModelDownloader;
pub use encoding::{encode_png, encode_png_base64};
pub use error::{RemovalError, Result};
pub use fetch::{HttpImageFetcher, ImageFetcher};
pub use inference::InferenceBackend;
pub use models::{ModelInfo, ModelManager, PreprocessingConfig, SegmentationModel};
pub use processor::{
    apply_background_removal, tensor_to_mask, BackendFactory, BackgroundRemovalProcessor,
    DefaultBackendFactory,
};
pub use remover::{BackgroundRemover, ModelRemover};
pub use server::{router, AppState};
pub use service::{parse_image_url, ProcessingStage, RemovalResponse, RemovalService};
pub use utils::ImagePreprocessor;

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, spans, TracingConfig, TracingFormat};

//! Model downloading for the rembg model releases
//!
//! Models are fetched once into the [`ModelCache`] with progress reporting,
//! optional SHA-256 verification and an atomic rename into place.

use crate::cache::{format_size, ModelCache};
use crate::error::{RemovalError, Result};
use crate::models::SegmentationModel;
use futures_util::stream::TryStreamExt;
#[cfg(feature = "cli")]
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;
use tracing::{debug, info, info_span, warn, Instrument};

/// Progress bar abstraction that works with and without CLI features
#[derive(Debug)]
pub enum ProgressIndicator {
    #[cfg(feature = "cli")]
    Indicatif(ProgressBar),
    NoOp,
}

impl ProgressIndicator {
    /// Set message for progress indicator
    pub fn set_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_message(msg),
            Self::NoOp => {
                let _ = msg;
            },
        }
    }

    /// Set length for progress indicator
    pub fn set_length(&self, len: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_length(len),
            Self::NoOp => {
                let _ = len;
            },
        }
    }

    /// Set position for progress indicator
    pub fn set_position(&self, pos: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_position(pos),
            Self::NoOp => {
                let _ = pos;
            },
        }
    }

    /// Finish progress indicator with message
    pub fn finish_with_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.finish_with_message(msg),
            Self::NoOp => {
                let _ = msg;
            },
        }
    }
}

/// Model downloader with progress reporting
#[derive(Debug)]
pub struct ModelDownloader {
    client: Client,
    cache: ModelCache,
}

impl ModelDownloader {
    /// Create a new model downloader for the given cache
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn new(cache: ModelCache) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(600))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RemovalError::network_error("Failed to create HTTP client", e))?;

        Ok(Self { client, cache })
    }

    /// Make sure the model file is present locally and return its path
    ///
    /// Downloads the model on a cache miss. When `expected_sha256` is given
    /// the file is verified, and a cached file that fails verification is
    /// downloaded again.
    ///
    /// # Errors
    /// - Network errors during download
    /// - File system errors during caching
    /// - Integrity verification failure after download
    pub async fn ensure_model(
        &self,
        model: SegmentationModel,
        expected_sha256: Option<&str>,
        show_progress: bool,
    ) -> Result<PathBuf> {
        let model_path = self.cache.model_path(model);

        if self.cache.is_model_cached(model) {
            if Self::verify_file_integrity(&model_path, expected_sha256)? {
                info!(model = %model, path = %model_path.display(), "Model already cached");
                return Ok(model_path);
            }
            warn!(
                model = %model,
                path = %model_path.display(),
                "Cached model failed integrity check, downloading again"
            );
        }

        self.download_model(model, show_progress).await?;

        if !Self::verify_file_integrity(&model_path, expected_sha256)? {
            return Err(RemovalError::model(format!(
                "Downloaded model '{}' does not match the expected SHA-256 digest",
                model
            )));
        }

        Ok(model_path)
    }

    /// Download a model into the cache, replacing any existing file
    ///
    /// # Errors
    /// - Network errors during download
    /// - File system errors during caching
    pub async fn download_model(&self, model: SegmentationModel, show_progress: bool) -> Result<()> {
        let url = model.download_url();
        let final_path = self.cache.model_path(model);
        let temp_path = final_path.with_extension("onnx.part");

        let span = info_span!("download", url = %url, destination = %final_path.display());
        async {
            info!("Downloading model {}", model);

            let progress = if show_progress {
                Self::create_progress_indicator()
            } else {
                ProgressIndicator::NoOp
            };
            progress.set_message(format!("Downloading {}", model.file_name()));

            match self.download_file(&url, &temp_path, &progress).await {
                Ok(size) => {
                    fs::rename(&temp_path, &final_path).map_err(|e| {
                        RemovalError::file_io_error("move downloaded model to cache", &final_path, &e)
                    })?;
                    progress.finish_with_message(format!("Downloaded {}", model.file_name()));
                    info!(size = %format_size(size), "Successfully downloaded model {}", model);
                    Ok(())
                },
                Err(e) => {
                    if temp_path.exists() {
                        if let Err(cleanup_err) = fs::remove_file(&temp_path) {
                            warn!("Failed to cleanup partial download: {}", cleanup_err);
                        }
                    }
                    progress.finish_with_message("Download failed".to_string());
                    Err(e)
                },
            }
        }
        .instrument(span)
        .await
    }

    /// Create a progress indicator for download reporting
    fn create_progress_indicator() -> ProgressIndicator {
        #[cfg(feature = "cli")]
        {
            let pb = ProgressBar::new(0);
            if let Ok(style) = ProgressStyle::default_bar().template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
            ) {
                pb.set_style(style.progress_chars("#>-"));
            }
            ProgressIndicator::Indicatif(pb)
        }
        #[cfg(not(feature = "cli"))]
        {
            ProgressIndicator::NoOp
        }
    }

    /// Download a single file with progress reporting, returning its size
    async fn download_file(
        &self,
        url: &str,
        local_path: &Path,
        progress: &ProgressIndicator,
    ) -> Result<u64> {
        debug!("Downloading: {} -> {}", url, local_path.display());

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RemovalError::network_error(format!("Failed to download {}", url), e))?;

        if !response.status().is_success() {
            return Err(RemovalError::network_error(
                format!("Failed to download {}", url),
                format!("HTTP {}", response.status()),
            ));
        }

        if let Some(total) = response.content_length() {
            progress.set_length(total);
        }

        let mut file = tokio::fs::File::create(local_path)
            .await
            .map_err(|e| RemovalError::file_io_error("create file", local_path, &e))?;

        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let mut downloaded = 0u64;
        let mut buffer = vec![0; 64 * 1024];

        loop {
            let bytes_read = tokio::io::AsyncReadExt::read(&mut stream, &mut buffer)
                .await
                .map_err(|e| RemovalError::network_error("Failed to read download stream", e))?;

            if bytes_read == 0 {
                break;
            }

            file.write_all(buffer.get(..bytes_read).unwrap_or(&[]))
                .await
                .map_err(|e| RemovalError::file_io_error("write to file", local_path, &e))?;

            downloaded += bytes_read as u64;
            progress.set_position(downloaded);
        }

        file.flush()
            .await
            .map_err(|e| RemovalError::file_io_error("flush file", local_path, &e))?;

        debug!("Downloaded {} bytes to {}", downloaded, local_path.display());
        Ok(downloaded)
    }

    /// Verify the integrity of a file using SHA-256
    ///
    /// Returns `true` when no digest is expected.
    ///
    /// # Errors
    /// - File cannot be read
    pub fn verify_file_integrity(file_path: &Path, expected_hash: Option<&str>) -> Result<bool> {
        let Some(expected) = expected_hash else {
            return Ok(true);
        };

        let contents = fs::read(file_path).map_err(|e| {
            RemovalError::file_io_error("read file for verification", file_path, &e)
        })?;

        let actual_hash = format!("{:x}", Sha256::digest(&contents));

        if actual_hash.eq_ignore_ascii_case(expected.trim()) {
            Ok(true)
        } else {
            warn!(
                "File integrity check failed for {}: expected {}, got {}",
                file_path.display(),
                expected,
                actual_hash
            );
            Ok(false)
        }
    }
}

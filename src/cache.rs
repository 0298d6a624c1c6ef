//! Model cache management for downloaded segmentation models
//!
//! Models are stored as flat `<name>.onnx` files, in the same layout the
//! rembg tooling uses, so an existing `~/.u2net` directory is picked up as is.

use crate::error::{RemovalError, Result};
use crate::models::SegmentationModel;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the cache location
pub const CACHE_DIR_ENV: &str = "U2NET_HOME";

/// Model cache manager
#[derive(Debug, Clone)]
pub struct ModelCache {
    cache_dir: PathBuf,
}

impl ModelCache {
    /// Create a new model cache manager in the default location
    ///
    /// Uses `$U2NET_HOME` when set, otherwise `~/.u2net`.
    ///
    /// # Errors
    /// - Failed to determine the home directory
    /// - Failed to create cache directory
    pub fn new() -> Result<Self> {
        let cache_dir = Self::default_cache_dir()?;
        Self::with_custom_cache_dir(&cache_dir)
    }

    /// Create a new model cache with a custom cache directory
    ///
    /// # Errors
    /// - Failed to create cache directory
    /// - Insufficient permissions to access cache directory
    pub fn with_custom_cache_dir(cache_dir: &Path) -> Result<Self> {
        if !cache_dir.exists() {
            fs::create_dir_all(cache_dir).map_err(|e| {
                RemovalError::file_io_error("create cache directory", cache_dir, &e)
            })?;
        }

        Ok(Self {
            cache_dir: cache_dir.to_path_buf(),
        })
    }

    fn default_cache_dir() -> Result<PathBuf> {
        if let Some(cache_override) = std::env::var_os(CACHE_DIR_ENV) {
            return Ok(PathBuf::from(cache_override));
        }

        Ok(dirs::home_dir()
            .ok_or_else(|| {
                RemovalError::invalid_config(format!(
                    "Failed to determine home directory. Set {} or pass --cache-dir.",
                    CACHE_DIR_ENV
                ))
            })?
            .join(".u2net"))
    }

    /// Path where the model file is (or would be) stored
    #[must_use]
    pub fn model_path(&self, model: SegmentationModel) -> PathBuf {
        self.cache_dir.join(model.file_name())
    }

    /// Check if a non-empty model file is present
    #[must_use]
    pub fn is_model_cached(&self, model: SegmentationModel) -> bool {
        fs::metadata(self.model_path(model))
            .map(|meta| meta.is_file() && meta.len() > 0)
            .unwrap_or(false)
    }

    /// Models currently present in the cache, in registry order
    #[must_use]
    pub fn cached_models(&self) -> Vec<SegmentationModel> {
        SegmentationModel::ALL
            .into_iter()
            .filter(|model| self.is_model_cached(*model))
            .collect()
    }

    /// Get the current cache directory path
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}

/// Format file size in human-readable format
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS.get(unit_index).unwrap_or(&"B"))
    } else {
        format!("{:.1} {}", size, UNITS.get(unit_index).unwrap_or(&"B"))
    }
}

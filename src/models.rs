//! Segmentation model registry and model file management

use crate::error::{RemovalError, Result};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Release location of the pretrained rembg ONNX models
const MODEL_RELEASE_BASE_URL: &str = "https://github.com/danielgatis/rembg/releases/download/v0.0.0";

/// Pretrained segmentation networks from the rembg model family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SegmentationModel {
    /// General purpose U²-Net (default)
    #[default]
    U2net,
    /// Lightweight U²-Net
    U2netp,
    /// Reduced-size U²-Net variant
    Silueta,
    /// IS-Net general use model, higher resolution
    IsnetGeneralUse,
}

impl SegmentationModel {
    pub const ALL: [Self; 4] = [
        Self::U2net,
        Self::U2netp,
        Self::Silueta,
        Self::IsnetGeneralUse,
    ];

    /// Canonical model name as used by rembg
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::U2net => "u2net",
            Self::U2netp => "u2netp",
            Self::Silueta => "silueta",
            Self::IsnetGeneralUse => "isnet-general-use",
        }
    }

    /// File name of the ONNX model in the cache directory
    #[must_use]
    pub fn file_name(self) -> String {
        format!("{}.onnx", self.name())
    }

    /// Download URL of the ONNX model
    #[must_use]
    pub fn download_url(self) -> String {
        format!("{}/{}", MODEL_RELEASE_BASE_URL, self.file_name())
    }

    /// Input normalization expected by the network
    #[must_use]
    pub fn preprocessing_config(self) -> PreprocessingConfig {
        match self {
            Self::U2net | Self::U2netp | Self::Silueta => PreprocessingConfig {
                target_size: [320, 320],
                normalization_mean: [0.485, 0.456, 0.406],
                normalization_std: [0.229, 0.224, 0.225],
            },
            Self::IsnetGeneralUse => PreprocessingConfig {
                target_size: [1024, 1024],
                normalization_mean: [0.5, 0.5, 0.5],
                normalization_std: [1.0, 1.0, 1.0],
            },
        }
    }
}

impl fmt::Display for SegmentationModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SegmentationModel {
    type Err = RemovalError;

    fn from_str(s: &str) -> Result<Self> {
        let needle = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|model| model.name() == needle)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|m| m.name()).collect();
                RemovalError::invalid_config(format!(
                    "Unknown model '{}'. Available models: {}",
                    s,
                    known.join(", ")
                ))
            })
    }
}

/// Model preprocessing parameters
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessingConfig {
    /// Square model input size `[width, height]`
    pub target_size: [u32; 2],
    /// Per-channel mean subtracted after scaling to `[0, 1]`
    pub normalization_mean: [f32; 3],
    /// Per-channel standard deviation
    pub normalization_std: [f32; 3],
}

/// Model information and metadata
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub name: String,
    pub size_bytes: usize,
    pub input_shape: (usize, usize, usize, usize), // NCHW format
    pub output_shape: (usize, usize, usize, usize),
}

/// Resolved model: a known network plus the file to load it from
#[derive(Debug, Clone)]
pub struct ModelManager {
    model: SegmentationModel,
    model_path: PathBuf,
}

impl ModelManager {
    /// Create a model manager for a model file on disk
    ///
    /// # Errors
    /// - Model path does not exist or is not a regular file
    pub fn new<P: AsRef<Path>>(model: SegmentationModel, model_path: P) -> Result<Self> {
        let model_path = model_path.as_ref().to_path_buf();
        if !model_path.is_file() {
            return Err(RemovalError::model(format!(
                "Model file for '{}' not found at '{}'",
                model,
                model_path.display()
            )));
        }

        Ok(Self { model, model_path })
    }

    /// Segmentation network served by this manager
    #[must_use]
    pub fn model(&self) -> SegmentationModel {
        self.model
    }

    /// Load model data
    ///
    /// # Errors
    /// - File I/O errors when reading model data
    /// - Empty model file
    pub fn load_model(&self) -> Result<Vec<u8>> {
        let data = fs::read(&self.model_path)
            .map_err(|e| RemovalError::file_io_error("read model", &self.model_path, &e))?;
        if data.is_empty() {
            return Err(RemovalError::model(format!(
                "Model file '{}' is empty",
                self.model_path.display()
            )));
        }
        Ok(data)
    }

    /// Get model information
    ///
    /// # Errors
    /// - Model file metadata is not readable
    pub fn get_info(&self) -> Result<ModelInfo> {
        let size_bytes = fs::metadata(&self.model_path)
            .map_err(|e| RemovalError::file_io_error("inspect model", &self.model_path, &e))?
            .len() as usize;
        let [width, height] = self.model.preprocessing_config().target_size;

        Ok(ModelInfo {
            name: self.model.name().to_string(),
            size_bytes,
            input_shape: (1, 3, height as usize, width as usize),
            output_shape: (1, 1, height as usize, width as usize),
        })
    }

    /// Get preprocessing configuration
    #[must_use]
    pub fn get_preprocessing_config(&self) -> PreprocessingConfig {
        self.model.preprocessing_config()
    }

    /// Get the model file path
    #[must_use]
    pub fn get_model_path(&self) -> &Path {
        &self.model_path
    }
}

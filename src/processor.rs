//! Background removal processor
//!
//! Owns the inference backend and runs the full image pipeline: preprocess,
//! infer, turn the prediction into an alpha mask and cut the foreground out.

use crate::{
    config::{BackendType, RemovalConfig},
    error::{RemovalError, Result},
    inference::InferenceBackend,
    models::{ModelManager, SegmentationModel},
    utils::ImagePreprocessor,
};
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Luma, Rgba, RgbaImage};
use ndarray::Array4;
use std::time::Instant;
use tracing::{debug, debug_span, info};

/// Factory trait for creating inference backends
pub trait BackendFactory: Send + Sync {
    /// Create a backend instance of the specified type with the given model manager
    ///
    /// # Errors
    /// - Backend type not compiled into this build
    fn create_backend(
        &self,
        backend_type: BackendType,
        model_manager: ModelManager,
    ) -> Result<Box<dyn InferenceBackend>>;

    /// List available backend types
    fn available_backends(&self) -> Vec<BackendType>;
}

/// Backend factory for the backends enabled at compile time
#[derive(Debug, Default)]
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    fn create_backend(
        &self,
        backend_type: BackendType,
        model_manager: ModelManager,
    ) -> Result<Box<dyn InferenceBackend>> {
        match backend_type {
            #[cfg(feature = "onnx")]
            BackendType::Onnx => Ok(Box::new(crate::backends::OnnxBackend::with_model_manager(
                model_manager,
            ))),
            #[cfg(feature = "tract")]
            BackendType::Tract => Ok(Box::new(crate::backends::TractBackend::with_model_manager(
                model_manager,
            ))),
            #[allow(unreachable_patterns)]
            other => {
                drop(model_manager);
                Err(RemovalError::invalid_config(format!(
                    "Backend '{}' is not available in this build",
                    other
                )))
            },
        }
    }

    fn available_backends(&self) -> Vec<BackendType> {
        let mut backends = Vec::new();
        #[cfg(feature = "onnx")]
        backends.push(BackendType::Onnx);
        #[cfg(feature = "tract")]
        backends.push(BackendType::Tract);
        backends
    }
}

/// Background removal processor bound to one model
pub struct BackgroundRemovalProcessor {
    config: RemovalConfig,
    model_manager: ModelManager,
    backend_factory: Box<dyn BackendFactory>,
    backend: Option<Box<dyn InferenceBackend>>,
}

impl std::fmt::Debug for BackgroundRemovalProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundRemovalProcessor")
            .field("config", &self.config)
            .field("model_manager", &self.model_manager)
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

impl BackgroundRemovalProcessor {
    /// Create a new processor with the default backend factory
    ///
    /// # Errors
    /// - Invalid configuration
    pub fn new(config: RemovalConfig, model_manager: ModelManager) -> Result<Self> {
        Self::with_factory(config, model_manager, Box::new(DefaultBackendFactory))
    }

    /// Create a new processor with a custom backend factory
    ///
    /// # Errors
    /// - Invalid configuration
    pub fn with_factory(
        config: RemovalConfig,
        model_manager: ModelManager,
        backend_factory: Box<dyn BackendFactory>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            model_manager,
            backend_factory,
            backend: None,
        })
    }

    /// Create the backend and load the model
    ///
    /// Calling this again after a successful initialization is a no-op.
    ///
    /// # Errors
    /// - Backend not available in this build
    /// - Model loading failures
    pub fn initialize(&mut self) -> Result<()> {
        if self.is_initialized() {
            return Ok(());
        }

        info!(
            model = %self.model_manager.model(),
            backend = %self.config.backend_type,
            provider = %self.config.execution_provider,
            "Initializing background removal processor"
        );

        let mut backend = self
            .backend_factory
            .create_backend(self.config.backend_type, self.model_manager.clone())?;

        if let Some(load_time) = backend.initialize(&self.config)? {
            debug!("Model load time: {}ms", load_time.as_millis());
        }

        self.backend = Some(backend);
        info!("Background removal processor initialized successfully");
        Ok(())
    }

    /// Remove the background of a decoded image
    ///
    /// The result has the dimensions of the input; pixels outside the
    /// foreground become fully transparent.
    ///
    /// # Errors
    /// - Processor not initialized
    /// - Preprocessing, inference or mask generation failures
    pub fn process_image(&mut self, image: &DynamicImage) -> Result<RgbaImage> {
        let _span = debug_span!("inference", model = %self.model_manager.model()).entered();
        let backend = self
            .backend
            .as_mut()
            .ok_or_else(|| RemovalError::inference("Processor not initialized"))?;
        let original_dimensions = (image.width(), image.height());

        let preprocess_start = Instant::now();
        let preprocessing_config = backend.get_preprocessing_config()?;
        let input_tensor = ImagePreprocessor::preprocess_for_inference(image, &preprocessing_config)?;
        let preprocessing_ms = preprocess_start.elapsed().as_millis() as u64;

        let inference_start = Instant::now();
        let output_tensor = backend.infer(&input_tensor)?;
        let inference_ms = inference_start.elapsed().as_millis() as u64;

        let postprocess_start = Instant::now();
        let mask = tensor_to_mask(&output_tensor, original_dimensions)?;
        let result = apply_background_removal(image, &mask);
        let postprocessing_ms = postprocess_start.elapsed().as_millis() as u64;

        debug!(
            preprocessing_ms,
            inference_ms,
            postprocessing_ms,
            "Background removal complete"
        );
        Ok(result)
    }

    /// Model this processor runs
    #[must_use]
    pub fn model(&self) -> SegmentationModel {
        self.model_manager.model()
    }

    /// Get the current configuration
    #[must_use]
    pub fn config(&self) -> &RemovalConfig {
        &self.config
    }

    /// Check if processor is initialized
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.backend
            .as_ref()
            .is_some_and(|backend| backend.is_initialized())
    }
}

/// Convert the model prediction into an alpha mask of the original size
///
/// Uses channel 0 of the first output, min-max normalized to `[0, 255]`,
/// then resized back with a Lanczos filter. A flat prediction has no range
/// to normalize and is clamped to `[0, 1]` instead.
///
/// # Errors
/// - Empty batch or channel dimension
/// - Zero-sized prediction
pub fn tensor_to_mask(tensor: &Array4<f32>, original_dimensions: (u32, u32)) -> Result<GrayImage> {
    let (batch, channels, mask_height, mask_width) = tensor.dim();
    if batch == 0 || channels == 0 || mask_height == 0 || mask_width == 0 {
        return Err(RemovalError::processing(format!(
            "Invalid output tensor shape {:?}",
            tensor.shape()
        )));
    }

    let prediction = tensor.slice(ndarray::s![0, 0, .., ..]);
    let (min, max) = prediction
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;

    let normalize = |value: f32| -> u8 {
        let scaled = if range > f32::EPSILON {
            (value - min) / range
        } else {
            value.clamp(0.0, 1.0)
        };
        (scaled * 255.0).clamp(0.0, 255.0) as u8
    };

    let mask = GrayImage::from_fn(mask_width as u32, mask_height as u32, |x, y| {
        let value = prediction
            .get([y as usize, x as usize])
            .copied()
            .unwrap_or(0.0);
        Luma([normalize(value)])
    });

    let (width, height) = original_dimensions;
    if (width, height) == mask.dimensions() {
        return Ok(mask);
    }
    Ok(image::imageops::resize(&mask, width, height, FilterType::Lanczos3))
}

/// Apply the mask as the alpha channel
///
/// Fully masked pixels are cleared to transparent black so the encoded
/// output does not leak background colors.
#[must_use]
pub fn apply_background_removal(image: &DynamicImage, mask: &GrayImage) -> RgbaImage {
    let rgba_image = image.to_rgba8();
    let (width, height) = rgba_image.dimensions();

    RgbaImage::from_fn(width, height, |x, y| {
        let alpha = mask.get_pixel_checked(x, y).map_or(0, |luma| luma.0[0]);
        if alpha == 0 {
            return Rgba([0, 0, 0, 0]);
        }
        let pixel = rgba_image.get_pixel(x, y);
        Rgba([pixel[0], pixel[1], pixel[2], alpha])
    })
}

//! Inference backend abstraction

use crate::config::RemovalConfig;
use crate::error::Result;
use crate::models::PreprocessingConfig;
use ndarray::Array4;
use std::time::Duration;

/// Trait for inference backends
///
/// Backends are driven from blocking worker threads, one request at a time,
/// so they must be `Send` but need not be `Sync`.
pub trait InferenceBackend: Send {
    /// Initialize the backend with the given configuration
    ///
    /// Returns the model load time, or `None` when already initialized.
    ///
    /// # Errors
    /// - Backend initialization failures
    /// - Model loading or validation errors
    fn initialize(&mut self, config: &RemovalConfig) -> Result<Option<Duration>>;

    /// Run inference on an NCHW input tensor
    ///
    /// # Errors
    /// - Backend not initialized
    /// - Model inference failures
    /// - Output tensor is not four-dimensional
    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>>;

    /// Get preprocessing configuration for this backend
    ///
    /// # Errors
    /// - Model manager not set
    fn get_preprocessing_config(&self) -> Result<PreprocessingConfig>;

    /// Check if backend is initialized
    fn is_initialized(&self) -> bool;
}

/// Copy a tensor of known shape into an owned 4D array
///
/// # Errors
/// - Shape is not four-dimensional or does not match the data length
pub(crate) fn to_array4(shape: &[usize], data: Vec<f32>) -> Result<Array4<f32>> {
    let &[n, c, h, w] = shape else {
        return Err(crate::error::RemovalError::inference(format!(
            "Expected 4D output tensor, got {}D",
            shape.len()
        )));
    };

    Array4::from_shape_vec((n, c, h, w), data).map_err(|e| {
        crate::error::RemovalError::inference(format!("Failed to reshape output tensor: {e}"))
    })
}

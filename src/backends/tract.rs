//! Tract backend for the segmentation models
//!
//! Pure Rust inference with no native runtime. Only CPU execution is
//! available, and the model is compiled for the fixed input size of the
//! selected network.

use crate::config::RemovalConfig;
use crate::error::{RemovalError, Result};
use crate::inference::{to_array4, InferenceBackend};
use crate::models::{ModelManager, PreprocessingConfig};
use ndarray::Array4;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use tract_onnx::prelude::*;

/// Type alias for the optimized Tract model
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Tract backend for running background removal models using pure Rust inference
#[derive(Debug)]
pub struct TractBackend {
    model: Option<TractModel>,
    model_manager: Option<ModelManager>,
    initialized: bool,
}

impl TractBackend {
    /// List Tract execution providers with availability and a description
    #[must_use]
    pub fn list_providers() -> Vec<(String, bool, String)> {
        vec![(
            "CPU".to_string(),
            true,
            "Pure Rust CPU inference with no external dependencies".to_string(),
        )]
    }

    /// Create a Tract backend for a resolved model file
    #[must_use]
    pub fn with_model_manager(model_manager: ModelManager) -> Self {
        Self {
            model: None,
            model_manager: Some(model_manager),
            initialized: false,
        }
    }

    fn model_manager(&self) -> Result<&ModelManager> {
        self.model_manager
            .as_ref()
            .ok_or_else(|| RemovalError::model("No model manager available for Tract backend"))
    }

    /// Load and optimize the model using Tract
    fn load_model(&mut self) -> Result<Duration> {
        let model_load_start = Instant::now();
        let model_manager = self.model_manager()?;
        let model_data = model_manager.load_model()?;
        let model_info = model_manager.get_info()?;
        let (n, c, h, w) = model_info.input_shape;

        info!(model = %model_info.name, "Initializing Tract backend");

        let model = onnx()
            .model_for_read(&mut std::io::Cursor::new(model_data))
            .map_err(|e| RemovalError::model(format!("Failed to load ONNX model: {e}")))?
            .with_input_fact(0, f32::fact([n, c, h, w]).into())
            .map_err(|e| RemovalError::model(format!("Failed to set input shape: {e}")))?
            .into_optimized()
            .map_err(|e| RemovalError::model(format!("Failed to optimize model: {e}")))?
            .into_runnable()
            .map_err(|e| RemovalError::model(format!("Failed to create runnable model: {e}")))?;

        self.model = Some(model);
        self.initialized = true;

        let model_load_time = model_load_start.elapsed();
        info!(
            model = %model_info.name,
            "Tract backend initialized in {}ms",
            model_load_time.as_millis()
        );

        Ok(model_load_time)
    }
}

impl InferenceBackend for TractBackend {
    fn initialize(&mut self, _config: &RemovalConfig) -> Result<Option<Duration>> {
        if self.initialized {
            return Ok(None);
        }

        let model_load_time = self.load_model()?;
        Ok(Some(model_load_time))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| RemovalError::inference("Tract model not initialized"))?;

        let inference_start = Instant::now();
        debug!("Running Tract inference on input {:?}", input.shape());

        // Go through a flat slice so the tensor does not depend on tract's ndarray version
        let data: Vec<f32> = input.iter().copied().collect();
        let input_tensor = Tensor::from_shape(input.shape(), &data).map_err(|e| {
            RemovalError::inference(format!("Failed to convert input tensor: {e}"))
        })?;

        let outputs = model
            .run(tvec![input_tensor.into()])
            .map_err(|e| RemovalError::inference(format!("Tract inference failed: {e}")))?;

        let output_tensor = outputs
            .into_iter()
            .next()
            .ok_or_else(|| RemovalError::inference("No output tensor found"))?
            .into_arc_tensor();

        let output_data = output_tensor.as_slice::<f32>().map_err(|e| {
            RemovalError::inference(format!("Failed to convert output tensor: {e}"))
        })?;
        let result = to_array4(output_tensor.shape(), output_data.to_vec())?;

        debug!(
            "Tract inference completed in {}ms",
            inference_start.elapsed().as_millis()
        );

        Ok(result)
    }

    fn get_preprocessing_config(&self) -> Result<PreprocessingConfig> {
        Ok(self.model_manager()?.get_preprocessing_config())
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

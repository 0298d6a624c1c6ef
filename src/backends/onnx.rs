//! ONNX Runtime backend for the segmentation models
//!
//! Supports the CPU, CUDA and `CoreML` execution providers. Providers that are
//! requested but unavailable fall back to CPU with a warning.

use crate::config::{ExecutionProvider, RemovalConfig};
use crate::error::{RemovalError, Result};
use crate::inference::{to_array4, InferenceBackend};
use crate::models::{ModelManager, PreprocessingConfig};
use ndarray::Array4;
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
    ExecutionProviderDispatch,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// ONNX Runtime backend for running background removal models
#[derive(Debug)]
pub struct OnnxBackend {
    session: Option<Session>,
    model_manager: Option<ModelManager>,
    initialized: bool,
}

impl OnnxBackend {
    /// List the ONNX Runtime execution providers with availability and a description
    #[must_use]
    pub fn list_providers() -> Vec<(String, bool, String)> {
        vec![
            (
                "CPU".to_string(),
                true,
                "Always available, uses CPU for inference".to_string(),
            ),
            (
                "CUDA".to_string(),
                cuda_available(),
                "NVIDIA GPU acceleration (requires CUDA toolkit and compatible GPU)".to_string(),
            ),
            (
                "CoreML".to_string(),
                coreml_available(),
                "Apple Silicon GPU acceleration (macOS only)".to_string(),
            ),
        ]
    }

    /// Create a new ONNX backend for a resolved model file
    #[must_use]
    pub fn with_model_manager(model_manager: ModelManager) -> Self {
        Self {
            session: None,
            model_manager: Some(model_manager),
            initialized: false,
        }
    }

    fn model_manager(&self) -> Result<&ModelManager> {
        self.model_manager
            .as_ref()
            .ok_or_else(|| RemovalError::internal("Model manager not initialized"))
    }

    /// Execution providers to register for the requested option
    fn execution_providers(requested: ExecutionProvider) -> Vec<ExecutionProviderDispatch> {
        let mut providers = Vec::new();

        match requested {
            ExecutionProvider::Auto => {
                if cuda_available() {
                    info!("CUDA execution provider is available and will be used");
                    providers.push(CUDAExecutionProvider::default().build());
                }
                if coreml_available() {
                    info!("CoreML execution provider is available and will be used");
                    providers.push(CoreMLExecutionProvider::default().with_subgraphs(true).build());
                }
                if providers.is_empty() {
                    debug!("No hardware acceleration available, using CPU");
                }
            },
            ExecutionProvider::Cpu => {
                info!("Using CPU execution provider");
            },
            ExecutionProvider::Cuda => {
                if cuda_available() {
                    info!("Using CUDA execution provider");
                    providers.push(CUDAExecutionProvider::default().build());
                } else {
                    warn!("CUDA execution provider requested but not available, falling back to CPU");
                }
            },
            ExecutionProvider::CoreMl => {
                if coreml_available() {
                    info!("Using CoreML execution provider");
                    providers.push(CoreMLExecutionProvider::default().with_subgraphs(true).build());
                } else {
                    warn!(
                        "CoreML execution provider requested but not available, falling back to CPU"
                    );
                }
            },
        }

        providers
    }

    /// Load the model and build the ONNX Runtime session
    fn load_model(&mut self, config: &RemovalConfig) -> Result<Duration> {
        let model_load_start = Instant::now();
        let model_manager = self.model_manager()?;
        let model_data = model_manager.load_model()?;
        let model_info = model_manager.get_info()?;

        let mut session_builder = Session::builder()
            .map_err(|e| RemovalError::inference(format!("Failed to create session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                RemovalError::inference(format!("Failed to set optimization level: {e}"))
            })?;

        let providers = Self::execution_providers(config.execution_provider);
        if !providers.is_empty() {
            session_builder = session_builder.with_execution_providers(providers).map_err(|e| {
                RemovalError::inference(format!("Failed to set execution providers: {e}"))
            })?;
        }

        let available = std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(8);
        let intra_threads = if config.intra_threads > 0 {
            config.intra_threads
        } else {
            available
        };
        let inter_threads = if config.inter_threads > 0 {
            config.inter_threads
        } else {
            (available / 4).max(1)
        };

        let session = session_builder
            .with_parallel_execution(true)
            .map_err(|e| RemovalError::inference(format!("Failed to enable parallel execution: {e}")))?
            .with_intra_threads(intra_threads)
            .map_err(|e| RemovalError::inference(format!("Failed to set intra threads: {e}")))?
            .with_inter_threads(inter_threads)
            .map_err(|e| RemovalError::inference(format!("Failed to set inter threads: {e}")))?
            .commit_from_memory(&model_data)
            .map_err(|e| {
                RemovalError::model(format!("Failed to create session from model data: {e}"))
            })?;

        debug!(
            model = %model_info.name,
            provider = %config.execution_provider,
            intra_threads,
            inter_threads,
            "ONNX Runtime session created"
        );

        self.session = Some(session);
        self.initialized = true;

        let model_load_time = model_load_start.elapsed();
        info!(
            model = %model_info.name,
            "Model loading complete: {:.0}ms",
            model_load_time.as_secs_f64() * 1000.0
        );

        Ok(model_load_time)
    }
}

fn cuda_available() -> bool {
    OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false)
}

fn coreml_available() -> bool {
    OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default()).unwrap_or(false)
}

impl InferenceBackend for OnnxBackend {
    fn initialize(&mut self, config: &RemovalConfig) -> Result<Option<Duration>> {
        if self.initialized {
            return Ok(None);
        }

        let model_load_time = self.load_model(config)?;
        Ok(Some(model_load_time))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        if !self.initialized {
            return Err(RemovalError::inference("Backend not initialized"));
        }

        let session = self
            .session
            .as_mut()
            .ok_or_else(|| RemovalError::inference("ONNX session not initialized"))?;

        let inference_start = Instant::now();
        debug!("Starting inference with input shape: {:?}", input.dim());

        let input_value = Value::from_array(input.clone()).map_err(|e| {
            RemovalError::inference(format!("Failed to convert input tensor: {e}"))
        })?;

        // Positional input and output: the rembg exports name their tensors differently
        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| RemovalError::inference(format!("ONNX inference failed: {e}")))?;

        let first_key = outputs
            .keys()
            .next()
            .ok_or_else(|| RemovalError::inference("No output tensors found"))?;
        let output_tensor = outputs
            .get(first_key)
            .ok_or_else(|| RemovalError::inference("First output tensor not found"))?
            .try_extract_array::<f32>()
            .map_err(|e| {
                RemovalError::inference(format!("Failed to extract output tensor: {e}"))
            })?;

        let shape = output_tensor.shape().to_vec();
        let data = output_tensor.iter().copied().collect();
        let result = to_array4(&shape, data)?;

        debug!(
            "Inference complete: {:.2}ms",
            inference_start.elapsed().as_secs_f64() * 1000.0
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SegmentationModel;

    fn backend_with_fake_model(dir: &tempfile::TempDir) -> OnnxBackend {
        let path = dir.path().join("u2netp.onnx");
        std::fs::write(&path, b"not an onnx graph").unwrap();
        let manager = ModelManager::new(SegmentationModel::U2netp, &path).unwrap();
        OnnxBackend::with_model_manager(manager)
    }

    #[test]
    fn test_list_providers_always_has_cpu() {
        let providers = OnnxBackend::list_providers();
        assert_eq!(providers.len(), 3);
        let (name, available, _) = &providers[0];
        assert_eq!(name, "CPU");
        assert!(available);
    }

    #[test]
    fn test_preprocessing_follows_model() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend_with_fake_model(&dir);

        assert!(!backend.is_initialized());
        let config = backend.get_preprocessing_config().unwrap();
        assert_eq!(config.target_size, [320, 320]);
    }

    #[test]
    fn test_invalid_model_data_fails_initialization() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = backend_with_fake_model(&dir);

        assert!(backend.initialize(&RemovalConfig::default()).is_err());
        assert!(!backend.is_initialized());
    }

    #[test]
    fn test_infer_before_initialize_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = backend_with_fake_model(&dir);
        let input = Array4::<f32>::zeros((1, 3, 320, 320));

        assert!(backend.infer(&input).is_err());
    }
}

//! Mock inference backend for unit tests
//!
//! Produces a deterministic circular mask so processor tests run without a
//! model file or an inference runtime.

use crate::{
    config::{BackendType, RemovalConfig},
    error::{RemovalError, Result},
    inference::InferenceBackend,
    models::{ModelInfo, ModelManager, PreprocessingConfig, SegmentationModel},
    processor::BackendFactory,
};
use ndarray::Array4;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Mock backend with the shapes and normalization of a real model
#[derive(Debug, Clone)]
pub struct MockBackend {
    initialized: bool,
    model_info: ModelInfo,
    preprocessing_config: PreprocessingConfig,
    call_history: Arc<Mutex<Vec<String>>>,
    should_fail_init: bool,
    should_fail_inference: bool,
}

impl MockBackend {
    #[must_use]
    pub fn new(model: SegmentationModel) -> Self {
        let preprocessing_config = model.preprocessing_config();
        let [width, height] = preprocessing_config.target_size;
        let (height, width) = (height as usize, width as usize);

        Self {
            initialized: false,
            model_info: ModelInfo {
                name: model.name().to_string(),
                size_bytes: 1024 * 1024,
                input_shape: (1, 3, height, width),
                output_shape: (1, 1, height, width),
            },
            preprocessing_config,
            call_history: Arc::new(Mutex::new(Vec::new())),
            should_fail_init: false,
            should_fail_inference: false,
        }
    }

    /// Create a mock backend that will fail during initialization
    #[must_use]
    pub fn new_failing_init() -> Self {
        let mut backend = Self::new(SegmentationModel::U2netp);
        backend.should_fail_init = true;
        backend
    }

    /// Create a mock backend that will fail during inference
    #[must_use]
    pub fn new_failing_inference() -> Self {
        let mut backend = Self::new(SegmentationModel::U2netp);
        backend.should_fail_inference = true;
        backend
    }

    /// Methods called so far, in order
    pub fn get_call_history(&self) -> Vec<String> {
        self.call_history.lock().unwrap().clone()
    }

    fn record_call(&self, method: &str) {
        if let Ok(mut history) = self.call_history.lock() {
            history.push(method.to_string());
        }
    }

    /// Raw logits in `[-2, 3]`: high in a centered disc, low outside
    fn generate_mock_output(&self, batch_size: usize) -> Array4<f32> {
        let (_, _, height, width) = self.model_info.output_shape;
        let center_x = width as f32 / 2.0;
        let center_y = height as f32 / 2.0;
        let radius = width.min(height) as f32 / 3.0;

        Array4::from_shape_fn((batch_size, 1, height, width), |(_, _, y, x)| {
            let dx = x as f32 - center_x;
            let dy = y as f32 - center_y;
            if (dx * dx + dy * dy).sqrt() < radius {
                3.0
            } else {
                -2.0
            }
        })
    }
}

impl InferenceBackend for MockBackend {
    fn initialize(&mut self, _config: &RemovalConfig) -> Result<Option<Duration>> {
        self.record_call("initialize");

        if self.should_fail_init {
            return Err(RemovalError::model("Mock backend initialization failed"));
        }
        if self.initialized {
            return Ok(None);
        }

        self.initialized = true;
        Ok(Some(Duration::from_millis(1)))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        self.record_call("infer");

        if !self.initialized {
            return Err(RemovalError::inference("Backend not initialized"));
        }
        if self.should_fail_inference {
            return Err(RemovalError::inference("Mock inference failed"));
        }

        let (batch_size, channels, height, width) = input.dim();
        let (_, _, expected_height, expected_width) = self.model_info.input_shape;
        if channels != 3 || (height, width) != (expected_height, expected_width) {
            return Err(RemovalError::inference(format!(
                "Unexpected input shape {:?}",
                input.shape()
            )));
        }

        Ok(self.generate_mock_output(batch_size))
    }

    fn get_preprocessing_config(&self) -> Result<PreprocessingConfig> {
        Ok(self.preprocessing_config.clone())
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

/// Factory handing out clones of one mock backend
#[derive(Debug)]
pub struct MockBackendFactory {
    backend: MockBackend,
}

impl MockBackendFactory {
    #[must_use]
    pub fn new(backend: MockBackend) -> Self {
        Self { backend }
    }
}

impl BackendFactory for MockBackendFactory {
    fn create_backend(
        &self,
        _backend_type: BackendType,
        _model_manager: ModelManager,
    ) -> Result<Box<dyn InferenceBackend>> {
        Ok(Box::new(self.backend.clone()))
    }

    fn available_backends(&self) -> Vec<BackendType> {
        vec![BackendType::Onnx, BackendType::Tract]
    }
}

/// Uninitialized processor over a mock backend and a placeholder model file
///
/// The returned directory must outlive the processor.
pub fn mock_processor(
    backend: MockBackend,
) -> (tempfile::TempDir, crate::processor::BackgroundRemovalProcessor) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("u2netp.onnx");
    std::fs::write(&path, b"onnx").unwrap();
    let manager = ModelManager::new(SegmentationModel::U2netp, &path).unwrap();
    let processor = crate::processor::BackgroundRemovalProcessor::with_factory(
        RemovalConfig::default(),
        manager,
        Box::new(MockBackendFactory::new(backend)),
    )
    .unwrap();
    (dir, processor)
}

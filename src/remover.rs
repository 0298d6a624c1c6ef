//! The background removal capability used by the HTTP layer

use crate::error::{RemovalError, Result};
use crate::models::SegmentationModel;
use crate::processor::BackgroundRemovalProcessor;
use image::{DynamicImage, RgbaImage};
use std::sync::{Mutex, PoisonError};

/// Removes the background of a decoded image
///
/// Implementations are shared across requests and called from blocking
/// worker threads.
pub trait BackgroundRemover: Send + Sync {
    /// Return an RGBA image of the same size with the background transparent
    ///
    /// # Errors
    /// - Inference or mask generation failures
    fn remove(&self, image: DynamicImage) -> Result<RgbaImage>;

    /// Name reported by the health endpoint
    fn model_name(&self) -> String;
}

/// [`BackgroundRemover`] backed by a loaded segmentation model
///
/// Inference runs one image at a time; concurrent requests queue on the lock.
#[derive(Debug)]
pub struct ModelRemover {
    model: SegmentationModel,
    processor: Mutex<BackgroundRemovalProcessor>,
}

impl ModelRemover {
    /// Wrap an initialized processor
    ///
    /// # Errors
    /// - The processor has not been initialized
    pub fn new(processor: BackgroundRemovalProcessor) -> Result<Self> {
        if !processor.is_initialized() {
            return Err(RemovalError::model(
                "Processor must be initialized before serving requests",
            ));
        }

        Ok(Self {
            model: processor.model(),
            processor: Mutex::new(processor),
        })
    }
}

impl BackgroundRemover for ModelRemover {
    fn remove(&self, image: DynamicImage) -> Result<RgbaImage> {
        // A panic in an earlier request leaves the session itself usable
        let mut processor = self.processor.lock().unwrap_or_else(PoisonError::into_inner);
        processor.process_image(&image)
    }

    fn model_name(&self) -> String {
        self.model.name().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::{mock_processor, MockBackend};
    use image::{Rgb, RgbImage};
    use std::sync::Arc;

    #[test]
    fn test_requires_initialized_processor() {
        let (_dir, processor) = mock_processor(MockBackend::new(SegmentationModel::U2netp));
        assert!(ModelRemover::new(processor).is_err());
    }

    #[test]
    fn test_remove_produces_rgba_of_same_size() {
        let (_dir, mut processor) = mock_processor(MockBackend::new(SegmentationModel::U2netp));
        processor.initialize().unwrap();
        let remover = ModelRemover::new(processor).unwrap();
        assert_eq!(remover.model_name(), "u2netp");

        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 30, Rgb([1, 2, 3])));
        let result = remover.remove(image).unwrap();
        assert_eq!(result.dimensions(), (40, 30));
    }

    #[test]
    fn test_concurrent_removals_are_serialized() {
        let (_dir, mut processor) = mock_processor(MockBackend::new(SegmentationModel::U2netp));
        processor.initialize().unwrap();
        let remover = Arc::new(ModelRemover::new(processor).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let remover = Arc::clone(&remover);
                std::thread::spawn(move || {
                    let image = DynamicImage::ImageRgb8(RgbImage::new(10 + i, 10));
                    remover.remove(image).map(|result| result.width())
                })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.join().unwrap().unwrap(), 10 + i as u32);
        }
    }
}

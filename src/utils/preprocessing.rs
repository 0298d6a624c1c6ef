//! Image preprocessing for segmentation model inference

use crate::{
    error::{RemovalError, Result},
    models::PreprocessingConfig,
};
use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};
use ndarray::Array4;

/// Converts images into normalized NCHW tensors
#[derive(Debug)]
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Preprocess an image for model inference
    ///
    /// The image is converted to RGB and stretched to the square model input
    /// with a Lanczos filter (the aspect ratio is not preserved; the mask is
    /// stretched back afterwards). Pixel values are scaled by the brightest
    /// channel value in the resized image, then normalized per channel with
    /// the model's mean and standard deviation.
    ///
    /// # Errors
    /// - Zero-sized target or source image
    pub fn preprocess_for_inference(
        image: &DynamicImage,
        preprocessing_config: &PreprocessingConfig,
    ) -> Result<Array4<f32>> {
        let [target_width, target_height] = preprocessing_config.target_size;
        if target_width == 0 || target_height == 0 {
            return Err(RemovalError::processing("Model input size must be non-zero"));
        }
        if image.width() == 0 || image.height() == 0 {
            return Err(RemovalError::processing("Cannot preprocess an empty image"));
        }

        let rgb_image = image.to_rgb8();
        let resized =
            image::imageops::resize(&rgb_image, target_width, target_height, FilterType::Lanczos3);

        Ok(Self::image_to_tensor(&resized, preprocessing_config))
    }

    /// Convert a resized RGB image to a normalized tensor
    fn image_to_tensor(image: &RgbImage, preprocessing_config: &PreprocessingConfig) -> Array4<f32> {
        let max_value = image
            .as_raw()
            .iter()
            .copied()
            .max()
            .map_or(0.0, f32::from)
            .max(1e-6);
        let mean = preprocessing_config.normalization_mean;
        let std = preprocessing_config.normalization_std;
        let (width, height) = image.dimensions();

        Array4::from_shape_fn((1, 3, height as usize, width as usize), |(_, c, y, x)| {
            let value = f32::from(image.get_pixel(x as u32, y as u32).0.get(c).copied().unwrap_or(0));
            let channel_mean = mean.get(c).copied().unwrap_or(0.0);
            let channel_std = std.get(c).copied().unwrap_or(1.0);
            (value / max_value - channel_mean) / channel_std
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SegmentationModel;
    use image::{Rgb, RgbaImage};

    #[test]
    fn test_tensor_shape_matches_model_input() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(50, 20, Rgb([10, 20, 30])));
        let config = SegmentationModel::U2net.preprocessing_config();

        let tensor = ImagePreprocessor::preprocess_for_inference(&image, &config).unwrap();
        assert_eq!(tensor.dim(), (1, 3, 320, 320));
    }

    #[test]
    fn test_scaling_by_brightest_value() {
        // Brightest channel is 200, so red scales to 1.0 and green to 0.5
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([200, 100, 0])));
        let config = PreprocessingConfig {
            target_size: [4, 4],
            normalization_mean: [0.0, 0.0, 0.0],
            normalization_std: [1.0, 1.0, 1.0],
        };

        let tensor = ImagePreprocessor::preprocess_for_inference(&image, &config).unwrap();
        assert!((tensor[[0, 0, 1, 1]] - 1.0).abs() < 1e-3);
        assert!((tensor[[0, 1, 1, 1]] - 0.5).abs() < 1e-2);
        assert!(tensor[[0, 2, 1, 1]].abs() < 1e-3);
    }

    #[test]
    fn test_mean_std_normalization() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([255, 255, 255])));
        let config = SegmentationModel::U2net.preprocessing_config();
        let config = PreprocessingConfig {
            target_size: [4, 4],
            ..config
        };

        let tensor = ImagePreprocessor::preprocess_for_inference(&image, &config).unwrap();
        let expected_r = (1.0 - 0.485) / 0.229;
        assert!((tensor[[0, 0, 0, 0]] - expected_r).abs() < 1e-4);
    }

    #[test]
    fn test_black_image_does_not_divide_by_zero() {
        let image = DynamicImage::ImageRgba8(RgbaImage::new(4, 4));
        let config = SegmentationModel::IsnetGeneralUse.preprocessing_config();
        let config = PreprocessingConfig {
            target_size: [2, 2],
            ..config
        };

        let tensor = ImagePreprocessor::preprocess_for_inference(&image, &config).unwrap();
        assert!(tensor.iter().all(|v| v.is_finite()));
        assert!((tensor[[0, 0, 0, 0]] + 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_empty_image_is_rejected() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
        let config = SegmentationModel::U2netp.preprocessing_config();

        assert!(ImagePreprocessor::preprocess_for_inference(&image, &config).is_err());
    }
}

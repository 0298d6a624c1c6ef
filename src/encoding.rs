//! PNG and base64 encoding of removal results

use crate::error::{RemovalError, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ExtendedColorType, ImageEncoder, RgbaImage};

/// Encode an RGBA image as PNG
///
/// Compression and filter settings are fixed, so the same pixels always
/// produce the same bytes.
///
/// # Errors
/// - PNG encoder failure
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    PngEncoder::new_with_quality(&mut buffer, CompressionType::Default, FilterType::Adaptive)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgba8,
        )
        .map_err(|e| RemovalError::encoding(format!("Failed to encode PNG: {e}")))?;
    Ok(buffer)
}

/// Encode an RGBA image as PNG and then as standard padded base64
///
/// # Errors
/// - PNG encoder failure
pub fn encode_png_base64(image: &RgbaImage) -> Result<String> {
    let png = encode_png(image)?;
    Ok(STANDARD.encode(png))
}

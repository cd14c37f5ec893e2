//! Captured pixel data.
//!
//! A [`PixelBuffer`] is a reference-counted [`DynamicImage`], so snapshots
//! handed to callbacks share pixels with the frame store instead of copying
//! them.

use std::sync::Arc;

use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};

use crate::{error::FramesweepError, options::PixelFormat};

/// One decoded visual frame.
pub type PixelBuffer = Arc<DynamicImage>;

/// Build a [`PixelBuffer`] from tightly-packed pixel rows.
///
/// # Errors
///
/// [`FramesweepError::VideoDecodeError`] when `data` does not hold exactly
/// `width × height` pixels of `format`.
pub fn pixel_buffer_from_packed(
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
) -> Result<PixelBuffer, FramesweepError> {
    let expected = width as usize * height as usize * format.bytes_per_pixel();
    if data.len() != expected {
        return Err(FramesweepError::VideoDecodeError(format!(
            "expected {expected} bytes for a {width}x{height} {format:?} frame, got {}",
            data.len()
        )));
    }

    let image = match format {
        PixelFormat::Rgb8 => RgbImage::from_raw(width, height, data).map(DynamicImage::ImageRgb8),
        PixelFormat::Rgba8 => {
            RgbaImage::from_raw(width, height, data).map(DynamicImage::ImageRgba8)
        }
        PixelFormat::Gray8 => {
            GrayImage::from_raw(width, height, data).map(DynamicImage::ImageLuma8)
        }
    };

    image.map(Arc::new).ok_or_else(|| {
        FramesweepError::VideoDecodeError(
            "Failed to construct image from decoded frame data".to_string(),
        )
    })
}

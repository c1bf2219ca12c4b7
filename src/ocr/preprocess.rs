//! Bitmap preparation for the Tesseract backend.
//!
//! Grayscale, then invert polarity, then boost contrast. The pipeline is a
//! pure function of its input.

use image::{GrayImage, RgbImage};
use thiserror::Error;

/// Default contrast multiplier applied after inversion.
pub const DEFAULT_CONTRAST: f32 = 2.0;

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("pixel buffer holds {actual} bytes, expected {expected}")]
    MalformedBuffer { expected: usize, actual: usize },
}

/// ITU-R 601-2 luma with 16-bit fixed point rounding.
#[inline]
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((r as u32 * 19595 + g as u32 * 38470 + b as u32 * 7471 + 0x8000) >> 16) as u8
}

/// Convert a color bitmap to single-channel luminance.
pub fn grayscale(image: &RgbImage) -> GrayImage {
    let (width, height) = image.dimensions();
    let data = image
        .as_raw()
        .chunks_exact(3)
        .map(|px| luma(px[0], px[1], px[2]))
        .collect();
    GrayImage::from_raw(width, height, data).unwrap_or_else(|| GrayImage::new(width, height))
}

/// Flip polarity so dark-on-light becomes light-on-dark.
pub fn invert(image: &mut GrayImage) {
    for px in image.iter_mut() {
        *px = 255 - *px;
    }
}

/// Scale each pixel's distance from the image's mean grey level by `factor`.
pub fn enhance_contrast(image: &mut GrayImage, factor: f32) {
    let count = image.as_raw().len();
    if count == 0 {
        return;
    }
    let sum: u64 = image.iter().map(|&px| px as u64).sum();
    let mean = (sum as f64 / count as f64 + 0.5).floor() as f32;
    for px in image.iter_mut() {
        let value = mean + factor * (*px as f32 - mean);
        *px = value.clamp(0.0, 255.0) as u8;
    }
}

/// Run the full printed-text pipeline with the given contrast factor.
pub fn preprocess(image: &RgbImage, contrast: f32) -> Result<GrayImage, PreprocessError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(PreprocessError::EmptyImage { width, height });
    }
    let expected = width as usize * height as usize * 3;
    let actual = image.as_raw().len();
    if actual < expected {
        return Err(PreprocessError::MalformedBuffer { expected, actual });
    }

    let mut gray = grayscale(image);
    invert(&mut gray);
    enhance_contrast(&mut gray, contrast);
    Ok(gray)
}

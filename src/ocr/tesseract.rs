//! Tesseract OCR backend implementation.
//!
//! Preprocesses the bitmap for Tesseract, writes it to a temporary PNG and
//! runs the command-line engine assuming a single uniform block of text.

use std::process::Command;
use std::time::Instant;

use image::{GrayImage, RgbImage};
use tempfile::TempDir;

use super::backend::{
    build_ocr_result, OcrBackend, OcrBackendType, OcrError, OcrResult, RecognitionError,
};
use super::model_utils::check_binary;
use super::preprocess::preprocess;
use crate::config::TesseractConfig;

/// Tesseract OCR backend.
pub struct TesseractBackend {
    config: TesseractConfig,
}

impl TesseractBackend {
    /// Create a new Tesseract backend with default configuration.
    pub fn new() -> Self {
        Self {
            config: TesseractConfig::default(),
        }
    }

    /// Create a new Tesseract backend with custom configuration.
    pub fn with_config(config: TesseractConfig) -> Self {
        Self { config }
    }

    /// Arguments passed after the input image path.
    fn args(&self) -> Vec<String> {
        vec![
            "stdout".to_string(),
            "-l".to_string(),
            self.config.language.clone(),
            "--oem".to_string(),
            self.config.oem.to_string(),
            "--psm".to_string(),
            self.config.psm.to_string(),
        ]
    }

    /// Run Tesseract on a preprocessed bitmap.
    fn run_tesseract(&self, image: &GrayImage) -> Result<String, OcrError> {
        let backend = OcrBackendType::Tesseract;
        let temp_dir = TempDir::new().map_err(|e| OcrError::recognition(backend, e))?;
        let image_path = temp_dir.path().join("input.png");
        image
            .save(&image_path)
            .map_err(|e| OcrError::recognition(backend, e))?;

        let output = Command::new(&self.config.binary)
            .arg(&image_path)
            .args(self.args())
            .output();

        match output {
            Ok(output) => {
                if output.status.success() {
                    Ok(String::from_utf8_lossy(&output.stdout).to_string())
                } else {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    Err(OcrError::recognition(
                        backend,
                        RecognitionError::Engine(format!(
                            "tesseract exited with {}: {}",
                            output.status,
                            stderr.trim()
                        )),
                    ))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(OcrError::BackendNotAvailable(format!(
                    "{} not found (install tesseract-ocr)",
                    self.config.binary
                )))
            }
            Err(e) => Err(OcrError::recognition(backend, e)),
        }
    }
}

impl Default for TesseractBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl OcrBackend for TesseractBackend {
    fn backend_type(&self) -> OcrBackendType {
        OcrBackendType::Tesseract
    }

    fn is_available(&self) -> bool {
        check_binary(&self.config.binary)
    }

    fn availability_hint(&self) -> String {
        if !self.is_available() {
            "Tesseract not installed. Install with: apt install tesseract-ocr".to_string()
        } else {
            "Tesseract is available".to_string()
        }
    }

    fn ocr_image(&self, image: &RgbImage) -> Result<OcrResult, OcrError> {
        let start = Instant::now();
        let prepared = preprocess(image, self.config.contrast)?;
        let text = self.run_tesseract(&prepared)?;
        Ok(build_ocr_result(&text, OcrBackendType::Tesseract, None, start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::PreprocessError;
    use image::Rgb;

    fn missing_binary() -> TesseractBackend {
        TesseractBackend::with_config(TesseractConfig {
            binary: "smartocr-no-such-tesseract".to_string(),
            ..TesseractConfig::default()
        })
    }

    #[test]
    fn test_args_assume_uniform_block() {
        let args = TesseractBackend::new().args();
        assert_eq!(args, ["stdout", "-l", "eng", "--oem", "3", "--psm", "6"]);
    }

    #[test]
    fn test_missing_binary_is_environment_failure() {
        let backend = missing_binary();
        assert!(!backend.is_available());
        assert!(backend.availability_hint().contains("apt install"));

        let image = RgbImage::from_pixel(10, 10, Rgb([255, 255, 255]));
        let err = backend.ocr_image(&image).unwrap_err();
        assert!(matches!(err, OcrError::BackendNotAvailable(_)));
    }

    #[test]
    fn test_empty_bitmap_fails_in_preprocessing() {
        let err = missing_binary().ocr_image(&RgbImage::new(0, 0)).unwrap_err();
        assert!(matches!(
            err,
            OcrError::Preprocess(PreprocessError::EmptyImage { .. })
        ));
    }
}

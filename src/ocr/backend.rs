//! OCR backend abstraction shared by the printed and handwriting recognizers.
//!
//! Both recognizers implement [`OcrBackend`] so the dispatcher can route a
//! decoded bitmap to either one without knowing which engine sits behind it.

use std::time::Instant;

use image::RgbImage;
use serde::Serialize;
use thiserror::Error;

use super::loader::LoadError;
use super::preprocess::PreprocessError;

/// Errors surfaced by the extraction pipeline.
///
/// Each variant names the stage that failed and keeps the original cause
/// reachable through [`std::error::Error::source`].
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("invalid extraction mode '{0}' (expected printed, handwritten or auto)")]
    InvalidMode(String),

    #[error("failed to load image {reference}")]
    ImageLoad {
        reference: String,
        #[source]
        source: LoadError,
    },

    #[error("preprocessing failed")]
    Preprocess(#[from] PreprocessError),

    #[error("{backend} recognition failed")]
    Recognition {
        backend: OcrBackendType,
        #[source]
        source: RecognitionError,
    },

    /// Environment-setup failure: missing binary, model artifact or credential.
    #[error("backend not available: {0}")]
    BackendNotAvailable(String),
}

impl OcrError {
    pub(crate) fn recognition(backend: OcrBackendType, source: impl Into<RecognitionError>) -> Self {
        OcrError::Recognition {
            backend,
            source: source.into(),
        }
    }
}

/// Failures raised by a backend while running its own inference or matching step.
#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("engine failed: {0}")]
    Engine(String),

    #[error("io error")]
    Io(#[from] std::io::Error),

    #[error("image encoding failed")]
    Image(#[from] image::ImageError),

    #[error("tensor operation failed")]
    Tensor(#[from] candle_core::Error),

    #[error("token decoding failed: {0}")]
    Tokenizer(String),

    #[error("model lock poisoned")]
    Poisoned,
}

/// Result of running a single backend over one bitmap.
#[derive(Debug, Clone, Serialize)]
pub struct OcrResult {
    /// Extracted text, trimmed of surrounding whitespace.
    pub text: String,
    /// Which backend produced this result.
    pub backend: OcrBackendType,
    /// Which model was used, for learned backends.
    pub model: Option<String>,
    /// Processing time in milliseconds.
    pub processing_time_ms: u64,
}

/// Build an [`OcrResult`] from raw engine output, trimming it and recording elapsed time.
pub fn build_ocr_result(
    text: &str,
    backend: OcrBackendType,
    model: Option<String>,
    start: Instant,
) -> OcrResult {
    OcrResult {
        text: text.trim().to_string(),
        backend,
        model,
        processing_time_ms: start.elapsed().as_millis() as u64,
    }
}

/// Available OCR backend types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrBackendType {
    /// Tesseract OCR via command-line, tuned for printed glyphs.
    Tesseract,
    /// TrOCR encoder-decoder model, tuned for handwriting.
    TrOcr,
}

impl OcrBackendType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OcrBackendType::Tesseract => "tesseract",
            OcrBackendType::TrOcr => "trocr",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "tesseract" => Some(OcrBackendType::Tesseract),
            "trocr" => Some(OcrBackendType::TrOcr),
            _ => None,
        }
    }
}

impl std::fmt::Display for OcrBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Trait for OCR backends.
pub trait OcrBackend: Send + Sync {
    /// Get the backend type.
    fn backend_type(&self) -> OcrBackendType;

    /// Check if this backend is available (dependencies installed, models reachable).
    fn is_available(&self) -> bool;

    /// Get a description of what's needed to make this backend available.
    fn availability_hint(&self) -> String;

    /// Run OCR on a decoded color bitmap.
    fn ocr_image(&self, image: &RgbImage) -> Result<OcrResult, OcrError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_backend_type_round_trips_through_str() {
        for backend in [OcrBackendType::Tesseract, OcrBackendType::TrOcr] {
            assert_eq!(OcrBackendType::from_str(backend.as_str()), Some(backend));
        }
        assert_eq!(OcrBackendType::from_str("TrOCR"), Some(OcrBackendType::TrOcr));
        assert_eq!(OcrBackendType::from_str("paddle"), None);
    }

    #[test]
    fn test_build_result_trims_engine_output() {
        let result = build_ocr_result("  \n HELLO \t\n", OcrBackendType::Tesseract, None, Instant::now());
        assert_eq!(result.text, "HELLO");
        assert_eq!(result.backend, OcrBackendType::Tesseract);
    }

    #[test]
    fn test_recognition_error_keeps_cause() {
        let err = OcrError::recognition(
            OcrBackendType::TrOcr,
            RecognitionError::Engine("generate failed".to_string()),
        );
        assert_eq!(err.to_string(), "trocr recognition failed");
        let cause = err.source().expect("cause should be attached");
        assert_eq!(cause.to_string(), "engine failed: generate failed");
    }
}

//! Adaptive text extraction.
//!
//! Extracts text from images that hold either printed or handwritten text:
//! - Tesseract OCR for printed text, after grayscale/invert/contrast preprocessing
//! - TrOCR (ViT encoder + transformer decoder via candle) for handwriting
//!
//! ## Dispatch
//!
//! `SmartOcr` loads an image from a local path or URL and runs exactly one
//! backend. In auto mode the `ModeSelector` picks the backend from the
//! image's mean luminance: bright, mostly-background scans go to Tesseract,
//! darker images go to TrOCR.

mod backend;
mod dispatch;
mod loader;
mod model_utils;
mod preprocess;
mod selector;
mod tesseract;
mod trocr;

pub use backend::{
    build_ocr_result, OcrBackend, OcrBackendType, OcrError, OcrResult, RecognitionError,
};
pub use dispatch::{Extraction, ExtractionMode, SmartOcr};
pub use loader::{BgrImage, DecodedImage, ImageFetcher, ImageLoader, ImageReference, LoadError};
pub use model_utils::{check_binary, HubRepo, ModelHub};
pub use preprocess::{
    enhance_contrast, grayscale, invert, luma, preprocess, PreprocessError, DEFAULT_CONTRAST,
};
pub use selector::{
    bgr_luma, mean_luminance, ContentKind, ModeDecision, ModeSelector, DEFAULT_THRESHOLD,
};
pub use tesseract::TesseractBackend;
pub use trocr::{pixel_values, HandwritingModel, TrocrBackend};

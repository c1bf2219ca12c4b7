//! Text extraction from printed or handwritten images for smartocr.

#![allow(clippy::should_implement_trait)]

pub mod config;
pub mod ocr;

pub use config::Config;
pub use ocr::{Extraction, ExtractionMode, OcrError, SmartOcr};

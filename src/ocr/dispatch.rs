//! Adaptive dispatch between the printed and handwriting backends.
//!
//! A call runs strictly in order: validate the mode, load the image, pick a
//! backend (asking the [`ModeSelector`] in auto mode), run exactly one
//! backend. Nothing is retried and no state survives between calls.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::info;

use super::backend::{OcrBackend, OcrBackendType, OcrError};
use super::loader::{ImageFetcher, ImageLoader, ImageReference};
use super::selector::{ContentKind, ModeDecision, ModeSelector};
use super::tesseract::TesseractBackend;
use super::trocr::TrocrBackend;
use crate::config::Config;

/// Which recognizer the caller wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    Printed,
    Handwritten,
    Auto,
}

impl ExtractionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMode::Printed => "printed",
            ExtractionMode::Handwritten => "handwritten",
            ExtractionMode::Auto => "auto",
        }
    }
}

impl FromStr for ExtractionMode {
    type Err = OcrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "printed" => Ok(ExtractionMode::Printed),
            "handwritten" => Ok(ExtractionMode::Handwritten),
            "auto" => Ok(ExtractionMode::Auto),
            _ => Err(OcrError::InvalidMode(s.to_string())),
        }
    }
}

impl fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Detailed outcome of one extraction.
#[derive(Debug, Clone, Serialize)]
pub struct Extraction {
    /// Recognized text with surrounding whitespace removed. Empty means no text found.
    pub text: String,
    /// Backend that produced the text.
    pub backend: OcrBackendType,
    /// Mode the caller asked for.
    pub mode: ExtractionMode,
    /// Selector verdict, present only in auto mode.
    pub decision: Option<ModeDecision>,
    /// Model used by learned backends.
    pub model: Option<String>,
    /// Wall time for load plus recognition, in milliseconds.
    pub processing_time_ms: u64,
}

/// Routes images to the printed or handwriting backend.
///
/// Cloning is cheap; clones share the loader and both backends, including
/// any model the handwriting backend has already loaded.
#[derive(Clone)]
pub struct SmartOcr {
    loader: Arc<dyn ImageLoader>,
    printed: Arc<dyn OcrBackend>,
    handwritten: Arc<dyn OcrBackend>,
    selector: ModeSelector,
}

impl SmartOcr {
    pub fn new(
        loader: Arc<dyn ImageLoader>,
        printed: Arc<dyn OcrBackend>,
        handwritten: Arc<dyn OcrBackend>,
        selector: ModeSelector,
    ) -> Self {
        Self {
            loader,
            printed,
            handwritten,
            selector,
        }
    }

    /// Build the standard Tesseract + TrOCR pipeline.
    pub fn from_config(config: &Config) -> Result<Self, OcrError> {
        let loader = ImageFetcher::new(&config.http).map_err(|e| {
            OcrError::BackendNotAvailable(format!("Failed to build HTTP client: {}", e))
        })?;
        Ok(Self::new(
            Arc::new(loader),
            Arc::new(TesseractBackend::with_config(config.printed.clone())),
            Arc::new(TrocrBackend::with_config(config.handwritten.clone())),
            ModeSelector::new(config.selector.threshold),
        ))
    }

    pub fn selector(&self) -> ModeSelector {
        self.selector
    }

    pub fn printed(&self) -> &dyn OcrBackend {
        self.printed.as_ref()
    }

    pub fn handwritten(&self) -> &dyn OcrBackend {
        self.handwritten.as_ref()
    }

    /// Extract text from `reference` using a mode given as a string.
    ///
    /// The mode is validated before any file or network access.
    pub fn extract(&self, reference: &str, mode: &str) -> Result<String, OcrError> {
        let mode: ExtractionMode = mode.parse()?;
        Ok(self.extract_with(reference, mode)?.text)
    }

    /// Extract text and report which backend ran and why.
    pub fn extract_with(&self, reference: &str, mode: ExtractionMode) -> Result<Extraction, OcrError> {
        let start = Instant::now();

        let image = self
            .loader
            .load(&ImageReference::parse(reference))
            .map_err(|source| OcrError::ImageLoad {
                reference: reference.to_string(),
                source,
            })?;

        let (backend, decision) = match mode {
            ExtractionMode::Printed => (&self.printed, None),
            ExtractionMode::Handwritten => (&self.handwritten, None),
            ExtractionMode::Auto => {
                let decision = self.selector.decide(image.analysis());
                let backend = match decision.kind {
                    ContentKind::Printed => &self.printed,
                    ContentKind::Handwritten => &self.handwritten,
                };
                info!(
                    kind = ?decision.kind,
                    mean_luminance = decision.mean_luminance,
                    threshold = decision.threshold,
                    "Auto mode chose {}",
                    backend.backend_type()
                );
                (backend, Some(decision))
            }
        };

        let result = backend.ocr_image(image.color())?;

        Ok(Extraction {
            text: result.text.trim().to_string(),
            backend: result.backend,
            mode,
            decision,
            model: result.model,
            processing_time_ms: start.elapsed().as_millis() as u64,
        })
    }
}

//! Printed-vs-handwritten guess from mean luminance.
//!
//! Scanned printed pages are mostly light background, so their mean grey
//! level is high. Photographed notes and handwriting samples trend darker.

use serde::Serialize;

use super::loader::BgrImage;

/// Default mean-luminance threshold; strictly above it counts as printed.
pub const DEFAULT_THRESHOLD: f64 = 100.0;

/// What kind of text an image most likely holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Printed,
    Handwritten,
}

/// The selector's verdict together with the measurement behind it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModeDecision {
    pub kind: ContentKind,
    pub mean_luminance: f64,
    pub threshold: f64,
}

/// Stateless mean-luminance classifier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeSelector {
    threshold: f64,
}

impl ModeSelector {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn classify(&self, image: &BgrImage) -> ContentKind {
        self.decide(image).kind
    }

    pub fn decide(&self, image: &BgrImage) -> ModeDecision {
        let mean_luminance = mean_luminance(image);
        let kind = if mean_luminance > self.threshold {
            ContentKind::Printed
        } else {
            ContentKind::Handwritten
        };
        ModeDecision {
            kind,
            mean_luminance,
            threshold: self.threshold,
        }
    }
}

impl Default for ModeSelector {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

/// BGR to grey with 14-bit fixed-point weights (0.114, 0.587, 0.299).
///
/// This differs from [`preprocess::luma`](super::preprocess::luma) by one
/// grey level on some colours, which matters right at the threshold.
pub fn bgr_luma(b: u8, g: u8, r: u8) -> u8 {
    ((b as u32 * 1868 + g as u32 * 9617 + r as u32 * 4899 + (1 << 13)) >> 14) as u8
}

/// Arithmetic mean of the single-channel luminance over the whole image.
///
/// An image without pixels has mean 0.
pub fn mean_luminance(image: &BgrImage) -> f64 {
    let mut sum = 0u64;
    let mut count = 0u64;
    for [b, g, r] in image.pixels() {
        sum += bgr_luma(b, g, r) as u64;
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        sum as f64 / count as f64
    }
}

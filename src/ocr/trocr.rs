//! TrOCR handwriting backend implementation.
//!
//! Runs a ViT encoder / transformer decoder model with candle. Model files
//! are fetched from the Hugging Face hub on first use and cached locally.
//!
//! The loaded model lives for as long as the backend handle. It is created
//! at most once per handle, and generation takes a lock on it because the
//! decoder keeps a key/value cache between steps.

use std::path::Path;
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

use candle_core::{DType, Device, Module, Tensor, D};
use candle_nn::VarBuilder;
use candle_transformers::models::{trocr, vit};
use image::imageops::FilterType;
use image::RgbImage;
use serde::Deserialize;
use tokenizers::Tokenizer;
use tracing::debug;

use super::backend::{
    build_ocr_result, OcrBackend, OcrBackendType, OcrError, OcrResult, RecognitionError,
};
use super::model_utils::{HubRepo, ModelHub};
use crate::config::TrocrConfig;

const CONFIG_FILE: &str = "config.json";
const WEIGHTS_FILE: &str = "model.safetensors";
const TOKENIZER_FILE: &str = "tokenizer.json";

/// Per-channel normalization used by the ViT image processor.
const PIXEL_MEAN: f32 = 0.5;
const PIXEL_STD: f32 = 0.5;

#[derive(Debug, Clone, Deserialize)]
struct ModelConfig {
    encoder: vit::Config,
    decoder: trocr::TrOCRConfig,
}

/// Convert a bitmap into the `[1, 3, size, size]` tensor the encoder expects.
pub fn pixel_values(image: &RgbImage, size: u32, device: &Device) -> candle_core::Result<Tensor> {
    let resized = image::imageops::resize(image, size, size, FilterType::Triangle);
    let plane = (size * size) as usize;
    let mut data = vec![0f32; 3 * plane];
    for (i, px) in resized.pixels().enumerate() {
        for c in 0..3 {
            data[c * plane + i] = (px[c] as f32 / 255.0 - PIXEL_MEAN) / PIXEL_STD;
        }
    }
    Tensor::from_vec(data, (3, size as usize, size as usize), device)?.unsqueeze(0)
}

/// A loaded TrOCR model paired with its tokenizer.
pub struct HandwritingModel {
    model: trocr::TrOCRModel,
    tokenizer: Tokenizer,
    device: Device,
    image_size: u32,
    decoder_start_token_id: u32,
    eos_token_id: u32,
    name: String,
}

impl HandwritingModel {
    /// Fetch (or reuse cached) model files and load them.
    pub fn load(config: &TrocrConfig) -> Result<Self, OcrError> {
        let hub = ModelHub::new(config.cache_dir.clone(), config.token.clone())?;
        let model_repo = HubRepo::new(&config.model_id, &config.revision);
        let tokenizer_repo = HubRepo::main(&config.tokenizer_repo);

        let config_path = hub.fetch(&model_repo, CONFIG_FILE)?;
        let weights_path = hub.fetch(&model_repo, WEIGHTS_FILE)?;
        let tokenizer_path = hub.fetch(&tokenizer_repo, TOKENIZER_FILE)?;

        let device = if config.use_gpu {
            Device::cuda_if_available(config.gpu_device_id).map_err(|e| {
                OcrError::BackendNotAvailable(format!("Failed to open GPU device: {}", e))
            })?
        } else {
            Device::Cpu
        };

        Self::from_files(
            &config_path,
            &weights_path,
            &tokenizer_path,
            device,
            &config.model_id,
        )
    }

    /// Load from local files.
    pub fn from_files(
        config_path: &Path,
        weights_path: &Path,
        tokenizer_path: &Path,
        device: Device,
        name: &str,
    ) -> Result<Self, OcrError> {
        let unavailable = |what: &str, e: &dyn std::fmt::Display| {
            OcrError::BackendNotAvailable(format!("Failed to load TrOCR {}: {}", what, e))
        };

        let file = std::fs::File::open(config_path).map_err(|e| unavailable("config", &e))?;
        let config: ModelConfig =
            serde_json::from_reader(file).map_err(|e| unavailable("config", &e))?;

        let tokenizer =
            Tokenizer::from_file(tokenizer_path).map_err(|e| unavailable("tokenizer", &e))?;

        // SAFETY: the weights file is owned by the model cache and not modified while mapped.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, &device)
                .map_err(|e| unavailable("weights", &e))?
        };
        let model = trocr::TrOCRModel::new(&config.encoder, &config.decoder, vb)
            .map_err(|e| unavailable("model", &e))?;

        debug!("Loaded TrOCR model {} on {:?}", name, device);

        Ok(Self {
            model,
            tokenizer,
            device,
            image_size: config.encoder.image_size as u32,
            decoder_start_token_id: config.decoder.decoder_start_token_id,
            eos_token_id: config.decoder.eos_token_id,
            name: name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Greedy decode at most `max_tokens` tokens and return the text without special tokens.
    pub fn generate(&mut self, image: &RgbImage, max_tokens: usize) -> Result<String, RecognitionError> {
        let pixels = pixel_values(image, self.image_size, &self.device)?;
        self.model.reset_kv_cache();
        let encoder_xs = self.model.encoder().forward(&pixels)?;

        let mut token_ids = vec![self.decoder_start_token_id];
        for step in 0..max_tokens {
            let context = if step == 0 { token_ids.len() } else { 1 };
            let start_pos = token_ids.len() - context;
            let input_ids = Tensor::new(&token_ids[start_pos..], &self.device)?.unsqueeze(0)?;

            let logits = self.model.decode(&input_ids, &encoder_xs, start_pos)?;
            let logits = logits.squeeze(0)?;
            let logits = logits.get(logits.dim(0)? - 1)?;
            let next = logits.argmax(D::Minus1)?.to_scalar::<u32>()?;
            if next == self.eos_token_id {
                break;
            }
            token_ids.push(next);
        }

        self.tokenizer
            .decode(&token_ids[1..], true)
            .map_err(|e| RecognitionError::Tokenizer(e.to_string()))
    }
}

/// TrOCR OCR backend for handwriting.
pub struct TrocrBackend {
    config: TrocrConfig,
    model: OnceLock<Mutex<HandwritingModel>>,
    init_lock: Mutex<()>,
}

impl TrocrBackend {
    /// Create a new TrOCR backend with default configuration.
    pub fn new() -> Self {
        Self::with_config(TrocrConfig::default())
    }

    /// Create a new TrOCR backend with custom configuration. The model loads on first use.
    pub fn with_config(config: TrocrConfig) -> Self {
        Self {
            config,
            model: OnceLock::new(),
            init_lock: Mutex::new(()),
        }
    }

    /// Create a backend around an already loaded model.
    pub fn with_model(config: TrocrConfig, model: HandwritingModel) -> Self {
        let backend = Self::with_config(config);
        let _ = backend.model.set(Mutex::new(model));
        backend
    }

    /// Load the model now instead of on the first recognition call.
    pub fn preload(&self) -> Result<(), OcrError> {
        self.get_or_init_model().map(|_| ())
    }

    pub fn is_loaded(&self) -> bool {
        self.model.get().is_some()
    }

    /// Get or initialize the model, loading it at most once.
    fn get_or_init_model(&self) -> Result<&Mutex<HandwritingModel>, OcrError> {
        if let Some(model) = self.model.get() {
            return Ok(model);
        }

        let _guard = self.init_lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(model) = self.model.get() {
            return Ok(model);
        }

        let model = HandwritingModel::load(&self.config)?;
        let _ = self.model.set(Mutex::new(model));
        self.model
            .get()
            .ok_or_else(|| OcrError::BackendNotAvailable("Failed to cache TrOCR model".to_string()))
    }

    fn files_cached(&self) -> bool {
        let Ok(hub) = ModelHub::new(self.config.cache_dir.clone(), None) else {
            return false;
        };
        let model_repo = HubRepo::new(&self.config.model_id, &self.config.revision);
        let tokenizer_repo = HubRepo::main(&self.config.tokenizer_repo);
        hub.cached(&model_repo, CONFIG_FILE).is_some()
            && hub.cached(&model_repo, WEIGHTS_FILE).is_some()
            && hub.cached(&tokenizer_repo, TOKENIZER_FILE).is_some()
    }
}

impl Default for TrocrBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl OcrBackend for TrocrBackend {
    fn backend_type(&self) -> OcrBackendType {
        OcrBackendType::TrOcr
    }

    fn is_available(&self) -> bool {
        self.is_loaded() || self.files_cached()
    }

    fn availability_hint(&self) -> String {
        if self.is_loaded() {
            format!("TrOCR model {} is loaded", self.config.model_id)
        } else if self.files_cached() {
            format!("TrOCR model {} is cached", self.config.model_id)
        } else {
            format!(
                "TrOCR model {} downloads on first use (set HUGGINGFACE_TOKEN if the hub requires it)",
                self.config.model_id
            )
        }
    }

    fn ocr_image(&self, image: &RgbImage) -> Result<OcrResult, OcrError> {
        let start = Instant::now();
        let backend = OcrBackendType::TrOcr;
        let mut model = self
            .get_or_init_model()?
            .lock()
            .map_err(|_| OcrError::recognition(backend, RecognitionError::Poisoned))?;
        let text = model
            .generate(image, self.config.max_tokens)
            .map_err(|e| OcrError::recognition(backend, e))?;
        let name = model.name().to_string();
        Ok(build_ocr_result(&text, backend, Some(name), start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use tempfile::TempDir;

    fn offline_backend(dir: &TempDir) -> TrocrBackend {
        TrocrBackend::with_config(TrocrConfig {
            cache_dir: Some(dir.path().to_path_buf()),
            token: None,
            ..TrocrConfig::default()
        })
    }

    #[test]
    fn test_pixel_values_shape_and_range() {
        let mut image = RgbImage::from_pixel(40, 20, Rgb([255, 255, 255]));
        image.put_pixel(0, 0, Rgb([0, 0, 0]));

        let tensor = pixel_values(&image, 32, &Device::Cpu).unwrap();
        assert_eq!(tensor.dims(), &[1, 3, 32, 32]);

        let values: Vec<f32> = tensor.flatten_all().unwrap().to_vec1().unwrap();
        assert!(values.iter().all(|v| (-1.0..=1.0).contains(v)));
        assert_eq!(values[values.len() - 1], 1.0);
    }

    #[test]
    fn test_pixel_values_keep_channel_planes() {
        let image = RgbImage::from_pixel(8, 8, Rgb([255, 0, 255]));
        let tensor = pixel_values(&image, 4, &Device::Cpu).unwrap();
        let planes: Vec<Vec<f32>> = (0..3)
            .map(|c| {
                tensor
                    .get(0)
                    .and_then(|t| t.get(c))
                    .and_then(|t| t.flatten_all())
                    .and_then(|t| t.to_vec1())
                    .unwrap()
            })
            .collect();
        assert!(planes[0].iter().all(|v| *v == 1.0));
        assert!(planes[1].iter().all(|v| *v == -1.0));
        assert!(planes[2].iter().all(|v| *v == 1.0));
    }

    #[test]
    fn test_not_loaded_until_used() {
        let dir = TempDir::new().unwrap();
        let backend = offline_backend(&dir);
        assert!(!backend.is_loaded());
        assert!(!backend.is_available());
        assert!(backend.availability_hint().contains("downloads on first use"));
    }

    #[test]
    #[ignore = "downloads the TrOCR model from the Hugging Face hub"]
    fn test_model_loads_once_and_reads_text() {
        let backend = TrocrBackend::new();
        backend.preload().unwrap();
        assert!(backend.is_loaded());

        let image = RgbImage::from_pixel(384, 96, Rgb([255, 255, 255]));
        let result = backend.ocr_image(&image).unwrap();
        assert_eq!(result.text, result.text.trim());
        assert_eq!(result.model.as_deref(), Some("microsoft/trocr-base-handwritten"));
    }
}

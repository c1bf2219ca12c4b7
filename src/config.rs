//! Configuration management for smartocr using the prefer crate.
//!
//! Every field defaults to the reference behavior, so an empty or missing
//! config file yields a working setup.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ocr::{DEFAULT_CONTRAST, DEFAULT_THRESHOLD};

/// Environment variable overriding the auto-mode threshold.
pub const THRESHOLD_ENV: &str = "SMARTOCR_AUTO_THRESHOLD";

/// Environment variables checked, in order, for the model hub token.
pub const TOKEN_ENVS: [&str; 2] = ["HUGGINGFACE_TOKEN", "HF_TOKEN"];

/// Mode selector settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// Mean luminance (0-255) above which an image counts as printed.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

fn default_threshold() -> f64 {
    std::env::var(THRESHOLD_ENV)
        .ok()
        .and_then(|v| parse_threshold(&v))
        .unwrap_or(DEFAULT_THRESHOLD)
}

/// Parse a threshold override. `NaN` and infinities would make every image
/// compare the same way, so they are rejected.
fn parse_threshold(value: &str) -> Option<f64> {
    match value.trim().parse::<f64>() {
        Ok(t) if t.is_finite() => Some(t),
        _ => {
            warn!(
                "Ignoring {}={:?}; expected a finite number",
                THRESHOLD_ENV, value
            );
            None
        }
    }
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
        }
    }
}

/// Tesseract backend settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TesseractConfig {
    /// Tesseract executable name or path.
    pub binary: String,
    /// Language for OCR (e.g., "eng", "chi_sim").
    pub language: String,
    /// OCR engine mode (`--oem`).
    pub oem: u8,
    /// Page segmentation mode (`--psm`); 6 assumes one uniform block of text.
    pub psm: u8,
    /// Contrast multiplier applied after inversion.
    pub contrast: f32,
}

impl Default for TesseractConfig {
    fn default() -> Self {
        Self {
            binary: "tesseract".to_string(),
            language: "eng".to_string(),
            oem: 3,
            psm: 6,
            contrast: DEFAULT_CONTRAST,
        }
    }
}

/// TrOCR backend settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrocrConfig {
    /// Model hub repository holding `config.json` and the safetensors weights.
    pub model_id: String,
    /// Revision to fetch the model from.
    pub revision: String,
    /// Repository holding a `tokenizer.json` compatible with the model.
    pub tokenizer_repo: String,
    /// Upper bound on generated tokens per image.
    pub max_tokens: usize,
    /// Whether to use GPU acceleration if available.
    pub use_gpu: bool,
    /// Device ID for GPU (if multiple GPUs).
    pub gpu_device_id: usize,
    /// Where downloaded model files are cached; the hub default when unset.
    pub cache_dir: Option<PathBuf>,
    /// Model hub access token. Never written back out.
    #[serde(skip_serializing)]
    pub token: Option<String>,
}

fn token_from_env() -> Option<String> {
    TOKEN_ENVS
        .iter()
        .find_map(|name| std::env::var(name).ok())
        .filter(|t| !t.trim().is_empty())
}

impl Default for TrocrConfig {
    fn default() -> Self {
        Self {
            model_id: "microsoft/trocr-base-handwritten".to_string(),
            revision: "refs/pr/3".to_string(),
            tokenizer_repo: "ToluClassics/candle-trocr-tokenizer".to_string(),
            max_tokens: 64,
            use_gpu: false,
            gpu_device_id: 0,
            cache_dir: None,
            token: token_from_env(),
        }
    }
}

/// HTTP client settings for remote image references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    /// Request timeout; no timeout when unset.
    pub timeout_secs: Option<u64>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("smartocr/{}", env!("CARGO_PKG_VERSION")),
            timeout_secs: None,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub selector: SelectorConfig,
    #[serde(default)]
    pub printed: TesseractConfig,
    #[serde(default)]
    pub handwritten: TrocrConfig,
    #[serde(default)]
    pub http: HttpConfig,

    /// File this config was loaded from.
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    /// Automatically discovers smartocr config files in standard locations.
    pub async fn load() -> Self {
        match prefer::load("smartocr").await {
            Ok(pref_config) => {
                if let Some(path) = pref_config.source_path() {
                    match Self::load_from_path(path).await {
                        Ok(config) => config,
                        Err(e) => {
                            warn!("Ignoring config file {}: {}", path.display(), e);
                            Self::default()
                        }
                    }
                } else {
                    Self::default()
                }
            }
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let mut config = Self::parse(&contents, path)?;
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Parse config text, picking the format from the path's extension.
    pub fn parse(contents: &str, path: &Path) -> Result<Self, String> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

        match ext {
            "toml" => toml::from_str(contents)
                .map_err(|e| format!("Failed to parse TOML config: {}", e)),
            "yaml" | "yml" => serde_yaml::from_str(contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e)),
            _ => serde_json::from_str(contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_reference_behavior() {
        let config = Config::default();
        assert_eq!(config.printed.psm, 6);
        assert_eq!(config.printed.oem, 3);
        assert_eq!(config.printed.contrast, 2.0);
        assert_eq!(config.handwritten.model_id, "microsoft/trocr-base-handwritten");
        assert_eq!(config.http.timeout_secs, None);
    }

    #[test]
    fn test_threshold_override_must_be_finite() {
        assert_eq!(parse_threshold(" 120.5 "), Some(120.5));
        assert_eq!(parse_threshold("80"), Some(80.0));
        assert_eq!(parse_threshold("NaN"), None);
        assert_eq!(parse_threshold("inf"), None);
        assert_eq!(parse_threshold("-infinity"), None);
        assert_eq!(parse_threshold("bright"), None);
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let config = Config::parse(
            "[printed]\nlanguage = \"deu\"\n\n[handwritten]\nmax_tokens = 32\n",
            Path::new("smartocr.toml"),
        )
        .unwrap();
        assert_eq!(config.printed.language, "deu");
        assert_eq!(config.printed.psm, 6);
        assert_eq!(config.handwritten.max_tokens, 32);
        assert_eq!(config.handwritten.revision, "refs/pr/3");
    }

    #[test]
    fn test_yaml_and_json_formats() {
        let yaml = Config::parse("selector:\n  threshold: 120\n", Path::new("c.yml")).unwrap();
        assert_eq!(yaml.selector.threshold, 120.0);

        let json = Config::parse(r#"{"http": {"timeout_secs": 5}}"#, Path::new("c.json")).unwrap();
        assert_eq!(json.http.timeout_secs, Some(5));
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        let err = Config::parse("printed = [", Path::new("bad.toml")).unwrap_err();
        assert!(err.starts_with("Failed to parse TOML config"));
    }

    #[test]
    fn test_token_is_not_serialized() {
        let mut config = TrocrConfig::default();
        config.token = Some("hf_secret".to_string());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("hf_secret"));
    }

    #[tokio::test]
    async fn test_load_from_path_records_source() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("smartocr.toml");
        std::fs::write(&path, "[printed]\npsm = 7\n").unwrap();

        let config = Config::load_from_path(&path).await.unwrap();
        assert_eq!(config.printed.psm, 7);
        assert_eq!(config.source_path.as_deref(), Some(path.as_path()));
    }
}

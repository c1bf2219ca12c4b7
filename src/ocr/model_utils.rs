//! Shared utilities for OCR backends.
//!
//! Provides common functionality for:
//! - Checking for CLI tool availability
//! - Locating and downloading model files from the Hugging Face hub

use std::path::PathBuf;

use hf_hub::api::sync::{Api, ApiBuilder};
use hf_hub::{Cache, Repo, RepoType};
use tracing::debug;

use super::backend::OcrError;

/// Check if a binary is available in PATH (or is an existing path).
pub fn check_binary(name: &str) -> bool {
    which::which(name).is_ok()
}

/// A model hub repository pinned to a revision.
#[derive(Debug, Clone)]
pub struct HubRepo {
    pub id: String,
    pub revision: String,
}

impl HubRepo {
    pub fn new(id: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            revision: revision.into(),
        }
    }

    /// Repository on its default branch.
    pub fn main(id: impl Into<String>) -> Self {
        Self::new(id, "main")
    }

    fn repo(&self) -> Repo {
        Repo::with_revision(self.id.clone(), RepoType::Model, self.revision.clone())
    }
}

/// Client for fetching model files, backed by the hub's local cache.
pub struct ModelHub {
    api: Api,
    cache: Cache,
}

impl ModelHub {
    /// Build a hub client. Without an explicit token, the one saved by
    /// `huggingface-cli login` is used.
    pub fn new(cache_dir: Option<PathBuf>, token: Option<String>) -> Result<Self, OcrError> {
        let cache = cache_dir.clone().map(Cache::new).unwrap_or_default();
        let token = resolve_token(token, &Cache::default());
        let mut builder = ApiBuilder::new().with_progress(false).with_token(token);
        if let Some(dir) = cache_dir {
            builder = builder.with_cache_dir(dir);
        }
        let api = builder.build().map_err(|e| {
            OcrError::BackendNotAvailable(format!("Failed to create model hub client: {}", e))
        })?;
        Ok(Self { api, cache })
    }

    /// Return a local path for `filename`, downloading it on first use.
    pub fn fetch(&self, repo: &HubRepo, filename: &str) -> Result<PathBuf, OcrError> {
        if let Some(path) = self.cached(repo, filename) {
            return Ok(path);
        }
        debug!("Downloading {} from {}@{}", filename, repo.id, repo.revision);
        self.api.repo(repo.repo()).get(filename).map_err(|e| {
            OcrError::BackendNotAvailable(format!(
                "Failed to fetch {} from {}@{}: {}",
                filename, repo.id, repo.revision, e
            ))
        })
    }

    /// Look up `filename` in the local cache without touching the network.
    pub fn cached(&self, repo: &HubRepo, filename: &str) -> Option<PathBuf> {
        self.cache.repo(repo.repo()).get(filename)
    }
}

/// An explicit token wins over the one stored next to `login_cache`.
fn resolve_token(explicit: Option<String>, login_cache: &Cache) -> Option<String> {
    explicit.or_else(|| login_cache.token())
}

use crate::assets::derive_filename;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_ASSETS: &str = include_str!("assets.toml");

pub const DEFAULT_MODEL_DIR: &str = "/workspace/models";
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_IMAGE_BYTES: u64 = 32 * 1024 * 1024;

/// Name of the asset the face-swap resource is built from.
pub const FACE_SWAP_ASSET: &str = "face-swap-model";

#[derive(Debug, Serialize, Deserialize)]
struct RegistryFile {
    assets: Vec<AssetEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetEntry {
    pub name: String,
    pub url: String,
}

/// Where assets live and which ones the worker knows about.
#[derive(Debug, Clone)]
pub struct AssetRegistry {
    model_dir: PathBuf,
    fetch_timeout: Duration,
    max_image_bytes: u64,
    assets: Vec<AssetEntry>,
    url_override: Option<Vec<String>>,
}

impl AssetRegistry {
    /// Builds the registry from `MODEL_DIR`, `FETCH_TIMEOUT_SECS`,
    /// `MAX_IMAGE_BYTES` and `DEFAULT_MODEL_URLS`, creating the model directory.
    pub fn from_env() -> Result<Self> {
        let model_dir = std::env::var("MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_MODEL_DIR));

        let mut registry = Self::with_model_dir(model_dir)?;

        if let Some(secs) = env_parse::<u64>("FETCH_TIMEOUT_SECS")? {
            registry.fetch_timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(limit) = env_parse::<u64>("MAX_IMAGE_BYTES")? {
            registry.max_image_bytes = limit;
        }
        if let Ok(urls) = std::env::var("DEFAULT_MODEL_URLS") {
            let urls: Vec<String> = urls
                .split(',')
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(String::from)
                .collect();
            if !urls.is_empty() {
                registry.url_override = Some(urls);
            }
        }

        Ok(registry)
    }

    /// Registry with built-in defaults rooted at `model_dir`.
    pub fn with_model_dir(model_dir: impl Into<PathBuf>) -> Result<Self> {
        let model_dir = model_dir.into();
        fs::create_dir_all(&model_dir)
            .with_context(|| format!("Could not create model directory {:?}", model_dir))?;

        let parsed: RegistryFile =
            toml::from_str(DEFAULT_ASSETS).context("Built-in asset list is malformed")?;

        Ok(Self {
            model_dir,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            assets: parsed.assets,
            url_override: None,
        })
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_default_urls(mut self, urls: Vec<String>) -> Self {
        self.url_override = Some(urls);
        self
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    pub fn max_image_bytes(&self) -> u64 {
        self.max_image_bytes
    }

    /// Locators fetched when a download request names none.
    pub fn default_urls(&self) -> Vec<String> {
        match &self.url_override {
            Some(urls) => urls.clone(),
            None => self.assets.iter().map(|a| a.url.clone()).collect(),
        }
    }

    pub fn resolve(&self, name: &str) -> Option<&AssetEntry> {
        self.assets.iter().find(|a| a.name == name)
    }

    /// Where the named asset ends up once downloaded.
    pub fn asset_path(&self, name: &str) -> Option<PathBuf> {
        self.resolve(name)
            .map(|entry| self.model_dir.join(derive_filename(&entry.url)))
    }
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{} has an invalid value: {}", key, raw)),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_list_names_swap_model() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let registry = AssetRegistry::with_model_dir(dir.path())?;

        let path = registry.asset_path(FACE_SWAP_ASSET).expect("swap asset");
        assert_eq!(path, dir.path().join("inswapper_128.onnx"));
        assert_eq!(registry.default_urls().len(), 1);
        Ok(())
    }

    #[test]
    fn override_replaces_default_urls() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let registry = AssetRegistry::with_model_dir(dir.path().join("nested"))?
            .with_default_urls(vec!["https://example.com/a.bin".into()]);

        assert!(dir.path().join("nested").is_dir());
        assert_eq!(registry.default_urls(), vec!["https://example.com/a.bin"]);
        Ok(())
    }
}

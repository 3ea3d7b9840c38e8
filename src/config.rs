use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::relay::executor::MAX_RETRIES;
use crate::relay::DEFAULT_SEARCH_LIMIT;

pub const ENV_API_URL: &str = "BULKTAG_API_URL";
pub const ENV_GALLERY_URL: &str = "BULKTAG_GALLERY_URL";
pub const ENV_STORE: &str = "BULKTAG_STORE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub gallery: GalleryConfig,
    pub store: StoreConfig,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            gallery: GalleryConfig::default(),
            store: StoreConfig::default(),
            log_filter: "warn,bulktag=info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub search_limit: usize,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.au.dcisive.io".to_string(),
            search_limit: DEFAULT_SEARCH_LIMIT,
            max_retries: MAX_RETRIES,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GalleryConfig {
    pub url: String,
    pub refresh_delay_ms: u64,
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self {
            url: "https://demo.au.dcisive.io/goto/files".to_string(),
            refresh_delay_ms: 1500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let path = ProjectDirs::from("", "", "bulktag")
            .map(|dirs| dirs.data_dir().join("settings.json").display().to_string())
            .unwrap_or_else(|| "~/.bulktag/settings.json".to_string());
        Self { path }
    }
}

impl Config {
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "bulktag").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Loads `path`, or the default location when `None`. An explicit path
    /// must exist; a missing default file yields defaults. Environment
    /// overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::read(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::read(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("Failed to parse config")
    }

    fn read(path: &Path) -> Result<Self> {
        let expanded = shellexpand::tilde(&path.to_string_lossy()).to_string();
        let raw = std::fs::read_to_string(&expanded)
            .with_context(|| format!("Failed to read config {expanded}"))?;
        Self::from_toml(&raw).with_context(|| format!("Invalid config {expanded}"))
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = non_empty(ENV_API_URL) {
            self.api.base_url = url;
        }
        if let Some(url) = non_empty(ENV_GALLERY_URL) {
            self.gallery.url = url;
        }
        if let Some(path) = non_empty(ENV_STORE) {
            self.store.path = path;
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs.max(1))
    }

    pub fn refresh_delay(&self) -> Duration {
        Duration::from_millis(self.gallery.refresh_delay_ms)
    }
}

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::relay::credential::Credential;

/// Values shared between the config surface and the tagger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<Credential>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            token: None,
            enabled: true,
        }
    }
}

fn default_enabled() -> bool {
    true
}

/// JSON-file key-value store for [`Settings`].
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: &str) -> Self {
        let expanded = shellexpand::tilde(path).to_string();
        Self {
            path: PathBuf::from(expanded),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the store; a missing file yields defaults.
    pub async fn load(&self) -> Result<Settings> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Settings::default()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read {}", self.path.display()))
            }
        };
        let mut settings: Settings = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse {}", self.path.display()))?;
        if settings.token.as_ref().is_some_and(Credential::is_blank) {
            settings.token = None;
        }
        Ok(settings)
    }

    pub async fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .await
                .context("Failed to create settings directory")?;
        }
        let raw = serde_json::to_string_pretty(settings).context("Failed to encode settings")?;
        fs::write(&self.path, raw)
            .await
            .context("Failed to write settings")?;
        Ok(())
    }

    /// Stores a new token. Blank input is rejected.
    pub async fn set_token(&self, token: &str) -> Result<Settings> {
        let credential = Credential::parse(token).context("Please paste a token first")?;
        let mut settings = self.load().await?;
        settings.token = Some(credential);
        self.save(&settings).await?;
        tracing::info!(path = %self.path.display(), "Token saved");
        Ok(settings)
    }

    pub async fn set_enabled(&self, enabled: bool) -> Result<Settings> {
        let mut settings = self.load().await?;
        settings.enabled = enabled;
        self.save(&settings).await?;
        Ok(settings)
    }
}

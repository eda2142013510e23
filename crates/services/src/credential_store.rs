//! Extension-side persisted settings (the API key lives here).
//!
//! Only the privileged side touches this store; the page side asks for the key
//! over the credential bridge.

use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const API_KEY: &str = "apiKey";

pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store under the per-user config directory.
    pub fn open_default() -> Result<Self> {
        let dirs = directories::ProjectDirs::from("com.local", "Problem Assistant", "ProblemAssistant")
            .ok_or_else(|| anyhow!("no home directory available"))?;
        fs::create_dir_all(dirs.config_dir())?;
        Ok(Self::at_path(dirs.config_dir().join("credentials.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let bytes = fs::read(&self.path)?;
        if bytes.is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load()?.remove(key))
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.load()?;
        entries.insert(key.to_string(), value.to_string());
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_vec_pretty(&entries)?)?;
        Ok(())
    }

    pub fn api_key(&self) -> Result<Option<String>> {
        Ok(self.get(API_KEY)?.filter(|k| !k.trim().is_empty()))
    }

    /// Save a trimmed key; blank input is rejected like the settings form does.
    pub fn set_api_key(&self, value: &str) -> Result<()> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(anyhow!("API key must not be empty"));
        }
        self.set(API_KEY, trimmed)?;
        tracing::info!(path = %self.path.display(), "API key saved");
        Ok(())
    }
}

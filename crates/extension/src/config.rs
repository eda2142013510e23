//! Settings loading: `settings.json` in the per-user config dir, then env overrides.

use anyhow::{Context, Result};
use shared::settings::AssistantSettings;
use std::fs;
use std::path::{Path, PathBuf};

pub const API_BASE_ENV: &str = "ASSISTANT_API_BASE";
pub const MODEL_ENV: &str = "ASSISTANT_MODEL";

pub fn config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("com.local", "Problem Assistant", "ProblemAssistant")
        .map(|proj| proj.config_dir().join("settings.json"))
}

/// Parse settings from `path`; a missing file yields defaults.
pub fn load_from(path: &Path) -> Result<AssistantSettings> {
    if !path.exists() {
        return Ok(AssistantSettings::default());
    }
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parsing {}", path.display()))
}

/// Apply `ASSISTANT_*` overrides from `lookup` (usually the process env).
pub fn apply_overrides(settings: &mut AssistantSettings, lookup: impl Fn(&str) -> Option<String>) {
    let non_blank = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    if let Some(api_base) = non_blank(API_BASE_ENV) {
        settings.platform.api_base = api_base;
    }
    if let Some(model) = non_blank(MODEL_ENV) {
        settings.model.gemini_model = model;
    }
}

/// Settings from the default location, falling back to defaults on any problem.
pub fn load_settings_or_default() -> AssistantSettings {
    let mut settings = match config_path() {
        Some(path) => match load_from(&path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(error = %format!("{:#}", e), "invalid settings file, using defaults");
                AssistantSettings::default()
            }
        },
        None => AssistantSettings::default(),
    };
    apply_overrides(&mut settings, |name| std::env::var(name).ok());
    settings
}

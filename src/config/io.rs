//! Settings I/O: load and save.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::warn;

use super::config_struct::Settings;
use super::types::{API_KEY_ENV, APP_DIR_NAME, SETTINGS_FILE_NAME};

/// Get the settings file path
pub fn get_settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_default()
        .join(APP_DIR_NAME)
        .join(SETTINGS_FILE_NAME)
}

/// Load settings from the default location
pub fn load_settings() -> Settings {
    load_settings_from(&get_settings_path())
}

/// Missing or broken files yield defaults. An empty api key is filled
/// from the environment.
pub fn load_settings_from(path: &Path) -> Settings {
    let mut settings = match std::fs::read_to_string(path) {
        Ok(data) => match serde_json::from_str::<Settings>(&data) {
            Ok(s) => s,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "settings file is invalid, using defaults");
                Settings::default()
            }
        },
        Err(_) => Settings::default(),
    };

    if settings.api_key.trim().is_empty() {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            settings.api_key = key;
        }
    }

    settings.normalized()
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    save_settings_to(&get_settings_path(), settings)
}

pub fn save_settings_to(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    let data = serde_json::to_string_pretty(&settings.clone().normalized())?;
    std::fs::write(path, data).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

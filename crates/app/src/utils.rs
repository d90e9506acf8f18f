//! Utility functions for the Thinkchat app
//!
//! Settings live in `settings.json` under the platform config directory.

use shared::settings::ChatSettings;
use std::path::{Path, PathBuf};

/// Get the config file path
pub fn config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("com.local", "Thinkchat", "Thinkchat")
        .map(|p| p.config_dir().join("settings.json"))
}

/// Read settings from `path`; `None` if missing or unreadable
pub fn load_settings_from(path: &Path) -> Option<ChatSettings> {
    let contents = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str::<ChatSettings>(&contents) {
        Ok(settings) => Some(settings),
        Err(e) => {
            tracing::warn!("ignoring invalid settings file {}: {}", path.display(), e);
            None
        }
    }
}

/// Load settings from disk or return defaults.
/// The flag tells whether a settings file was found.
pub fn load_settings_or_default() -> (ChatSettings, bool) {
    if let Some(path) = config_path() {
        if let Some(settings) = load_settings_from(&path) {
            return (settings, true);
        }
    }
    (ChatSettings::default(), false)
}

pub fn save_settings_to(path: &Path, settings: &ChatSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, json)
}

/// Save settings to disk
pub fn save_settings(settings: &ChatSettings) {
    if let Some(path) = config_path() {
        if let Err(e) = save_settings_to(&path, settings) {
            tracing::warn!("could not write settings to {}: {}", path.display(), e);
        }
    }
}

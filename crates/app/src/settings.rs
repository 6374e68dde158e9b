//! Settings file discovery and loading.

use shared::settings::AppSettings;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Default settings location in the platform config directory
pub fn config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("com.local", "Code Shell", "CodeShell")
        .map(|proj| proj.config_dir().join("settings.json"))
}

/// Reads settings from `path`, falling back to defaults when the file is
/// missing or unreadable.
pub fn load_settings_or_default(path: Option<&Path>) -> AppSettings {
    let Some(path) = path else {
        return AppSettings::default();
    };
    match fs::read_to_string(path) {
        Ok(text) => match serde_json::from_str::<AppSettings>(&text) {
            Ok(settings) => {
                debug!(path = %path.display(), "settings loaded");
                settings
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "settings file is invalid, using defaults");
                AppSettings::default()
            }
        },
        Err(_) => AppSettings::default(),
    }
}

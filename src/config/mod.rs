use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, ZipdirError};

pub mod settings;

pub use settings::{BackendKind, BackupKind, Settings};

fn config_dir() -> Option<PathBuf> {
    if cfg!(windows) {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return Some(PathBuf::from(appdata).join("zipdir"));
        }
        std::env::var("USERPROFILE")
            .ok()
            .map(|home| PathBuf::from(home).join("AppData\\Roaming").join("zipdir"))
    } else {
        std::env::var("HOME").ok().map(|home| PathBuf::from(home).join(".zipdir"))
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.json"))
}

/// Load settings from an explicit file, the per-user file, or defaults.
///
/// An explicit path must exist; the per-user file is optional.
pub fn load_settings(explicit: Option<&Path>) -> Result<Settings> {
    let settings = match explicit {
        Some(path) => read_settings(path)?,
        None => match default_config_path() {
            Some(path) if path.is_file() => read_settings(&path)?,
            _ => Settings::default(),
        },
    };
    settings.validate()?;
    Ok(settings)
}

fn read_settings(path: &Path) -> Result<Settings> {
    let content = fs::read_to_string(path)
        .map_err(|e| ZipdirError::Config(format!("cannot read {}: {}", path.display(), e)))?;
    if content.trim().is_empty() {
        // Treat empty file as all defaults
        return Ok(Settings::default());
    }
    serde_json::from_str(&content)
        .map_err(|e| ZipdirError::Config(format!("invalid config {}: {}", path.display(), e)))
}

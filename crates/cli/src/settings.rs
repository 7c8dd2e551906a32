//! pixport settings file parsing (pixport.toml)

use std::path::{Path, PathBuf};

/// Persistent CLI settings
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Export destination folder
    pub folder: Option<PathBuf>,

    /// Library directory holding `library.json` and blobs
    pub library: Option<PathBuf>,

    /// Re-export automatically when the library changes
    pub continuous_export: bool,
}

/// Settings file name
pub const SETTINGS_FILE: &str = "pixport.toml";

impl Settings {
    /// Load settings from `explicit`, or from `pixport.toml` in the current
    /// directory.
    ///
    /// Returns defaults if no settings file exists.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load(explicit: Option<&Path>) -> color_eyre::Result<Self> {
        let path = explicit
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(SETTINGS_FILE));
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let settings: Self = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Self::default())
        }
    }
}

//! Platform directory resolution and persisted application settings.
//!
//! Follows the teacher's `resolve_root_folder` convention: OS-dependent
//! defaults resolved through the `dirs` crate, with a single JSON document
//! as the source of truth instead of a TOML/env/database cascade (the
//! pipeline has exactly one consumer, so one config tier is enough).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const APP_DIR: &str = "audio-pipeline";
const SETTINGS_FILE: &str = "settings.json";

/// Directory holding `settings.json` on this platform.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Directory holding the persistent cache database and log files.
pub fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

pub fn settings_path() -> PathBuf {
    config_dir().join(SETTINGS_FILE)
}

pub fn cache_db_path() -> PathBuf {
    data_dir().join("cache.db")
}

pub fn log_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Options recognised by the orchestrator (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub concurrency: u32,
    pub fetch_lyrics: bool,
    pub overwrite_existing_tags: bool,
    pub output_folder: Option<PathBuf>,
    pub naming_template: String,
    pub use_persistent_cache: bool,
    pub acoustid_api_key: String,
    pub use_spotify: bool,
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,
    pub use_genius: bool,
    pub genius_access_token: Option<String>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            concurrency: 5,
            fetch_lyrics: false,
            overwrite_existing_tags: true,
            output_folder: None,
            naming_template: "{artist} - {title}".to_string(),
            use_persistent_cache: false,
            acoustid_api_key: String::new(),
            use_spotify: false,
            spotify_client_id: None,
            spotify_client_secret: None,
            use_genius: false,
            genius_access_token: None,
        }
    }
}

impl AppSettings {
    /// Clamp/repair fields that are out of range; unknown JSON fields are
    /// already dropped by serde. Values that cannot be silently repaired
    /// (an unusable naming template) surface as `Error::Validation`.
    pub fn normalize(mut self) -> Result<Self> {
        self.concurrency = self.concurrency.clamp(1, 10);

        if !self.naming_template.contains("{artist}") && !self.naming_template.contains("{title}")
        {
            return Err(Error::Validation(
                "namingTemplate must contain {artist} or {title}".to_string(),
            ));
        }

        Ok(self)
    }

    /// Load from `{platform-config-dir}/audio-pipeline/settings.json`.
    /// A missing file yields defaults; malformed JSON is replaced with
    /// defaults rather than failing the whole process.
    pub async fn load() -> Result<Self> {
        let path = settings_path();
        let settings = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
            Err(_) => AppSettings::default(),
        };
        settings.normalize()
    }

    pub async fn save(&self) -> Result<()> {
        let path = settings_path();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Validation(format!("cannot serialize settings: {e}")))?;
        tokio::fs::write(&path, json).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_concurrency() {
        for (input, expected) in [(0u32, 1u32), (1, 1), (11, 10), (1000, 10), (5, 5)] {
            let settings = AppSettings {
                concurrency: input,
                ..AppSettings::default()
            };
            assert_eq!(settings.normalize().unwrap().concurrency, expected);
        }
    }

    #[test]
    fn rejects_naming_template_without_placeholders() {
        let settings = AppSettings {
            naming_template: "static-name".to_string(),
            ..AppSettings::default()
        };
        assert!(settings.normalize().is_err());
    }

    #[test]
    fn accepts_title_only_template() {
        let settings = AppSettings {
            naming_template: "{title}".to_string(),
            ..AppSettings::default()
        };
        assert!(settings.normalize().is_ok());
    }
}

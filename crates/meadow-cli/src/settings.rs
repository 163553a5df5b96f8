//! Saved CLI settings.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use meadow_hcom::ConnectionConfig;
use serde::{Deserialize, Serialize};

/// Environment variable overriding the settings directory.
pub const HOME_ENV: &str = "MEADOW_HOME";

const SETTINGS_FILE: &str = "settings.json";

/// Settings persisted between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Default route to the device.
    pub route: Option<String>,
    /// Connection tuning.
    pub connection: ConnectionConfig,
}

impl Settings {
    /// `$MEADOW_HOME/settings.json`, else `~/.meadow/settings.json`.
    pub fn default_path() -> Result<PathBuf> {
        if let Some(dir) = std::env::var_os(HOME_ENV) {
            return Ok(PathBuf::from(dir).join(SETTINGS_FILE));
        }
        let home = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .ok_or_else(|| anyhow!("cannot find a home directory; set {}", HOME_ENV))?;
        Ok(PathBuf::from(home).join(".meadow").join(SETTINGS_FILE))
    }

    /// Load settings, falling back to defaults when the file does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Settings::default());
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    /// Write settings, creating the directory if needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text).with_context(|| format!("writing {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::load_from(&dir.path().join("settings.json")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let settings = Settings {
            route: Some("/dev/ttyACM0".to_string()),
            connection: ConnectionConfig::default().with_baud_rate(921_600),
        };
        settings.save_to(&path).unwrap();
        assert_eq!(Settings::load_from(&path).unwrap(), settings);
    }

    #[test]
    fn test_route_only_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "route": "10.0.0.5" }"#).unwrap();
        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.route.as_deref(), Some("10.0.0.5"));
        assert_eq!(settings.connection, ConnectionConfig::default());
    }

    #[test]
    fn test_bad_json_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(Settings::load_from(&path).is_err());
    }
}

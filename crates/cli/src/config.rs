//! Configuration management for the CLI

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Agent API used when neither flag, env nor config file set one
pub const DEFAULT_API_URL: &str = "http://localhost:8080";

/// Baud used by `monitor` when nothing else is given
pub const DEFAULT_BAUD: u32 = 115200;

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Agent API endpoint URL
    pub api_url: Option<String>,
    /// Default serial port for `monitor`
    pub port: Option<String>,
    /// Default baud rate for `monitor`
    pub baud: Option<u32>,
}

impl Config {
    /// Load configuration from the default location; a missing file is empty
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).context("Failed to read config file")?;

        serde_json::from_str(&content).context("Failed to parse config file")
    }

    /// Save configuration to a file, creating parent directories
    #[allow(dead_code)]
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Flag value first, then this file, then the built-in default
    pub fn api_url(&self, flag: Option<String>) -> String {
        flag.or_else(|| self.api_url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    pub fn port(&self, flag: Option<String>) -> Option<String> {
        flag.or_else(|| self.port.clone())
    }

    pub fn baud(&self, flag: Option<u32>) -> u32 {
        flag.or(self.baud).unwrap_or(DEFAULT_BAUD)
    }

    /// `~/.config/sensorctl/config.json`
    fn config_path() -> Option<PathBuf> {
        dirs_next::home_dir().map(|home| home.join(".config").join("sensorctl").join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.api_url(None), DEFAULT_API_URL);
        assert_eq!(config.baud(None), DEFAULT_BAUD);
    }

    #[test]
    fn test_file_values_and_flag_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sensorctl").join("config.json");
        let saved = Config {
            api_url: Some("http://gateway:9000".to_string()),
            port: Some("/dev/ttyUSB1".to_string()),
            baud: Some(9600),
        };
        saved.save_to(&path).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config, saved);
        assert_eq!(config.api_url(None), "http://gateway:9000");
        assert_eq!(
            config.api_url(Some("http://other:8080".to_string())),
            "http://other:8080"
        );
        assert_eq!(config.port(None).as_deref(), Some("/dev/ttyUSB1"));
        assert_eq!(config.baud(Some(57600)), 57600);
    }

    #[test]
    fn test_invalid_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}

//! Configuration file loading and parsing.
//!
//! The broker runs fine with no configuration at all; a config file
//! tunes timeouts, logging and the reload-trigger patterns.
//!
//! # Configuration File Locations
//!
//! 1. Path specified via `--config` CLI flag
//! 2. Default location:
//!    - **Linux/macOS:** `~/.editor-bridge-mcp/config.json`
//!    - **Windows:** `%USERPROFILE%\.editor-bridge-mcp\config.json`
//!
//! A missing file at the default location yields the built-in
//! defaults; a missing file at an explicit `--config` path is an
//! error, as is a file that does not parse or validate.

mod settings;

pub use settings::{Config, ConnectionSettings, LoggingConfig};

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Returns the default configuration directory.
#[must_use]
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|p| p.join(".editor-bridge-mcp"))
}

/// Returns the platform-specific default configuration file path.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join("config.json"))
}

/// Loads and parses the configuration file.
///
/// If `path` is `None`, uses the platform-specific default location
/// and falls back to defaults when no file exists there.
///
/// # Errors
///
/// Returns an error if an explicitly given file cannot be found, any
/// present file cannot be read, the JSON is malformed, or validation
/// fails.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let (config_path, explicit) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => match default_config_path() {
            Some(p) => (p, false),
            None => return Ok(Config::default()),
        },
    };

    if !config_path.exists() {
        if explicit {
            return Err(ConfigError::ValidationError {
                message: format!("configuration file not found: {}", config_path.display()),
            });
        }
        return Ok(Config::default());
    }

    let contents = std::fs::read_to_string(&config_path).map_err(|e| ConfigError::ReadError {
        path: config_path.clone(),
        source: e,
    })?;

    let config: Config = serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: config_path.clone(),
        source: e,
    })?;

    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    #[test]
    fn default_config_path_exists() {
        let path = default_config_path();
        assert!(path.is_some());
        assert!(path.unwrap().to_string_lossy().contains("config.json"));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("config.json");
        assert!(load_config(Some(&missing)).is_err());
    }

    #[test]
    fn valid_file_round_trips() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "logging": {"level": "debug"},
                "connection": {"requestTimeoutSecs": 10},
                "reloadTriggers": ["Assets/Refresh*"]
            }"#,
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.connection.request_timeout_secs, 10);
        assert_eq!(config.reload_triggers, vec!["Assets/Refresh*"]);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "{").unwrap();
        assert!(matches!(
            load_config(Some(&path)),
            Err(ConfigError::ParseError { .. })
        ));
    }
}

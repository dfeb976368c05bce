//! Configuration structures for deserialisation.

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Config {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Agent connection settings.
    #[serde(default)]
    pub connection: ConnectionSettings,

    /// Glob patterns naming reload-triggering tools or menu paths.
    #[serde(default = "default_reload_triggers")]
    pub reload_triggers: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            connection: ConnectionSettings::default(),
            reload_triggers: default_reload_triggers(),
        }
    }
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any timeout is zero or a trigger pattern
    /// does not compile.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.connection.validate()?;
        for pattern in &self.reload_triggers {
            glob::Pattern::new(pattern).map_err(|e| ConfigError::ValidationError {
                message: format!("invalid reload trigger pattern '{pattern}': {e}"),
            })?;
        }
        Ok(())
    }

    /// Compiles the trigger patterns. Call after [`Config::validate`].
    #[must_use]
    pub fn compiled_reload_triggers(&self) -> Vec<glob::Pattern> {
        self.reload_triggers
            .iter()
            .filter_map(|pattern| glob::Pattern::new(pattern).ok())
            .collect()
    }
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level when no CLI verbosity flag is given:
    /// `trace` / `debug` / `info` / `warn` / `error`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Agent connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConnectionSettings {
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Health-ping timeout in seconds.
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout_secs: u64,

    /// Total wait-for-reload budget in seconds.
    #[serde(default = "default_reload_timeout")]
    pub reload_timeout_secs: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            ping_timeout_secs: default_ping_timeout(),
            reload_timeout_secs: default_reload_timeout(),
        }
    }
}

impl ConnectionSettings {
    /// The per-request timeout as a [`Duration`].
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// The ping timeout as a [`Duration`].
    #[must_use]
    pub const fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_secs)
    }

    /// The reload budget as a [`Duration`].
    #[must_use]
    pub const fn reload_timeout(&self) -> Duration {
        Duration::from_secs(self.reload_timeout_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("requestTimeoutSecs", self.request_timeout_secs),
            ("pingTimeoutSecs", self.ping_timeout_secs),
            ("reloadTimeoutSecs", self.reload_timeout_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::ValidationError {
                    message: format!("{name} must be greater than zero"),
                });
            }
        }
        Ok(())
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

const fn default_request_timeout() -> u64 {
    30
}

const fn default_ping_timeout() -> u64 {
    5
}

const fn default_reload_timeout() -> u64 {
    60
}

fn default_reload_triggers() -> Vec<String> {
    vec![
        "Assets/Refresh*".to_string(),
        "Assets/Reimport*".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_protocol_budgets() {
        let config = Config::default();
        assert_eq!(config.connection.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.connection.ping_timeout(), Duration::from_secs(5));
        assert_eq!(config.connection.reload_timeout(), Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_timeout_fails_validation() {
        let mut config = Config::default();
        config.connection.request_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_trigger_pattern_fails_validation() {
        let mut config = Config::default();
        config.reload_triggers = vec!["[".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn triggers_compile() {
        let config = Config::default();
        let compiled = config.compiled_reload_triggers();
        assert_eq!(compiled.len(), config.reload_triggers.len());
        assert!(compiled[0].matches("Assets/Refresh"));
    }
}

//! Shared error types for editor-bridge-mcp.
//!
//! Module-specific failures (tool errors, schema violations, broker
//! connection errors) live next to the code that raises them; this
//! module holds the error types shared across component boundaries.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

/// Errors that can occur while handling the discovery record.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// No directory containing `Library/` was found walking upward.
    #[error("no project root found above {start}")]
    ProjectRootNotFound {
        /// The directory the upward walk started from.
        start: PathBuf,
    },

    /// The discovery file does not exist.
    #[error("discovery file not found: {path}")]
    RecordMissing {
        /// Expected path of the discovery file.
        path: PathBuf,
    },

    /// The discovery file could not be read or written.
    #[error("failed to access discovery file: {path}")]
    Io {
        /// Path of the discovery file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The discovery file exists but does not parse or validate.
    #[error("invalid discovery file {path}: {message}")]
    Invalid {
        /// Path of the discovery file.
        path: PathBuf,
        /// What is wrong with it.
        message: String,
    },

    /// The recorded host process is no longer running.
    #[error("host process {pid} is not running (stale discovery file)")]
    StaleRecord {
        /// The dead pid from the record.
        pid: u32,
    },
}

/// Lifecycle failures surfaced by the broker's `ensure_connection`.
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// No host is running and no reload is in progress.
    #[error("host is not running: {reason}")]
    HostNotRunning {
        /// Why the host is considered down.
        reason: String,
    },

    /// The reload wait budget was exhausted.
    #[error("timed out after {seconds}s waiting for the host to come back: {last_error}")]
    ReloadTimeout {
        /// The budget that was exhausted.
        seconds: u64,
        /// The last error observed while polling.
        last_error: String,
    },

    /// No project root could be located.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

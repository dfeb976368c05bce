//! The on-disk discovery record.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::DiscoveryError;

/// The JSON handoff the agent writes under `Library/`.
///
/// Invariant: if the file exists, the agent intends to be reachable at
/// `port`. Staleness after abnormal termination is detected via the
/// pid probe, not the file's presence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryRecord {
    /// The dynamic loopback port the agent is listening on.
    pub port: u16,

    /// The host process id.
    pub pid: u32,

    /// Absolute path of the project the host has open.
    pub project_path: String,
}

impl DiscoveryRecord {
    /// Creates a record for the current process.
    #[must_use]
    pub fn for_current_process(port: u16, project_path: impl Into<String>) -> Self {
        Self {
            port,
            pid: std::process::id(),
            project_path: project_path.into(),
        }
    }

    /// Writes the record (pretty-printed) to its well-known path,
    /// creating `Library/` if needed and overwriting any previous
    /// record.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn write(&self, project_root: &Path) -> Result<PathBuf, DiscoveryError> {
        let dir = project_root.join(super::LIBRARY_DIR);
        std::fs::create_dir_all(&dir).map_err(|e| DiscoveryError::Io {
            path: dir.clone(),
            source: e,
        })?;
        let path = dir.join(super::RECORD_FILE);

        let json = serde_json::to_string_pretty(self).map_err(|e| DiscoveryError::Invalid {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(&path, json).map_err(|e| DiscoveryError::Io {
            path: path.clone(),
            source: e,
        })?;

        debug!(path = %path.display(), port = self.port, pid = self.pid, "Wrote discovery record");
        Ok(path)
    }

    /// Reads and validates the record for a project root.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is absent, unreadable, not JSON,
    /// or carries a zero port or pid.
    pub fn read(project_root: &Path) -> Result<Self, DiscoveryError> {
        let path = super::record_path(project_root);
        if !path.exists() {
            return Err(DiscoveryError::RecordMissing { path });
        }

        let contents = std::fs::read_to_string(&path).map_err(|e| DiscoveryError::Io {
            path: path.clone(),
            source: e,
        })?;
        let record: Self =
            serde_json::from_str(&contents).map_err(|e| DiscoveryError::Invalid {
                path: path.clone(),
                message: e.to_string(),
            })?;

        if record.port == 0 {
            return Err(DiscoveryError::Invalid {
                path,
                message: "port must be a positive number".to_string(),
            });
        }
        if record.pid == 0 {
            return Err(DiscoveryError::Invalid {
                path,
                message: "pid must be a positive number".to_string(),
            });
        }
        Ok(record)
    }

    /// Deletes the record if present. Absence is not an error; other
    /// IO failures are logged and swallowed (shutdown path).
    pub fn delete(project_root: &Path) {
        let path = super::record_path(project_root);
        match std::fs::remove_file(&path) {
            Ok(()) => debug!(path = %path.display(), "Deleted discovery record"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to delete discovery record"),
        }
    }
}

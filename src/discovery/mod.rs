//! Discovery handoff between the agent and the broker.
//!
//! On a successful listen, the agent persists a small JSON record at
//! `<project>/Library/MCPInstance.json` naming the loopback port it is
//! listening on, the host process id, and the project path. The broker
//! finds the project root by walking upward from a starting directory,
//! reads the record, and liveness-checks the pid before trusting it.
//!
//! Ownership: the agent is the single writer — the record is created on
//! startup, overwritten after each reload, and deleted on clean
//! shutdown. A record left behind by abnormal termination is detected
//! through the pid probe and ignored.

mod record;

pub use record::DiscoveryRecord;

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::DiscoveryError;

/// Directory under the project root that marks it as a project.
pub const LIBRARY_DIR: &str = "Library";

/// File name of the discovery record inside [`LIBRARY_DIR`].
pub const RECORD_FILE: &str = "MCPInstance.json";

/// Returns the discovery file path for a project root.
#[must_use]
pub fn record_path(project_root: &Path) -> PathBuf {
    project_root.join(LIBRARY_DIR).join(RECORD_FILE)
}

/// Walks upward from `start` until a directory containing a `Library`
/// subdirectory is found.
///
/// # Errors
///
/// Returns [`DiscoveryError::ProjectRootNotFound`] if the filesystem
/// root is reached first.
pub fn find_project_root(start: &Path) -> Result<PathBuf, DiscoveryError> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(LIBRARY_DIR).is_dir() {
            debug!(root = %current.display(), "Located project root");
            return Ok(current);
        }
        if !current.pop() {
            return Err(DiscoveryError::ProjectRootNotFound {
                start: start.to_path_buf(),
            });
        }
    }
}

/// Reads the discovery record for a project root and verifies the host
/// pid is alive.
///
/// # Errors
///
/// Returns an error if the file is missing, malformed, or names a dead
/// process.
pub fn load_live_record(project_root: &Path) -> Result<DiscoveryRecord, DiscoveryError> {
    let record = DiscoveryRecord::read(project_root)?;
    if !process_alive(record.pid) {
        return Err(DiscoveryError::StaleRecord { pid: record.pid });
    }
    Ok(record)
}

/// Checks whether a process with the given pid is running.
///
/// Unix uses a signal-0 probe; Windows opens a query-limited process
/// handle. Other platforms answer `true` and rely on the connect
/// attempt to weed out dead hosts.
#[must_use]
pub fn process_alive(pid: u32) -> bool {
    imp::process_alive(pid)
}

#[cfg(unix)]
#[allow(unsafe_code)]
mod imp {
    pub fn process_alive(pid: u32) -> bool {
        let Ok(pid) = i32::try_from(pid) else {
            return false;
        };
        // kill(pid, 0) delivers no signal but performs the permission
        // and existence checks. EPERM still means the process exists.
        let rc = unsafe { libc::kill(pid, 0) };
        if rc == 0 {
            return true;
        }
        std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }
}

#[cfg(windows)]
#[allow(unsafe_code)]
mod imp {
    use windows_sys::Win32::Foundation::CloseHandle;
    use windows_sys::Win32::System::Threading::{
        OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION,
    };

    pub fn process_alive(pid: u32) -> bool {
        let handle = unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid) };
        if handle.is_null() {
            return false;
        }
        unsafe { CloseHandle(handle) };
        true
    }
}

#[cfg(not(any(unix, windows)))]
mod imp {
    pub fn process_alive(_pid: u32) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    #[test]
    fn project_root_found_from_nested_dir() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("proj");
        std::fs::create_dir_all(root.join(LIBRARY_DIR)).unwrap();
        let nested = root.join("Assets").join("Scripts");
        std::fs::create_dir_all(&nested).unwrap();

        let found = find_project_root(&nested).unwrap();
        assert_eq!(found, root);
    }

    #[test]
    fn project_root_not_found_reports_start() {
        let tmp = TempDir::new().unwrap();
        let err = find_project_root(tmp.path()).unwrap_err();
        assert!(matches!(err, DiscoveryError::ProjectRootNotFound { .. }));
    }

    #[test]
    fn current_process_is_alive() {
        assert!(process_alive(std::process::id()));
    }

    #[cfg(unix)]
    #[test]
    fn nonsense_pid_is_dead() {
        // Largest valid pid on Linux is far below this.
        assert!(!process_alive(0x7fff_fff0));
    }

    #[test]
    fn load_live_record_rejects_missing_file() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join(LIBRARY_DIR)).unwrap();
        let err = load_live_record(tmp.path()).unwrap_err();
        assert!(matches!(err, DiscoveryError::RecordMissing { .. }));
    }
}

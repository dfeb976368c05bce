//! The embedding host runtime, as seen by the agent.
//!
//! The agent is loaded into an interactive editor process. Everything
//! it needs from that process is captured in one explicit lifecycle
//! record, [`HostState`]: identity (version, project), a bounded log
//! buffer the host feeds, and a hook for executing menu items. The
//! record is created at agent init and passed explicitly to the
//! listener and registry — there are no ambient singletons.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// How many log entries the host buffer retains.
const LOG_CAPACITY: usize = 1000;

/// Severity of a host log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSeverity {
    /// Informational message.
    Info,
    /// Warning.
    Warning,
    /// Error or exception.
    Error,
}

impl LogSeverity {
    /// Parses the wire name of a severity.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "info" => Some(Self::Info),
            "warning" => Some(Self::Warning),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// One captured host log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Entry severity.
    pub severity: LogSeverity,

    /// The log message text.
    pub message: String,
}

/// Host identity reported by `ping` and `project_info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    /// Host application version string.
    pub host_version: String,

    /// Name of the open project.
    pub project_name: String,

    /// Absolute path of the open project.
    pub project_path: PathBuf,
}

/// Hook the host installs for executing menu items.
pub type MenuHook = Box<dyn Fn(&str) -> Result<(), String> + Send + Sync>;

/// The process-wide lifecycle record for one agent incarnation.
///
/// Torn down and recreated on each host reload; the same host process
/// keeps its pid across reloads.
pub struct HostState {
    info: HostInfo,
    logs: Mutex<VecDeque<LogEntry>>,
    menu_hook: Option<MenuHook>,
    executed_menu_items: Mutex<Vec<String>>,
}

impl HostState {
    /// Creates a host state with no menu hook; menu executions are
    /// recorded but otherwise no-ops.
    #[must_use]
    pub fn new(info: HostInfo) -> Self {
        Self {
            info,
            logs: Mutex::new(VecDeque::new()),
            menu_hook: None,
            executed_menu_items: Mutex::new(Vec::new()),
        }
    }

    /// Creates a host state with a menu-execution hook.
    #[must_use]
    pub fn with_menu_hook(info: HostInfo, hook: MenuHook) -> Self {
        Self {
            menu_hook: Some(hook),
            ..Self::new(info)
        }
    }

    /// Host identity.
    #[must_use]
    pub const fn info(&self) -> &HostInfo {
        &self.info
    }

    /// Appends a log entry, evicting the oldest past capacity.
    pub fn push_log(&self, severity: LogSeverity, message: impl Into<String>) {
        let mut logs = self.logs.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if logs.len() == LOG_CAPACITY {
            logs.pop_front();
        }
        logs.push_back(LogEntry {
            severity,
            message: message.into(),
        });
    }

    /// Returns up to `count` most recent entries at or above
    /// `min_severity`, oldest first.
    #[must_use]
    pub fn recent_logs(&self, count: usize, min_severity: LogSeverity) -> Vec<LogEntry> {
        let logs = self.logs.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut selected: Vec<LogEntry> = logs
            .iter()
            .rev()
            .filter(|entry| entry.severity >= min_severity)
            .take(count)
            .cloned()
            .collect();
        selected.reverse();
        selected
    }

    /// Executes a menu item by path, recording the execution.
    ///
    /// # Errors
    ///
    /// Propagates the hook's error message, if a hook is installed and
    /// rejects the path.
    pub fn execute_menu_item(&self, path: &str) -> Result<(), String> {
        if let Some(hook) = &self.menu_hook {
            hook(path)?;
        }
        self.executed_menu_items
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(path.to_string());
        Ok(())
    }

    /// Menu paths executed so far, in order.
    #[must_use]
    pub fn executed_menu_items(&self) -> Vec<String> {
        self.executed_menu_items
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl std::fmt::Debug for HostState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostState")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> HostState {
        HostState::new(HostInfo {
            host_version: "2022.3.10f1".to_string(),
            project_name: "Sandbox".to_string(),
            project_path: PathBuf::from("/work/sandbox"),
        })
    }

    #[test]
    fn log_buffer_is_bounded() {
        let host = state();
        for i in 0..(LOG_CAPACITY + 10) {
            host.push_log(LogSeverity::Info, format!("entry {i}"));
        }
        let logs = host.recent_logs(usize::MAX, LogSeverity::Info);
        assert_eq!(logs.len(), LOG_CAPACITY);
        assert_eq!(logs[0].message, "entry 10");
    }

    #[test]
    fn recent_logs_filters_by_severity_and_count() {
        let host = state();
        host.push_log(LogSeverity::Info, "a");
        host.push_log(LogSeverity::Error, "b");
        host.push_log(LogSeverity::Warning, "c");
        host.push_log(LogSeverity::Error, "d");

        let errors = host.recent_logs(10, LogSeverity::Error);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].message, "b");

        let last_two = host.recent_logs(2, LogSeverity::Info);
        assert_eq!(last_two[0].message, "c");
        assert_eq!(last_two[1].message, "d");
    }

    #[test]
    fn menu_execution_is_recorded() {
        let host = state();
        host.execute_menu_item("Assets/Refresh").unwrap();
        assert_eq!(host.executed_menu_items(), vec!["Assets/Refresh"]);
    }

    #[test]
    fn menu_hook_errors_propagate() {
        let host = HostState::with_menu_hook(
            state().info.clone(),
            Box::new(|path| Err(format!("no such menu item: {path}"))),
        );
        let err = host.execute_menu_item("Bad/Path").unwrap_err();
        assert!(err.contains("Bad/Path"));
        assert!(host.executed_menu_items().is_empty());
    }

    #[test]
    fn severity_ordering() {
        assert!(LogSeverity::Error > LogSeverity::Warning);
        assert!(LogSeverity::Warning > LogSeverity::Info);
        assert_eq!(LogSeverity::parse("warning"), Some(LogSeverity::Warning));
        assert_eq!(LogSeverity::parse("fatal"), None);
    }
}

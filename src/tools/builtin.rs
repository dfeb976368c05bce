//! The builtin leaf tools shipped with the agent.
//!
//! Each tool holds a shared reference to the [`HostState`] it was
//! instantiated against. A tool whose constructor fails is skipped
//! with a warning, not fatal to discovery.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::host::{HostState, LogSeverity};
use crate::schema::ParameterSpec;
use crate::tools::{Tool, ToolError};

/// Instantiates one of each builtin tool against the host state.
#[must_use]
pub fn instantiate(host: &Arc<HostState>) -> Vec<Box<dyn Tool>> {
    vec![
        Box::new(ProjectInfoTool {
            host: Arc::clone(host),
        }),
        Box::new(CaptureLogsTool {
            host: Arc::clone(host),
        }),
        Box::new(ExecuteMenuItemTool {
            host: Arc::clone(host),
        }),
    ]
}

/// Reports host identity: version, project name, project path.
pub struct ProjectInfoTool {
    host: Arc<HostState>,
}

impl Tool for ProjectInfoTool {
    fn name(&self) -> &'static str {
        "project_info"
    }

    fn description(&self) -> &str {
        "Return the host version and the name and path of the open project"
    }

    fn schema(&self) -> ParameterSpec {
        ParameterSpec::object()
    }

    fn invoke(&self, _arguments: &Value) -> Result<Value, ToolError> {
        let info = self.host.info();
        Ok(json!({
            "hostVersion": info.host_version,
            "projectName": info.project_name,
            "projectPath": info.project_path.display().to_string(),
        }))
    }
}

/// Returns recent host log entries.
pub struct CaptureLogsTool {
    host: Arc<HostState>,
}

impl Tool for CaptureLogsTool {
    fn name(&self) -> &'static str {
        "capture_logs"
    }

    fn description(&self) -> &str {
        "Return up to 'count' recent host log entries at or above 'severity'"
    }

    fn schema(&self) -> ParameterSpec {
        ParameterSpec::object()
            .property(
                "count",
                ParameterSpec::integer()
                    .describe("Maximum number of entries to return")
                    .minimum(1.0)
                    .maximum(500.0)
                    .default_value(json!(50)),
                false,
            )
            .property(
                "severity",
                ParameterSpec::string()
                    .describe("Minimum severity to include")
                    .one_of([json!("info"), json!("warning"), json!("error")])
                    .default_value(json!("info")),
                false,
            )
    }

    fn invoke(&self, arguments: &Value) -> Result<Value, ToolError> {
        let count = arguments
            .get("count")
            .and_then(Value::as_u64)
            .unwrap_or(50);
        let severity = arguments
            .get("severity")
            .and_then(Value::as_str)
            .unwrap_or("info");
        let severity =
            LogSeverity::parse(severity).ok_or_else(|| ToolError::InvalidArguments {
                message: format!("unknown severity '{severity}'"),
            })?;

        let entries = self
            .host
            .recent_logs(usize::try_from(count).unwrap_or(usize::MAX), severity);
        Ok(json!({
            "count": entries.len(),
            "entries": entries,
        }))
    }
}

/// Executes a host menu item by path. Main-thread only: menu execution
/// touches host UI state.
pub struct ExecuteMenuItemTool {
    host: Arc<HostState>,
}

impl Tool for ExecuteMenuItemTool {
    fn name(&self) -> &'static str {
        "execute_menu_item"
    }

    fn description(&self) -> &str {
        "Execute a host menu item by its menu path, e.g. 'Assets/Refresh'"
    }

    fn requires_main_thread(&self) -> bool {
        true
    }

    fn schema(&self) -> ParameterSpec {
        ParameterSpec::object().property(
            "path",
            ParameterSpec::string().describe("Menu path of the item to execute"),
            true,
        )
    }

    fn invoke(&self, arguments: &Value) -> Result<Value, ToolError> {
        let path = arguments
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments {
                message: "missing required field 'path'".to_string(),
            })?;

        self.host
            .execute_menu_item(path)
            .map_err(|message| ToolError::Failed { message })?;

        Ok(json!({"executed": path}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::PathBuf;

    use crate::host::HostInfo;

    fn host() -> Arc<HostState> {
        Arc::new(HostState::new(HostInfo {
            host_version: "2022.3.10f1".to_string(),
            project_name: "Sandbox".to_string(),
            project_path: PathBuf::from("/work/sandbox"),
        }))
    }

    #[test]
    fn builtins_have_unique_names_and_valid_schemas() {
        let tools = instantiate(&host());
        let mut names: Vec<&str> = tools.iter().map(|t| t.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), tools.len());

        for tool in &tools {
            assert!(!tool.name().is_empty());
            // The rendered schema must survive the descriptor round trip.
            let rendered = tool.schema().to_json_string();
            assert!(crate::schema::ParameterSpec::from_json_str(&rendered).is_ok());
        }
    }

    #[test]
    fn only_menu_execution_needs_the_main_thread() {
        for tool in instantiate(&host()) {
            assert_eq!(
                tool.requires_main_thread(),
                tool.name() == "execute_menu_item",
                "unexpected lane for {}",
                tool.name()
            );
        }
    }

    #[test]
    fn project_info_reports_identity() {
        let host = host();
        let tool = ProjectInfoTool {
            host: Arc::clone(&host),
        };
        let result = tool.invoke(&json!({})).unwrap();
        assert_eq!(result["projectName"], "Sandbox");
        assert_eq!(result["hostVersion"], "2022.3.10f1");
    }

    #[test]
    fn capture_logs_applies_defaults_and_filter() {
        let host = host();
        host.push_log(LogSeverity::Info, "hello");
        host.push_log(LogSeverity::Error, "boom");

        let tool = CaptureLogsTool {
            host: Arc::clone(&host),
        };
        let result = tool.invoke(&json!({"severity": "error"})).unwrap();
        assert_eq!(result["count"], 1);
        assert_eq!(result["entries"][0]["message"], "boom");

        let all = tool.invoke(&json!({})).unwrap();
        assert_eq!(all["count"], 2);
    }

    #[test]
    fn execute_menu_item_runs_hook() {
        let host = host();
        let tool = ExecuteMenuItemTool {
            host: Arc::clone(&host),
        };
        let result = tool.invoke(&json!({"path": "Assets/Refresh"})).unwrap();
        assert_eq!(result["executed"], "Assets/Refresh");
        assert_eq!(host.executed_menu_items(), vec!["Assets/Refresh"]);
    }
}

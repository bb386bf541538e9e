//! Terminal tool — run commands in the workspace.
//!
//! Supports command allowlisting; execution blocks until the subprocess
//! exits (timeouts come from the caller's cancellation, not the tool).

use async_trait::async_trait;
use oxpilot_core::error::ToolError;
use oxpilot_core::tool::Tool;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, warn};

pub struct TerminalTool {
    workspace: PathBuf,
    /// If non-empty, only these base commands are allowed.
    allowed_commands: Vec<String>,
}

impl TerminalTool {
    pub fn new(workspace: impl Into<PathBuf>, allowed_commands: Vec<String>) -> Self {
        Self {
            workspace: workspace.into(),
            allowed_commands,
        }
    }

    fn is_command_allowed(&self, command: &str) -> bool {
        if self.allowed_commands.is_empty() {
            return true;
        }
        let base = command.split_whitespace().next().unwrap_or("").trim();
        self.allowed_commands.iter().any(|a| a == base)
    }
}

#[async_trait]
impl Tool for TerminalTool {
    fn name(&self) -> &str {
        "terminal"
    }

    fn description(&self) -> &str {
        "Execute a terminal command in the workspace. Args: {\"command\": \"command to run\"}"
    }

    async fn execute(&self, args: serde_json::Value) -> Result<String, ToolError> {
        let command = args["command"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("command argument required".into()))?;

        if command.trim().is_empty() {
            return Err(ToolError::InvalidArguments("empty command".into()));
        }

        if !self.is_command_allowed(command) {
            return Err(ToolError::PermissionDenied {
                tool_name: "terminal".into(),
                reason: format!(
                    "Command '{}' not in allowlist",
                    command.split_whitespace().next().unwrap_or("")
                ),
            });
        }

        debug!(command = %command, "Executing terminal command");

        let output = if cfg!(target_os = "windows") {
            Command::new("cmd")
                .args(["/C", command])
                .current_dir(&self.workspace)
                .output()
                .await
        } else {
            Command::new("sh")
                .args(["-c", command])
                .current_dir(&self.workspace)
                .output()
                .await
        };

        let output = output.map_err(|e| ToolError::ExecutionFailed {
            tool_name: "terminal".into(),
            reason: e.to_string(),
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if output.status.success() {
            if stderr.is_empty() {
                Ok(stdout.trim_end().to_string())
            } else {
                Ok(format!("{stdout}\n[stderr]: {stderr}").trim_end().to_string())
            }
        } else {
            let code = output.status.code().unwrap_or(-1);
            warn!(command = %command, exit_code = code, "Command failed");
            Err(ToolError::ExecutionFailed {
                tool_name: "terminal".into(),
                reason: format!("command failed with exit code {code}\nOutput: {stdout}{stderr}"),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(allowed: Vec<&str>) -> (tempfile::TempDir, TerminalTool) {
        let dir = tempfile::tempdir().unwrap();
        let tool = TerminalTool::new(dir.path(), allowed.into_iter().map(String::from).collect());
        (dir, tool)
    }

    #[test]
    fn allowlist_check() {
        let (_dir, tool) = tool(vec!["ls", "cat", "git"]);
        assert!(tool.is_command_allowed("ls -la"));
        assert!(tool.is_command_allowed("git status"));
        assert!(!tool.is_command_allowed("rm -rf /"));
    }

    #[test]
    fn empty_allowlist_allows_all() {
        let (_dir, tool) = tool(vec![]);
        assert!(tool.is_command_allowed("anything goes"));
    }

    #[tokio::test]
    async fn runs_in_workspace_directory() {
        let (dir, tool) = tool(vec![]);
        let output = tool
            .execute(serde_json::json!({"command": "pwd"}))
            .await
            .unwrap();
        assert!(output.contains(dir.path().file_name().unwrap().to_str().unwrap()));
    }

    #[tokio::test]
    async fn captures_stdout() {
        let (_dir, tool) = tool(vec![]);
        let output = tool
            .execute(serde_json::json!({"command": "echo hello"}))
            .await
            .unwrap();
        assert_eq!(output, "hello");
    }

    #[tokio::test]
    async fn failing_command_is_an_error() {
        let (_dir, tool) = tool(vec![]);
        let err = tool
            .execute(serde_json::json!({"command": "false"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }

    #[tokio::test]
    async fn blocked_command_is_denied() {
        let (_dir, tool) = tool(vec!["ls"]);
        let err = tool
            .execute(serde_json::json!({"command": "curl http://example.com"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied { .. }));
    }

    #[tokio::test]
    async fn empty_command_rejected() {
        let (_dir, tool) = tool(vec![]);
        let err = tool
            .execute(serde_json::json!({"command": "  "}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}

//! Git tool — version-control operations in the workspace.
//!
//! Invokes the external `git` binary. The diff output leads with a porcelain
//! status summary so the operator sees file states before the hunks.

use async_trait::async_trait;
use oxpilot_core::error::ToolError;
use oxpilot_core::tool::Tool;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

pub struct GitTool {
    workspace: PathBuf,
}

impl GitTool {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
        }
    }

    async fn git(&self, args: &[&str]) -> Result<String, ToolError> {
        debug!(?args, "Running git");
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.workspace)
            .output()
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "git".into(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ToolError::ExecutionFailed {
                tool_name: "git".into(),
                reason: format!("git {} failed: {stderr}", args.first().unwrap_or(&"")),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn diff(&self) -> Result<String, ToolError> {
        let status = self.git(&["status", "--porcelain"]).await?;
        if status.trim().is_empty() {
            return Ok("No changes detected".into());
        }

        let mut result = String::from("\nChanged files:\n");
        for line in status.lines() {
            if line.len() < 3 {
                continue;
            }
            let state = &line[..2];
            let file = line[3..].trim();
            let label = match state {
                "M " => "Modified:  ",
                " M" => "Modified (unstaged):",
                "A " => "Added:     ",
                "D " => "Deleted:   ",
                "R " => "Renamed:   ",
                "C " => "Copied:    ",
                "??" => "Untracked: ",
                _ => continue,
            };
            result.push_str(&format!("  {label} {file}\n"));
        }
        result.push('\n');

        let unstaged = self.git(&["diff"]).await?;
        let staged = self.git(&["diff", "--cached"]).await?;

        if !staged.is_empty() {
            result.push_str("\nStaged changes:\n");
            result.push_str(&staged);
        }
        if !unstaged.is_empty() {
            result.push_str("\nUnstaged changes:\n");
            result.push_str(&unstaged);
        }

        // Untracked files have no diff; show their content
        for line in status.lines() {
            if let Some(file) = line.strip_prefix("??") {
                let file = file.trim();
                if let Ok(content) = std::fs::read_to_string(self.workspace.join(file)) {
                    result.push_str(&format!("\nNew file: {file}\n{content}\n"));
                }
            }
        }

        Ok(result)
    }

    async fn commit(&self, message: &str) -> Result<String, ToolError> {
        let message = if message.is_empty() {
            "Auto commit by oxpilot"
        } else {
            message
        };
        self.git(&["add", "."]).await?;
        self.git(&["commit", "-m", message]).await
    }

    async fn reset(&self) -> Result<String, ToolError> {
        self.git(&["reset", "--hard", "HEAD"]).await
    }

    async fn add(&self, path: &str) -> Result<String, ToolError> {
        self.git(&["add", path]).await?;
        Ok(format!("Staged {path}"))
    }

    async fn status(&self) -> Result<String, ToolError> {
        self.git(&["status", "--porcelain"]).await
    }
}

#[async_trait]
impl Tool for GitTool {
    fn name(&self) -> &str {
        "git"
    }

    fn description(&self) -> &str {
        "Execute git operations in the workspace. Args: {\"operation\": \"diff|commit|add|reset|status\", \"message\": \"...\", \"path\": \"...\"}"
    }

    async fn execute(&self, args: serde_json::Value) -> Result<String, ToolError> {
        let operation = args["operation"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("operation argument required".into()))?;

        match operation {
            "diff" => self.diff().await,
            "commit" => {
                let message = args["message"].as_str().unwrap_or("");
                self.commit(message).await
            }
            "reset" => self.reset().await,
            "add" => {
                let path = args["path"].as_str().unwrap_or(".");
                self.add(path).await
            }
            "status" => self.status().await,
            other => Err(ToolError::InvalidArguments(format!(
                "unknown git operation: {other}"
            ))),
        }
    }
}

/// Is the workspace inside a git repository?
pub async fn is_git_repository(workspace: &Path) -> bool {
    Command::new("git")
        .args(["rev-parse", "--is-inside-work-tree"])
        .current_dir(workspace)
        .output()
        .await
        .map(|o| o.status.success())
        .unwrap_or(false)
}

//! Linter tool — per-language check and fix.
//!
//! Dispatches to the appropriate external linter by file extension. Linter
//! findings come back as output text, not errors; only a missing linter or a
//! broken invocation is an error.

use async_trait::async_trait;
use oxpilot_core::error::ToolError;
use oxpilot_core::tool::Tool;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::debug;

pub struct LinterTool {
    workspace: PathBuf,
}

/// The linter invocations for one language.
struct LinterCommands {
    check: &'static [&'static str],
    fix: &'static [&'static str],
}

fn commands_for(path: &str) -> Option<LinterCommands> {
    if path.ends_with(".rs") {
        Some(LinterCommands {
            check: &["cargo", "clippy", "--quiet", "--message-format=short"],
            fix: &["cargo", "fmt"],
        })
    } else if path.ends_with(".go") {
        Some(LinterCommands {
            check: &["go", "vet", "./..."],
            fix: &["gofmt", "-w", "."],
        })
    } else {
        None
    }
}

impl LinterTool {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
        }
    }

    async fn run(&self, argv: &[&str]) -> Result<String, ToolError> {
        debug!(?argv, "Running linter");
        let output = Command::new(argv[0])
            .args(&argv[1..])
            .current_dir(&self.workspace)
            .output()
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "linter".into(),
                reason: format!("{} failed to start: {e}", argv[0]),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let combined = format!("{stdout}{stderr}").trim().to_string();

        // Findings are reported through the exit code; pass them along as text
        if combined.is_empty() {
            Ok("No issues found".into())
        } else {
            Ok(combined)
        }
    }
}

#[async_trait]
impl Tool for LinterTool {
    fn name(&self) -> &str {
        "linter"
    }

    fn description(&self) -> &str {
        "Check and fix code issues using linters. Args: {\"operation\": \"check|fix\", \"path\": \"file\"}"
    }

    async fn execute(&self, args: serde_json::Value) -> Result<String, ToolError> {
        let operation = args["operation"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("operation argument required".into()))?;

        let path = args["path"].as_str().unwrap_or(".");

        let Some(commands) = commands_for(path) else {
            return Err(ToolError::ExecutionFailed {
                tool_name: "linter".into(),
                reason: format!("no linter available for this file type: {path}"),
            });
        };

        match operation {
            "check" => self.run(commands.check).await,
            "fix" => self.run(commands.fix).await,
            other => Err(ToolError::InvalidArguments(format!(
                "unknown operation: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rust_files_have_linters() {
        let commands = commands_for("src/lib.rs").unwrap();
        assert_eq!(commands.check[0], "cargo");
        assert_eq!(commands.fix[1], "fmt");
    }

    #[test]
    fn go_files_have_linters() {
        let commands = commands_for("main.go").unwrap();
        assert_eq!(commands.check[0], "go");
    }

    #[test]
    fn unknown_extension_has_no_linter() {
        assert!(commands_for("style.css").is_none());
        assert!(commands_for("README.md").is_none());
    }

    #[tokio::test]
    async fn unsupported_file_type_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let tool = LinterTool::new(dir.path());
        let err = tool
            .execute(serde_json::json!({"operation": "check", "path": "style.css"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }

    #[tokio::test]
    async fn missing_operation_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let tool = LinterTool::new(dir.path());
        let err = tool
            .execute(serde_json::json!({"path": "lib.rs"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}

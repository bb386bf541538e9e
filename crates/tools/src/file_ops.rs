//! Filesystem tool — workspace-scoped file operations.
//!
//! Paths are resolved against the workspace root and must stay inside it;
//! escaping via `..` or absolute paths outside the root is rejected.

use async_trait::async_trait;
use oxpilot_core::error::ToolError;
use oxpilot_core::tool::Tool;
use std::path::{Component, Path, PathBuf};

pub struct FilesystemTool {
    workspace: PathBuf,
}

impl FilesystemTool {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
        }
    }

    /// Resolve a path inside the workspace, rejecting escapes.
    fn resolve(&self, path: &str) -> Result<PathBuf, ToolError> {
        let candidate = Path::new(path);

        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.workspace.join(candidate)
        };

        // Normalize without touching the filesystem so nonexistent targets
        // (a new file about to be written) can still be validated.
        let mut normalized = PathBuf::new();
        for component in joined.components() {
            match component {
                Component::ParentDir => {
                    if !normalized.pop() {
                        return Err(Self::outside_workspace(path));
                    }
                }
                Component::CurDir => {}
                other => normalized.push(other),
            }
        }

        if !normalized.starts_with(&self.workspace) {
            return Err(Self::outside_workspace(path));
        }

        Ok(normalized)
    }

    fn outside_workspace(path: &str) -> ToolError {
        ToolError::PermissionDenied {
            tool_name: "filesystem".into(),
            reason: format!("path is outside workspace: {path}"),
        }
    }

    async fn read(&self, path: &str) -> Result<String, ToolError> {
        let resolved = self.resolve(path)?;
        tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "filesystem".into(),
                reason: format!("failed to read file: {e}"),
            })
    }

    async fn write(&self, path: &str, content: &str) -> Result<String, ToolError> {
        let resolved = self.resolve(path)?;

        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ToolError::ExecutionFailed {
                    tool_name: "filesystem".into(),
                    reason: format!("failed to create directory: {e}"),
                })?;
        }

        tokio::fs::write(&resolved, content)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "filesystem".into(),
                reason: format!("failed to write file: {e}"),
            })?;

        Ok(format!(
            "Successfully wrote {} bytes to {path}",
            content.len()
        ))
    }

    async fn list(&self, path: &str, recursive: bool) -> Result<String, ToolError> {
        let resolved = self.resolve(path)?;
        let mut entries = Vec::new();
        self.collect_entries(&resolved, recursive, &mut entries)?;
        entries.sort();
        Ok(entries.join("\n"))
    }

    fn collect_entries(
        &self,
        dir: &Path,
        recursive: bool,
        out: &mut Vec<String>,
    ) -> Result<(), ToolError> {
        let read_dir = std::fs::read_dir(dir).map_err(|e| ToolError::ExecutionFailed {
            tool_name: "filesystem".into(),
            reason: format!("failed to list directory: {e}"),
        })?;

        for entry in read_dir.flatten() {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            // Hidden entries (including the backup directory) are skipped
            if name.starts_with('.') {
                continue;
            }
            if let Ok(rel) = path.strip_prefix(&self.workspace) {
                out.push(rel.to_string_lossy().to_string());
            }
            if recursive && path.is_dir() {
                self.collect_entries(&path, true, out)?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Tool for FilesystemTool {
    fn name(&self) -> &str {
        "filesystem"
    }

    fn description(&self) -> &str {
        "Workspace file operations. Args: {\"operation\": \"read|write|list\", \"path\": \"...\", \"content\": \"...\", \"recursive\": true}"
    }

    async fn execute(&self, args: serde_json::Value) -> Result<String, ToolError> {
        let operation = args["operation"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("operation not specified".into()))?;

        match operation {
            "read" => {
                let path = args["path"]
                    .as_str()
                    .ok_or_else(|| ToolError::InvalidArguments("path not specified".into()))?;
                self.read(path).await
            }
            "write" => {
                let path = args["path"]
                    .as_str()
                    .ok_or_else(|| ToolError::InvalidArguments("path not specified".into()))?;
                let content = args["content"]
                    .as_str()
                    .ok_or_else(|| ToolError::InvalidArguments("content not specified".into()))?;
                self.write(path, content).await
            }
            "list" => {
                let path = args["path"].as_str().unwrap_or(".");
                let recursive = args["recursive"].as_bool().unwrap_or(false);
                self.list(path, recursive).await
            }
            other => Err(ToolError::InvalidArguments(format!(
                "unknown operation: {other}"
            ))),
        }
    }
}

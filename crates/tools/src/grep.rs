//! Grep search tool — substring search across the workspace.
//!
//! Walks the tree (hidden entries skipped), matching lines case-insensitively
//! by default, and caps output at 50 results.

use async_trait::async_trait;
use oxpilot_core::error::ToolError;
use oxpilot_core::tool::Tool;
use std::path::{Path, PathBuf};

const MAX_RESULTS: usize = 50;

pub struct GrepSearchTool {
    workspace: PathBuf,
}

struct SearchOptions {
    pattern: String,
    include_ext: Option<String>,
    case_sensitive: bool,
}

impl GrepSearchTool {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
        }
    }

    fn search(&self, options: &SearchOptions) -> Result<Vec<String>, ToolError> {
        let mut results = Vec::new();
        self.search_dir(&self.workspace, options, &mut results)?;
        Ok(results)
    }

    fn search_dir(
        &self,
        dir: &Path,
        options: &SearchOptions,
        results: &mut Vec<String>,
    ) -> Result<(), ToolError> {
        if results.len() >= MAX_RESULTS {
            return Ok(());
        }

        let entries = std::fs::read_dir(dir).map_err(|e| ToolError::ExecutionFailed {
            tool_name: "grep_search".into(),
            reason: format!("search failed: {e}"),
        })?;

        let mut entries: Vec<_> = entries.flatten().collect();
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            if results.len() >= MAX_RESULTS {
                return Ok(());
            }

            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }

            let path = entry.path();
            if path.is_dir() {
                self.search_dir(&path, options, results)?;
                continue;
            }

            if let Some(ext) = &options.include_ext
                && !name.ends_with(ext.as_str())
            {
                continue;
            }

            // Listing mode: pattern "." returns file paths only
            let rel = path
                .strip_prefix(&self.workspace)
                .unwrap_or(&path)
                .to_string_lossy()
                .to_string();

            if options.pattern == "." {
                results.push(rel);
                continue;
            }

            let Ok(content) = std::fs::read_to_string(&path) else {
                continue; // binary or unreadable
            };

            for (line_num, line) in content.lines().enumerate() {
                let found = if options.case_sensitive {
                    line.contains(&options.pattern)
                } else {
                    line.to_lowercase().contains(&options.pattern.to_lowercase())
                };

                if found {
                    results.push(format!("{rel}:{}:{line}", line_num + 1));
                    if results.len() >= MAX_RESULTS {
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Tool for GrepSearchTool {
    fn name(&self) -> &str {
        "grep_search"
    }

    fn description(&self) -> &str {
        "Search for patterns in workspace files. Args: {\"pattern\": \"...\", \"include\": \".rs\", \"case_sensitive\": false}"
    }

    async fn execute(&self, args: serde_json::Value) -> Result<String, ToolError> {
        let pattern = args["pattern"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("pattern argument required".into()))?;

        let options = SearchOptions {
            pattern: pattern.to_string(),
            include_ext: args["include"].as_str().map(String::from),
            case_sensitive: args["case_sensitive"].as_bool().unwrap_or(false),
        };

        let results = self.search(&options)?;
        if results.is_empty() {
            return Ok("No matches found".into());
        }
        Ok(results.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (tempfile::TempDir, GrepSearchTool) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(
            dir.path().join("src/main.rs"),
            "fn main() {\n    println!(\"Hello\");\n}\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.md"), "# Hello notes\n").unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git/config"), "Hello from git\n").unwrap();

        let tool = GrepSearchTool::new(dir.path());
        (dir, tool)
    }

    #[tokio::test]
    async fn finds_matches_with_locations() {
        let (_dir, tool) = fixture();
        let output = tool
            .execute(serde_json::json!({"pattern": "hello"}))
            .await
            .unwrap();
        assert!(output.contains("src/main.rs:2:"));
        assert!(output.contains("notes.md:1:"));
    }

    #[tokio::test]
    async fn hidden_directories_skipped() {
        let (_dir, tool) = fixture();
        let output = tool
            .execute(serde_json::json!({"pattern": "Hello"}))
            .await
            .unwrap();
        assert!(!output.contains(".git"));
    }

    #[tokio::test]
    async fn case_sensitive_search() {
        let (_dir, tool) = fixture();
        let output = tool
            .execute(serde_json::json!({"pattern": "hello", "case_sensitive": true}))
            .await
            .unwrap();
        assert_eq!(output, "No matches found");
    }

    #[tokio::test]
    async fn include_extension_filter() {
        let (_dir, tool) = fixture();
        let output = tool
            .execute(serde_json::json!({"pattern": "Hello", "include": ".rs"}))
            .await
            .unwrap();
        assert!(output.contains("src/main.rs"));
        assert!(!output.contains("notes.md"));
    }

    #[tokio::test]
    async fn dot_pattern_lists_files() {
        let (_dir, tool) = fixture();
        let output = tool
            .execute(serde_json::json!({"pattern": "."}))
            .await
            .unwrap();
        assert!(output.contains("src/main.rs"));
        assert!(output.contains("notes.md"));
    }

    #[tokio::test]
    async fn result_cap_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let mut content = String::new();
        for i in 0..200 {
            content.push_str(&format!("needle line {i}\n"));
        }
        std::fs::write(dir.path().join("big.txt"), content).unwrap();

        let tool = GrepSearchTool::new(dir.path());
        let output = tool
            .execute(serde_json::json!({"pattern": "needle"}))
            .await
            .unwrap();
        assert_eq!(output.lines().count(), MAX_RESULTS);
    }
}

//! Built-in tool implementations for oxpilot.
//!
//! Tools give the agent the ability to act on the workspace: git operations,
//! file reads and writes, terminal commands, pattern search, and linting.
//! Inspection tools (diff, read, status, search) are idempotent; mutating
//! tools (write, commit, reset) are only reached through the decision
//! engine, which takes a backup first.

pub mod file_ops;
pub mod git;
pub mod grep;
pub mod linter;
pub mod terminal;

pub use file_ops::FilesystemTool;
pub use git::GitTool;
pub use grep::GrepSearchTool;
pub use linter::LinterTool;
pub use terminal::TerminalTool;

use oxpilot_core::tool::ToolRegistry;
use std::path::Path;

/// Create the default tool registry rooted at a workspace.
///
/// `allowed_commands` scopes the terminal tool; empty allows everything.
pub fn default_registry(workspace: &Path, allowed_commands: Vec<String>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(GitTool::new(workspace)));
    registry.register(Box::new(FilesystemTool::new(workspace)));
    registry.register(Box::new(TerminalTool::new(workspace, allowed_commands)));
    registry.register(Box::new(GrepSearchTool::new(workspace)));
    registry.register(Box::new(LinterTool::new(workspace)));
    registry
}

//! Tool trait and registry — the abstraction over agent capabilities.
//!
//! Tools are what let the agent act on the workspace: run git operations,
//! read and write files, execute commands, search, lint. The registry also
//! recognizes tool-call JSON embedded in model output.

use crate::error::ToolError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The core Tool trait.
///
/// Each tool implements this trait and is registered in the [`ToolRegistry`].
/// `execute` takes a JSON object of arguments and returns output text.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g. "git", "filesystem").
    fn name(&self) -> &str;

    /// A description of what this tool does (shown to the LLM).
    fn description(&self) -> &str;

    /// Execute the tool with the given arguments.
    async fn execute(
        &self,
        args: serde_json::Value,
    ) -> std::result::Result<String, ToolError>;
}

/// A tool's name and description, for prompt construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSummary {
    pub name: String,
    pub description: String,
}

/// The wire shape of a tool call embedded in model output.
#[derive(Debug, Deserialize)]
struct RawToolCall {
    tool: String,
    #[serde(default)]
    args: serde_json::Value,
}

/// A registry of available tools, indexed by name.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Name + description of every registered tool.
    pub fn descriptions(&self) -> Vec<ToolSummary> {
        let mut summaries: Vec<ToolSummary> = self
            .tools
            .values()
            .map(|t| ToolSummary {
                name: t.name().to_string(),
                description: t.description().to_string(),
            })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Try to interpret `text` as a tool call.
    ///
    /// The text may be a full response or a single streamed fragment, and the
    /// `{"tool": name, "args": {...}}` object may be surrounded by other text.
    /// Returns a bound [`ToolCall`] only when the object parses AND the name
    /// resolves in the registry; otherwise `None` and the text is left for
    /// normal display.
    pub fn parse_tool_call(&self, text: &str) -> Option<ToolCall<'_>> {
        for candidate in json_object_candidates(text) {
            if let Ok(raw) = serde_json::from_str::<RawToolCall>(candidate)
                && let Some(tool) = self.get(&raw.tool)
            {
                return Some(ToolCall {
                    tool,
                    args: raw.args,
                });
            }
        }
        None
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A parsed tool call, bound to its registered tool and ready to execute.
pub struct ToolCall<'a> {
    tool: &'a dyn Tool,
    args: serde_json::Value,
}

impl ToolCall<'_> {
    pub fn tool_name(&self) -> &str {
        self.tool.name()
    }

    pub fn args(&self) -> &serde_json::Value {
        &self.args
    }

    /// Run the tool with the bound arguments.
    ///
    /// A failing tool is reported as text ("Error executing tool: …") rather
    /// than a typed error; callers inspect the returned string.
    pub async fn execute(&self) -> String {
        match self.tool.execute(self.args.clone()).await {
            Ok(output) => output,
            Err(e) => format!("Error executing tool: {e}"),
        }
    }
}

/// Yield every balanced `{ ... }` substring of `text`, outermost first.
///
/// Brace depth is tracked outside of JSON string literals so braces inside
/// quoted values don't terminate a candidate early.
fn json_object_candidates(text: &str) -> impl Iterator<Item = &str> {
    let bytes = text.as_bytes();
    let mut candidates = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'{' {
            if let Some(end) = find_balanced_end(bytes, i) {
                candidates.push(&text[i..=end]);
                i = end + 1;
                continue;
            }
        }
        i += 1;
    }

    candidates.into_iter()
}

fn find_balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}

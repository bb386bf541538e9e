//! Goal-directed agent loop.
//!
//! Each iteration asks the model for its next step, runs the phases, shows
//! the operator the resulting diff, backs up changed files, and blocks for
//! exactly one operator command. One task is in flight at a time; the loop is
//! strictly sequential.

use crate::session::Session;
use async_trait::async_trait;
use oxpilot_core::decision::{AgentState, TaskState, TaskStatus};
use oxpilot_core::error::Error;
use tracing::{info, warn};

/// The fixed prompt that advances the goal each iteration.
const CONTINUATION_PROMPT: &str = "Continue working on the goal. What's your next step?";

/// An operator command, one per loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentCommand {
    /// Accept and commit the current changes.
    Accept,
    /// Reject and roll back the current changes.
    Reject,
    /// Reject the current changes and exit the loop.
    RejectAll,
    /// Redisplay the detailed diff.
    Diff,
    /// Show the task summary.
    Summary,
    /// Show overall progress.
    Progress,
    /// Exit without further action.
    Quit,
}

impl AgentCommand {
    /// Parse an operator input line. `A` (capital) is reject-all, matching
    /// the menu; everything else is case-insensitive.
    pub fn parse(input: &str) -> Option<AgentCommand> {
        let trimmed = input.trim();
        if trimmed == "A" {
            return Some(AgentCommand::RejectAll);
        }
        match trimmed.to_lowercase().as_str() {
            "a" | "accept" => Some(AgentCommand::Accept),
            "r" | "reject" => Some(AgentCommand::Reject),
            "all" | "reject-all" => Some(AgentCommand::RejectAll),
            "d" | "diff" => Some(AgentCommand::Diff),
            "s" | "summary" => Some(AgentCommand::Summary),
            "p" | "progress" => Some(AgentCommand::Progress),
            "q" | "quit" => Some(AgentCommand::Quit),
            _ => None,
        }
    }
}

/// Source of operator input. The CLI reads stdin; tests script a sequence.
#[async_trait]
pub trait Operator: Send {
    /// The next input line, or `None` when input is exhausted.
    async fn next_line(&mut self) -> Option<String>;
}

pub struct AgentLoop<'a> {
    session: &'a Session,
}

impl<'a> AgentLoop<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    /// Run the loop until the operator quits, rejects all, or input ends.
    ///
    /// `out` receives every displayable chunk, in order.
    pub async fn run(
        &self,
        goal: &str,
        operator: &mut dyn Operator,
        out: &mut dyn FnMut(&str),
    ) -> Result<(), Error> {
        self.start(goal).await;
        out(&format!("\nStarting AI Agent mode with goal: {goal}\n\n"));

        loop {
            // Next step from the model, streamed through the phase machine
            let mut rx = self.session.process_prompt(CONTINUATION_PROMPT);
            let mut response = String::new();
            while let Some(chunk) = rx.recv().await {
                out(&chunk);
                response.push_str(&chunk);
            }

            let task_desc = extract_task_description(&response);

            {
                let mut state = self.session.state.write().await;
                let applied = std::mem::take(&mut state.last_changes);
                if let Some(agent) = state.agent.as_mut() {
                    agent.rotate_task(
                        TaskStatus::Completed,
                        Some(TaskState::started(task_desc.clone())),
                    );
                    // The engine's pre-write backups belong to the new task
                    if let Some(task) = agent.current_task.as_mut() {
                        task.changes = applied;
                    }
                }
            }

            // Show what changed
            let diff = self.git(serde_json::json!({"operation": "diff"})).await;
            if diff != "No changes detected" {
                out(&diff);
            }

            // Snapshot changed files so reject can restore them
            match self.backup_changed_files().await {
                Ok(count) if count > 0 => {
                    info!(files = count, "Backed up changed files");
                }
                Ok(_) => {}
                Err(e) => {
                    out(&format!("\nWarning: Failed to create backup: {e}\n"));
                }
            }

            // Block for one operator command
            loop {
                out("\nWhat would you like to do?\n");
                out("  [a]ccept     - Accept and commit the current changes\n");
                out("  [r]eject     - Reject and rollback the current changes\n");
                out("  [A]ll        - Reject all changes and exit\n");
                out("  [d]iff       - Show detailed changes\n");
                out("  [s]ummary    - Show task summary\n");
                out("  [p]rogress   - Show overall progress\n");
                out("  [q]uit       - Exit agent mode\n");
                out("\nEnter your choice: ");

                let Some(input) = operator.next_line().await else {
                    return Ok(());
                };

                match AgentCommand::parse(&input) {
                    Some(AgentCommand::Accept) => {
                        self.accept(&task_desc, out).await;
                        break;
                    }
                    Some(AgentCommand::Reject) => {
                        self.reject(out).await;
                        break;
                    }
                    Some(AgentCommand::RejectAll) => {
                        self.reject(out).await;
                        out("All changes reset successfully.\n");
                        return Ok(());
                    }
                    Some(AgentCommand::Diff) => {
                        let diff = self.git(serde_json::json!({"operation": "diff"})).await;
                        out(&format!("\nDetailed changes:\n{diff}\n"));
                    }
                    Some(AgentCommand::Summary) => {
                        out(&self.task_summary().await);
                    }
                    Some(AgentCommand::Progress) => {
                        out(&self.progress().await);
                    }
                    Some(AgentCommand::Quit) => {
                        return Ok(());
                    }
                    None => {
                        out("Invalid input. Please try again.\n");
                    }
                }
            }
        }
    }

    /// Install the agent state and the goal-specific system message.
    async fn start(&self, goal: &str) {
        let tool_list: String = self
            .session
            .tools()
            .descriptions()
            .iter()
            .map(|t| format!("- {}: {}\n", t.name, t.description))
            .collect();

        let system_message = format!(
            "You are a powerful AI coding assistant working on the following goal:\n\n\
{goal}\n\n\
Follow these steps for each task:\n\n\
1. ANALYZE: First, analyze the current state and explain your thinking process\n\
2. PLAN: Describe what changes you plan to make and why\n\
3. IMPLEMENT: Make the necessary code changes\n\
4. VERIFY: Explain how the changes achieve the goal\n\n\
When writing code:\n\
- Always add necessary imports\n\
- Ensure the code is complete and can run\n\
- Follow best practices and conventions\n\
- Start each response with \"Task: <brief task description>\"\n\n\
Available tools:\n{tool_list}\n\
Current workspace: {}\n",
            self.session.workspace().display()
        );

        let mut state = self.session.state.write().await;
        state.agent = Some(AgentState::new(goal));
        state.client.add_system_message(&system_message);
        info!(goal, "Agent mode started");
    }

    async fn git(&self, args: serde_json::Value) -> String {
        match self.session.tools().get("git") {
            Some(git) => match git.execute(args).await {
                Ok(output) => output,
                Err(e) => format!("Error executing tool: {e}"),
            },
            None => "Error executing tool: git tool not available".into(),
        }
    }

    /// Back up tracked changed files not already snapshotted by the engine
    /// and record them on the current task. Returns the number captured.
    async fn backup_changed_files(&self) -> Result<usize, Error> {
        let porcelain = match self.session.tools().get("git") {
            Some(git) => git
                .execute(serde_json::json!({"operation": "status"}))
                .await
                .map_err(Error::Tool)?,
            None => return Ok(0),
        };

        // Files the engine already backed up pre-write keep those snapshots;
        // backing them up again here would capture post-write bytes.
        let tracked: std::collections::HashSet<String> = {
            let state = self.session.state.read().await;
            state
                .agent
                .as_ref()
                .and_then(|a| a.current_task.as_ref())
                .map(|t| t.changes.iter().map(|c| c.file_path.clone()).collect())
                .unwrap_or_default()
        };

        let filtered: String = porcelain
            .lines()
            .filter(|line| line.len() >= 3 && !tracked.contains(line[3..].trim()))
            .map(|line| format!("{line}\n"))
            .collect();

        let changes = self
            .session
            .tracker()
            .backup_changed_files(&filtered)
            .map_err(Error::Tracker)?;
        let count = changes.len();

        if count > 0 {
            let mut state = self.session.state.write().await;
            if let Some(agent) = state.agent.as_mut()
                && let Some(task) = agent.current_task.as_mut()
            {
                task.changes.extend(changes);
            }
        }

        Ok(count)
    }

    async fn accept(&self, task_desc: &str, out: &mut dyn FnMut(&str)) {
        let changes = {
            let mut state = self.session.state.write().await;
            if let Some(agent) = state.agent.as_mut() {
                if let Some(task) = agent.current_task.as_mut() {
                    task.status = TaskStatus::Completed;
                }
                agent.touch();
                agent
                    .current_task
                    .as_ref()
                    .map(|t| t.changes.clone())
                    .unwrap_or_default()
            } else {
                Vec::new()
            }
        };

        let message = format!("Auto commit: {task_desc}");
        let result = self
            .git(serde_json::json!({"operation": "commit", "message": message}))
            .await;
        if result.starts_with("Error executing tool:") {
            out(&format!("Failed to commit changes: {result}\n"));
        } else {
            out("Changes committed successfully.\n");
        }

        // Accepted changes no longer need their snapshots
        self.session.tracker().discard_all(&changes);
    }

    async fn reject(&self, out: &mut dyn FnMut(&str)) {
        let changes = {
            let mut state = self.session.state.write().await;
            if let Some(agent) = state.agent.as_mut() {
                if let Some(task) = agent.current_task.as_mut() {
                    task.status = TaskStatus::Rejected;
                }
                agent.touch();
                agent
                    .current_task
                    .as_ref()
                    .map(|t| t.changes.clone())
                    .unwrap_or_default()
            } else {
                Vec::new()
            }
        };

        // Restore every change with a backup, best-effort, then hard-reset
        // to discard anything not explicitly tracked as a change.
        let report = self.session.tracker().rollback(&changes);
        if !report.is_clean() {
            warn!(failures = report.failures.len(), "Rollback incomplete");
            out(&format!("Warning: rollback incomplete: {report}\n"));
        }

        let result = self.git(serde_json::json!({"operation": "reset"})).await;
        if result.starts_with("Error executing tool:") {
            out(&format!("Failed to reset changes: {result}\n"));
        } else {
            out("Changes reset successfully.\n");
        }
    }

    async fn task_summary(&self) -> String {
        let state = self.session.state.read().await;
        let Some(agent) = state.agent.as_ref() else {
            return "No agent session active.\n".into();
        };

        let mut text = String::from("\nTask Summary:\n");
        text.push_str(&format!("Goal: {}\n", agent.goal));

        if let Some(task) = agent.current_task.as_ref() {
            text.push_str(&format!("Current Task: {}\n", task.description));
            text.push_str(&format!("Start Time: {}\n", task.start_time.to_rfc3339()));
        }

        if !agent.completed_tasks.is_empty() {
            text.push_str("\nCompleted Tasks:\n");
            for (i, task) in agent.completed_tasks.iter().enumerate() {
                text.push_str(&format!(
                    "{}. {} ({})\n",
                    i + 1,
                    task.description,
                    task.status
                ));
            }
        }

        text
    }

    async fn progress(&self) -> String {
        let state = self.session.state.read().await;
        let Some(agent) = state.agent.as_ref() else {
            return "No agent session active.\n".into();
        };

        let mut text = String::from("\nOverall Progress:\n");
        text.push_str(&format!("Goal: {}\n", agent.goal));
        text.push_str(&format!("Started: {}\n", agent.start_time.to_rfc3339()));
        text.push_str(&format!(
            "Last Activity: {}\n",
            agent.last_activity.to_rfc3339()
        ));

        if !agent.completed_tasks.is_empty() {
            text.push_str("\nCompleted Tasks:\n");
            for (i, task) in agent.completed_tasks.iter().enumerate() {
                text.push_str(&format!(
                    "{}. {} ({})\n",
                    i + 1,
                    task.description,
                    task.status
                ));
            }
        }

        if let Some(task) = agent.current_task.as_ref() {
            text.push_str(&format!("\nCurrent Task: {}\n", task.description));
            text.push_str(&format!("Status: {}\n", task.status));
        }

        text
    }
}

/// Extract the leading `Task: …` descriptor from a response, if present.
fn extract_task_description(response: &str) -> String {
    response
        .lines()
        .find_map(|line| line.trim().strip_prefix("Task:"))
        .map(|desc| desc.trim().to_string())
        .unwrap_or_default()
}

//! The session actor.
//!
//! One `Session` per interactive sitting. Conversation and agent state are
//! owned exclusively by the session object and guarded by a single
//! `tokio::sync::RwLock`; a prompt's worker takes the write half for its full
//! run, so concurrent prompts on the same session serialize. Cancellation is
//! checked at every publish point; a cancelled prompt stops publishing, emits
//! one final `[cancelled]` marker, and closes the stream.

use oxpilot_config::AppConfig;
use oxpilot_core::decision::AgentState;
use oxpilot_core::error::Error;
use oxpilot_core::tool::ToolRegistry;
use oxpilot_engine::{DecisionEngine, OutputSink};
use oxpilot_providers::LlmClient;
use oxpilot_tracker::ChangeTracker;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Mutable session state behind the lock.
pub(crate) struct SessionState {
    pub(crate) client: LlmClient,
    pub(crate) agent: Option<AgentState>,
    /// Changes applied by the most recent prompt, with backup paths
    /// populated. Claimed by the agent loop when it rotates tasks.
    pub(crate) last_changes: Vec<oxpilot_core::decision::Change>,
}

pub struct Session {
    id: Uuid,
    workspace: PathBuf,
    tools: Arc<ToolRegistry>,
    engine: Arc<DecisionEngine>,
    tracker: Arc<ChangeTracker>,
    pub(crate) state: Arc<RwLock<SessionState>>,
    current_cancel: std::sync::Mutex<CancellationToken>,
}

impl Session {
    /// Build a session from configuration, rooted at a workspace directory.
    pub fn new(config: &AppConfig, workspace: impl Into<PathBuf>) -> Result<Self, Error> {
        let workspace = workspace.into();
        let client = LlmClient::new(config)?;
        let tools = Arc::new(oxpilot_tools::default_registry(
            &workspace,
            config.allowed_commands.clone(),
        ));
        Ok(Self::assemble(client, tools, workspace))
    }

    /// Build a session from explicit parts (test seam).
    pub fn with_parts(
        client: LlmClient,
        tools: Arc<ToolRegistry>,
        workspace: impl Into<PathBuf>,
    ) -> Self {
        Self::assemble(client, tools, workspace.into())
    }

    fn assemble(client: LlmClient, tools: Arc<ToolRegistry>, workspace: PathBuf) -> Self {
        let engine = Arc::new(DecisionEngine::new(tools.clone()));
        let tracker = Arc::new(ChangeTracker::new(&workspace));
        let id = Uuid::new_v4();
        info!(session = %id, workspace = %workspace.display(), "Session created");

        Self {
            id,
            workspace,
            tools,
            engine,
            tracker,
            state: Arc::new(RwLock::new(SessionState {
                client,
                agent: None,
                last_changes: Vec::new(),
            })),
            current_cancel: std::sync::Mutex::new(CancellationToken::new()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub(crate) fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    /// Cancel the in-flight prompt, if any.
    pub fn cancel(&self) {
        self.current_cancel.lock().unwrap().cancel();
    }

    /// Provider and model currently in use, for status display.
    pub async fn provider_info(&self) -> (String, String) {
        let state = self.state.read().await;
        (
            state.client.provider_name().to_string(),
            state.client.model().to_string(),
        )
    }

    /// Clear the conversation history.
    pub async fn reset_conversation(&self) {
        self.state.write().await.client.reset_conversation();
    }

    /// A snapshot of the agent state, if agent mode is active.
    pub async fn agent_snapshot(&self) -> Option<AgentState> {
        self.state.read().await.agent.clone()
    }

    /// The system message installed before each prompt: the phase protocol,
    /// the available tools, and the workspace root.
    fn build_system_message(&self) -> String {
        let tool_list: String = self
            .tools
            .descriptions()
            .iter()
            .map(|t| format!("- {}: {}\n", t.name, t.description))
            .collect();

        format!(
            "You are a powerful AI coding assistant. You will process requests in distinct phases:\n\n\
1. Analysis Phase:\n\
   - Understand the user's request\n\
   - Determine required tools and context\n\
   - Plan the implementation strategy\n\n\
2. Context Gathering Phase:\n\
   - Collect relevant code context\n\
   - Analyze dependencies\n\
   - Understand the current state\n\n\
3. Modification Phase:\n\
   - Propose specific code changes\n\
   - Use appropriate tools to implement changes\n\
   - Maintain code quality and consistency\n\n\
4. Verification Phase:\n\
   - Verify changes meet requirements\n\
   - Run tests if applicable\n\
   - Present changes for user confirmation\n\n\
For each action, explain your reasoning and wait for user confirmation before proceeding.\n\n\
Available tools:\n{tool_list}\n\
Current workspace: {}\n",
            self.workspace.display()
        )
    }

    /// Process a prompt on a background worker, returning the ordered result
    /// stream. The caller reads the stream until it closes.
    pub fn process_prompt(&self, prompt: impl Into<String>) -> mpsc::Receiver<String> {
        let prompt = prompt.into();
        let (tx, rx) = mpsc::channel(64);

        let cancel = CancellationToken::new();
        *self.current_cancel.lock().unwrap() = cancel.clone();

        let state = self.state.clone();
        let engine = self.engine.clone();
        let tracker = self.tracker.clone();
        let system_message = self.build_system_message();
        let session_id = self.id;

        tokio::spawn(async move {
            let sink = OutputSink::new(tx.clone(), cancel.clone());

            // The write half is held for the whole prompt: exactly one
            // worker may mutate session state at a time.
            let mut state = state.write().await;

            // In agent mode the goal-specific system message stays; the
            // conversation carries at most one system message, so installing
            // the phase message here would evict the goal.
            if state.agent.is_none() {
                state.client.add_system_message(&system_message);
            }

            let decision = match engine.initial_decision(&state.client, &prompt).await {
                Ok(decision) => decision,
                Err(e) => {
                    warn!(session = %session_id, error = %e, "Prompt analysis failed");
                    sink.publish(format!("Error analyzing prompt: {e}")).await;
                    return;
                }
            };

            match engine
                .run_phases(&mut state.client, &tracker, &decision, &prompt, &sink)
                .await
            {
                Ok(changes) => {
                    state.last_changes = changes;
                    if let Some(agent) = state.agent.as_mut() {
                        agent.touch();
                    }
                }
                Err(e) => {
                    // The engine already surfaced the error into the stream;
                    // the session stays usable for the next prompt.
                    warn!(session = %session_id, error = %e, "Prompt ended with error");
                }
            }

            if cancel.is_cancelled() {
                let _ = tx.send("\n[cancelled]\n".into()).await;
            }
        });

        rx
    }
}

//! Decision engine — parses model responses into structured decisions and
//! drives the fixed four-phase task state machine.
//!
//! Phases run in a fixed total order: analysis → context → modification →
//! verification. The initial decision picks the *starting* phase; each
//! remaining phase executes exactly once, synchronously, with no automatic
//! retry. After each handler the engine asks the model to continue, filtering
//! streamed fragments through the tool-call parser.

pub mod parser;

pub use parser::parse_decision;

use oxpilot_core::decision::{Change, Decision, DecisionPhase};
use oxpilot_core::error::{EngineError, Error, ProviderError};
use oxpilot_core::tool::ToolRegistry;
use oxpilot_providers::LlmClient;
use oxpilot_tracker::ChangeTracker;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Ordered output stream with a cancellation check at every publish point.
///
/// Once the token is cancelled, `publish` drops the text and reports `false`;
/// the producing side is expected to stop promptly.
pub struct OutputSink {
    tx: mpsc::Sender<String>,
    cancel: CancellationToken,
}

impl OutputSink {
    pub fn new(tx: mpsc::Sender<String>, cancel: CancellationToken) -> Self {
        Self { tx, cancel }
    }

    /// Deliver one fragment. Returns `false` when cancelled or when the
    /// consumer is gone.
    pub async fn publish(&self, text: impl Into<String>) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.tx.send(text.into()).await.is_ok()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// The prompt used to obtain the initial structured decision.
fn analysis_prompt(prompt: &str) -> String {
    format!(
        "You are an AI assistant analyzing a user request to determine the next action.\n\
Please analyze the following request and determine the best approach:\n\n\
Request: {prompt}\n\n\
You MUST respond in the following format EXACTLY, including all fields:\n\n\
Phase: [analysis/context/modification/verification]\n\
Action: [specific action to take]\n\
Reasoning: [why this approach]\n\
Context: [comma-separated list of files/directories needed]\n\
Tools: [comma-separated list of tools needed]\n\
Changes: [list of file changes in the format: filepath|description]\n\n\
If this is a follow-up request, treat it as a new analysis phase.\n\
Do not reference previous responses or assume any context from previous interactions.\n\
Always provide ALL fields in your response, even if some are empty (use empty string or N/A).\n"
    )
}

fn phase_banner(phase: DecisionPhase) -> &'static str {
    match phase {
        DecisionPhase::Analysis => "Starting analysis phase...",
        DecisionPhase::Context => "Gathering context...",
        DecisionPhase::Modification => "Making modifications...",
        DecisionPhase::Verification => "Verifying changes...",
    }
}

/// Drives decisions through the four-phase state machine.
pub struct DecisionEngine {
    tools: Arc<ToolRegistry>,
}

impl DecisionEngine {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self { tools }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Ask the model for the initial decision and validate it.
    ///
    /// A decision missing a required field aborts here — before any phase
    /// handler runs, so there are no partial side effects.
    pub async fn initial_decision(
        &self,
        client: &LlmClient,
        prompt: &str,
    ) -> Result<Decision, Error> {
        let response = client.send(&analysis_prompt(prompt)).await?;
        debug!(len = response.len(), "Parsing initial decision");
        let decision = parse_decision(&response)?;
        Ok(decision)
    }

    /// Execute the remaining phases, starting from the decision's phase.
    ///
    /// Returns the changes applied during the modification phase (with backup
    /// paths populated). Stops quietly when the sink is cancelled.
    pub async fn run_phases(
        &self,
        client: &mut LlmClient,
        tracker: &ChangeTracker,
        decision: &Decision,
        prompt: &str,
        sink: &OutputSink,
    ) -> Result<Vec<Change>, Error> {
        let start = DecisionPhase::ALL
            .iter()
            .position(|p| *p == decision.phase)
            .unwrap_or(0);

        let mut applied = Vec::new();

        for &phase in &DecisionPhase::ALL[start..] {
            if !sink.publish(format!("\n=== {} ===\n", phase_banner(phase))).await {
                return Ok(applied);
            }

            let result = match phase {
                DecisionPhase::Analysis => self.analysis_phase(decision, sink).await,
                DecisionPhase::Context => self.context_phase(decision, sink).await,
                DecisionPhase::Modification => {
                    match self.modification_phase(client, tracker, decision, sink).await {
                        Ok(changes) => {
                            applied = changes;
                            Ok(())
                        }
                        Err(e) => Err(e),
                    }
                }
                DecisionPhase::Verification => self.verification_phase(sink).await,
            };

            if let Err(e) = result {
                sink.publish(format!("\nError in {phase} phase: {e}\n")).await;
                return Err(e);
            }

            // Ask the model to continue, routing streamed fragments through
            // the tool-call filter.
            let continuation =
                format!("Continue with {phase} phase. Current state: {}", decision.action);
            match self.stream_with_tools(client, &continuation, sink).await {
                Ok(response) => client.update_conversation(prompt, &response),
                Err(e) => {
                    sink.publish(format!("\nError getting LLM response: {e}\n")).await;
                    return Err(Error::Provider(e));
                }
            }

            if sink.is_cancelled() {
                return Ok(applied);
            }
        }

        Ok(applied)
    }

    /// Stream one exchange, executing any tool call found in a fragment and
    /// publishing its result in place of the raw text.
    async fn stream_with_tools(
        &self,
        client: &LlmClient,
        message: &str,
        sink: &OutputSink,
    ) -> Result<String, ProviderError> {
        let mut rx = client.stream_message(message).await?;
        let mut full = String::new();

        while let Some(item) = rx.recv().await {
            let fragment = item?;
            full.push_str(&fragment);

            if let Some(call) = self.tools.parse_tool_call(&fragment) {
                debug!(tool = call.tool_name(), "Executing embedded tool call");
                let result = call.execute().await;
                if !sink.publish(format!("\nTool result: {result}\n")).await {
                    break;
                }
            } else if !sink.publish(fragment).await {
                break;
            }
        }

        Ok(full)
    }

    async fn analysis_phase(&self, decision: &Decision, sink: &OutputSink) -> Result<(), Error> {
        sink.publish(format!(
            "Analysis:\n{}\n\nProposed action:\n{}\n",
            decision.reasoning, decision.action
        ))
        .await;

        if let Some(fs) = self.tools.get("filesystem") {
            for path in &decision.context {
                match fs
                    .execute(serde_json::json!({"operation": "read", "path": path}))
                    .await
                {
                    Ok(content) => {
                        sink.publish(format!("\nRelevant context from {path}:\n{content}\n"))
                            .await;
                    }
                    Err(e) => {
                        debug!(path = %path, error = %e, "Context file unavailable");
                    }
                }
            }
        }
        Ok(())
    }

    async fn context_phase(&self, decision: &Decision, sink: &OutputSink) -> Result<(), Error> {
        sink.publish("Gathering context...\n").await;

        if let Some(grep) = self.tools.get("grep_search") {
            for pattern in &decision.tools {
                match grep
                    .execute(serde_json::json!({"pattern": pattern}))
                    .await
                {
                    Ok(result) if !result.is_empty() => {
                        sink.publish(format!(
                            "\nFound matches for pattern {pattern}:\n{result}\n"
                        ))
                        .await;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        sink.publish(format!(
                            "\nError searching for pattern {pattern}: {e}\n"
                        ))
                        .await;
                    }
                }
            }
        }
        Ok(())
    }

    async fn modification_phase(
        &self,
        client: &LlmClient,
        tracker: &ChangeTracker,
        decision: &Decision,
        sink: &OutputSink,
    ) -> Result<Vec<Change>, Error> {
        sink.publish("Implementing changes...\n").await;

        let fs = self
            .tools
            .get("filesystem")
            .ok_or_else(|| Error::Internal("filesystem tool not available".into()))?;

        let mut applied: Vec<Change> = Vec::new();

        for change in &decision.changes {
            sink.publish(format!(
                "\nProcessing change for {}:\n{}\n",
                change.file_path, change.description
            ))
            .await;

            // Backup strictly precedes the write
            let backup_path = match tracker.backup(&change.file_path) {
                Ok(path) => path,
                Err(e) => {
                    sink.publish(format!("Warning: Failed to create backup: {e}\n")).await;
                    self.rollback_applied(tracker, &applied, sink).await;
                    return Err(Error::Engine(EngineError::Backup {
                        path: change.file_path.clone(),
                        reason: e.to_string(),
                    }));
                }
            };

            let current = match fs
                .execute(serde_json::json!({"operation": "read", "path": &change.file_path}))
                .await
            {
                Ok(content) => content,
                Err(e) => {
                    sink.publish(format!("Error: Failed to read file: {e}\n")).await;
                    self.rollback_applied(tracker, &applied, sink).await;
                    return Err(Error::Engine(EngineError::Phase {
                        phase: "modification".into(),
                        reason: format!("file read failed: {e}"),
                    }));
                }
            };

            let modification_prompt = format!(
                "Given the current file content and the proposed change, generate the complete modified content.\n\
Current content:\n{current}\n\n\
Proposed change:\n{}\n\n\
Provide the complete modified content that can be written to the file. Ensure:\n\
1. All necessary imports are included\n\
2. The code follows best practices and conventions\n\
3. The changes are properly documented\n\
4. The code is properly formatted\n",
                change.description
            );

            let modified = match client.send(&modification_prompt).await {
                Ok(content) => content,
                Err(e) => {
                    sink.publish(format!("Error: Failed to generate modified content: {e}\n"))
                        .await;
                    self.rollback_applied(tracker, &applied, sink).await;
                    return Err(Error::Provider(e));
                }
            };

            if let Err(e) = fs
                .execute(serde_json::json!({
                    "operation": "write",
                    "path": &change.file_path,
                    "content": modified
                }))
                .await
            {
                sink.publish(format!("Error: Failed to write file: {e}\n")).await;
                self.rollback_applied(tracker, &applied, sink).await;
                return Err(Error::Engine(EngineError::Phase {
                    phase: "modification".into(),
                    reason: format!("file write failed: {e}"),
                }));
            }
            sink.publish("Successfully wrote changes to file\n").await;

            if let Some(linter) = self.tools.get("linter") {
                match linter
                    .execute(serde_json::json!({"operation": "check", "path": &change.file_path}))
                    .await
                {
                    Ok(result) if result == "No issues found" => {
                        sink.publish("Code passed linter checks\n").await;
                    }
                    Ok(result) => {
                        sink.publish(format!("Linter found issues:\n{result}\n")).await;
                    }
                    Err(e) => {
                        sink.publish(format!("Warning: Linter check failed: {e}\n")).await;
                    }
                }
            }

            if let Some(git) = self.tools.get("git") {
                match git
                    .execute(serde_json::json!({"operation": "add", "path": &change.file_path}))
                    .await
                {
                    Ok(_) => {
                        sink.publish("Added changes to git staging area\n").await;
                    }
                    Err(e) => {
                        sink.publish(format!("Warning: Failed to stage changes: {e}\n")).await;
                    }
                }
            }

            let mut recorded = change.clone();
            recorded.backup_path = Some(backup_path);
            applied.push(recorded);
        }

        Ok(applied)
    }

    async fn verification_phase(&self, sink: &OutputSink) -> Result<(), Error> {
        sink.publish("Verifying changes...\n").await;

        if let Some(git) = self.tools.get("git") {
            match git.execute(serde_json::json!({"operation": "diff"})).await {
                Ok(diff) if !diff.is_empty() => {
                    sink.publish(format!("\nProposed changes:\n{diff}\n")).await;
                }
                Ok(_) => {}
                Err(e) => {
                    sink.publish(format!("\nError getting changes: {e}\n")).await;
                }
            }
        }

        sink.publish("\nPlease review the changes and confirm (yes/no): ").await;
        Ok(())
    }

    /// Undo already-applied changes after a failure mid-phase: restore each
    /// backup, then hard-reset the working tree.
    async fn rollback_applied(
        &self,
        tracker: &ChangeTracker,
        applied: &[Change],
        sink: &OutputSink,
    ) {
        sink.publish("\nRolling back changes...\n").await;

        let report = tracker.rollback(applied);
        if !report.is_clean() {
            warn!(failures = report.failures.len(), "Rollback left failures");
            sink.publish(format!("Warning: rollback incomplete: {report}\n")).await;
        }

        if let Some(git) = self.tools.get("git")
            && let Err(e) = git.execute(serde_json::json!({"operation": "reset"})).await
        {
            sink.publish(format!("Warning: Failed to reset git changes: {e}\n")).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use oxpilot_core::error::ToolError;
    use oxpilot_core::provider::{CompletionRequest, Provider};
    use oxpilot_core::tool::Tool;
    use oxpilot_tools::FilesystemTool;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Pops a scripted response per request; streams deliver it whole.
    struct ScriptedProvider {
        responses: Mutex<VecDeque<String>>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<&str>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into_iter().map(String::from).collect()),
            })
        }

        fn pop(&self) -> String {
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| "ok".into())
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<String, ProviderError> {
            Ok(self.pop())
        }

        async fn stream(
            &self,
            _request: CompletionRequest,
        ) -> Result<mpsc::Receiver<Result<String, ProviderError>>, ProviderError> {
            let response = self.pop();
            let (tx, rx) = mpsc::channel(4);
            tokio::spawn(async move {
                let _ = tx.send(Ok(response)).await;
            });
            Ok(rx)
        }
    }

    /// Records invocations and answers with a fixed string.
    struct StubTool {
        name: &'static str,
        response: String,
        calls: Mutex<Vec<serde_json::Value>>,
    }

    impl StubTool {
        fn new(name: &'static str, response: &str) -> Self {
            Self {
                name,
                response: response.into(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Tool for StubTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "stub"
        }
        async fn execute(&self, args: serde_json::Value) -> Result<String, ToolError> {
            self.calls.lock().unwrap().push(args);
            Ok(self.response.clone())
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        workspace: std::path::PathBuf,
        engine: DecisionEngine,
        tracker: ChangeTracker,
        client: LlmClient,
        rx: mpsc::Receiver<String>,
        sink: OutputSink,
    }

    fn harness(responses: Vec<&str>) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let workspace = dir.path().to_path_buf();

        let mut registry = ToolRegistry::new();
        registry.register(Box::new(FilesystemTool::new(&workspace)));
        registry.register(Box::new(StubTool::new("git", "No changes detected")));
        registry.register(Box::new(StubTool::new("linter", "No issues found")));
        registry.register(Box::new(StubTool::new("grep_search", "No matches found")));

        let engine = DecisionEngine::new(Arc::new(registry));
        let tracker = ChangeTracker::new(&workspace);
        let client =
            LlmClient::with_provider(ScriptedProvider::new(responses), "test-model", 0.7, 2048);

        let (tx, rx) = mpsc::channel(1024);
        let sink = OutputSink::new(tx, CancellationToken::new());

        Harness {
            _dir: dir,
            workspace,
            engine,
            tracker,
            client,
            rx,
            sink,
        }
    }

    fn drain(rx: &mut mpsc::Receiver<String>) -> String {
        let mut all = String::new();
        while let Ok(chunk) = rx.try_recv() {
            all.push_str(&chunk);
        }
        all
    }

    #[tokio::test]
    async fn initial_decision_parses_scripted_response() {
        let h = harness(vec![
            "Phase: context\nAction: inspect the parser\nReasoning: need to see current state\nContext: src/lib.rs\nTools: N/A\nChanges: N/A\n",
        ]);

        let decision = h
            .engine
            .initial_decision(&h.client, "improve the parser")
            .await
            .unwrap();
        assert_eq!(decision.phase, DecisionPhase::Context);
        assert_eq!(decision.action, "inspect the parser");
    }

    #[tokio::test]
    async fn invalid_decision_aborts_before_any_phase() {
        let h = harness(vec!["Phase: analysis\nReasoning: missing the action\n"]);

        let err = h
            .engine
            .initial_decision(&h.client, "do something")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Engine(EngineError::Validation(_))));
    }

    #[tokio::test]
    async fn phases_run_forward_from_starting_phase() {
        let mut h = harness(vec!["continuing", "continuing"]);

        let mut decision = Decision::empty();
        decision.phase = DecisionPhase::Modification;
        decision.action = "apply".into();
        decision.reasoning = "test".into();

        h.engine
            .run_phases(&mut h.client, &h.tracker, &decision, "prompt", &h.sink)
            .await
            .unwrap();

        let output = drain(&mut h.rx);
        assert!(output.contains("Making modifications..."));
        assert!(output.contains("Verifying changes..."));
        // Earlier phases must not run
        assert!(!output.contains("Starting analysis phase..."));
        assert!(!output.contains("Gathering context..."));
    }

    #[tokio::test]
    async fn modification_writes_generated_content_and_records_backup() {
        let mut h = harness(vec![
            "// rewritten by the model\nfn fixed() {}\n", // content generation
            "continuing",                                 // modification follow-up
            "continuing",                                 // verification follow-up
        ]);
        std::fs::write(h.workspace.join("target.rs"), "fn broken() {}\n").unwrap();

        let mut decision = Decision::empty();
        decision.phase = DecisionPhase::Modification;
        decision.action = "fix".into();
        decision.reasoning = "broken fn".into();
        decision.changes = vec![Change::new("target.rs", "fix the function")];

        let applied = h
            .engine
            .run_phases(&mut h.client, &h.tracker, &decision, "prompt", &h.sink)
            .await
            .unwrap();

        assert_eq!(applied.len(), 1);
        let backup = applied[0].backup_path.as_ref().unwrap();
        assert!(backup.exists());
        assert_eq!(
            std::fs::read_to_string(backup).unwrap(),
            "fn broken() {}\n"
        );
        assert_eq!(
            std::fs::read_to_string(h.workspace.join("target.rs")).unwrap(),
            "// rewritten by the model\nfn fixed() {}\n"
        );
    }

    #[tokio::test]
    async fn backup_failure_rolls_back_applied_changes() {
        let mut h = harness(vec![
            "new content for existing file", // generation for the first change
        ]);
        std::fs::write(h.workspace.join("exists.rs"), "original\n").unwrap();

        let mut decision = Decision::empty();
        decision.phase = DecisionPhase::Modification;
        decision.action = "apply".into();
        decision.reasoning = "test".into();
        decision.changes = vec![
            Change::new("exists.rs", "edit it"),
            Change::new("missing.rs", "cannot be backed up"),
        ];

        let err = h
            .engine
            .run_phases(&mut h.client, &h.tracker, &decision, "prompt", &h.sink)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Engine(EngineError::Backup { .. })));

        // The first change was applied, then restored
        assert_eq!(
            std::fs::read_to_string(h.workspace.join("exists.rs")).unwrap(),
            "original\n"
        );
        let output = drain(&mut h.rx);
        assert!(output.contains("Rolling back changes..."));
    }

    #[tokio::test]
    async fn tool_call_fragments_become_tool_results() {
        let mut h = harness(vec![r#"{"tool":"git","args":{"operation":"diff"}}"#]);

        let mut decision = Decision::empty();
        decision.phase = DecisionPhase::Verification;
        decision.action = "verify".into();
        decision.reasoning = "check".into();

        h.engine
            .run_phases(&mut h.client, &h.tracker, &decision, "prompt", &h.sink)
            .await
            .unwrap();

        let output = drain(&mut h.rx);
        assert!(output.contains("Tool result: No changes detected"));
        assert!(!output.contains(r#"{"tool":"git""#));
    }

    #[tokio::test]
    async fn cancelled_sink_stops_quietly() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(StubTool::new("git", "")));
        let engine = DecisionEngine::new(Arc::new(registry));
        let tracker = ChangeTracker::new(dir.path());
        let mut client =
            LlmClient::with_provider(ScriptedProvider::new(vec![]), "test-model", 0.7, 2048);

        let (tx, mut rx) = mpsc::channel(1024);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let sink = OutputSink::new(tx, cancel);

        let mut decision = Decision::empty();
        decision.phase = DecisionPhase::Analysis;
        decision.action = "a".into();
        decision.reasoning = "r".into();

        let applied = engine
            .run_phases(&mut client, &tracker, &decision, "prompt", &sink)
            .await
            .unwrap();
        assert!(applied.is_empty());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn conversation_updated_after_each_phase_exchange() {
        let mut h = harness(vec!["verification response"]);

        let mut decision = Decision::empty();
        decision.phase = DecisionPhase::Verification;
        decision.action = "verify".into();
        decision.reasoning = "check".into();

        h.engine
            .run_phases(&mut h.client, &h.tracker, &decision, "user prompt", &h.sink)
            .await
            .unwrap();

        let snapshot = h.client.conversation().snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].content, "user prompt");
        assert_eq!(snapshot[1].content, "verification response");
    }
}

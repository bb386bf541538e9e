//! Decision, change, and task-state domain types.
//!
//! A `Decision` is the structured interpretation of a model response: which
//! phase to run, what to do, and which files it intends to touch. `Change` and
//! `TaskState` record what actually happened so the operator can accept or
//! roll back each task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The four fixed phases a task passes through, in total order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionPhase {
    Analysis,
    Context,
    Modification,
    Verification,
}

impl DecisionPhase {
    /// All phases in execution order.
    pub const ALL: [DecisionPhase; 4] = [
        DecisionPhase::Analysis,
        DecisionPhase::Context,
        DecisionPhase::Modification,
        DecisionPhase::Verification,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionPhase::Analysis => "analysis",
            DecisionPhase::Context => "context",
            DecisionPhase::Modification => "modification",
            DecisionPhase::Verification => "verification",
        }
    }
}

impl std::fmt::Display for DecisionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DecisionPhase {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "analysis" => Ok(DecisionPhase::Analysis),
            "context" => Ok(DecisionPhase::Context),
            "modification" => Ok(DecisionPhase::Modification),
            "verification" => Ok(DecisionPhase::Verification),
            _ => Err(()),
        }
    }
}

/// Status of a single file change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    Modified,
    Added,
    Deleted,
}

/// A record of one proposed or applied file mutation.
///
/// Invariant: no write to `file_path` may happen before `backup_path` is
/// populated by the change tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Change {
    pub file_path: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub backup_path: Option<PathBuf>,
    pub status: ChangeStatus,
}

impl Change {
    pub fn new(file_path: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            description: description.into(),
            timestamp: Utc::now(),
            backup_path: None,
            status: ChangeStatus::Modified,
        }
    }

    pub fn with_status(mut self, status: ChangeStatus) -> Self {
        self.status = status;
        self
    }
}

/// A model decision about how to handle a prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    /// The phase to start execution from.
    pub phase: DecisionPhase,
    /// What to do. Mandatory.
    pub action: String,
    /// Why. Mandatory.
    pub reasoning: String,
    /// Paths whose content is needed as context.
    pub context: Vec<String>,
    /// Tool names (or search patterns) the decision calls for.
    pub tools: Vec<String>,
    /// Proposed file changes.
    pub changes: Vec<Change>,
}

impl Decision {
    /// An empty decision defaulting to the analysis phase.
    pub fn empty() -> Self {
        Self {
            phase: DecisionPhase::Analysis,
            action: String::new(),
            reasoning: String::new(),
            context: Vec::new(),
            tools: Vec::new(),
            changes: Vec::new(),
        }
    }
}

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    InProgress,
    Completed,
    Failed,
    Rejected,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The state of one task inside an agent session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskState {
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    pub changes: Vec<Change>,
}

impl TaskState {
    pub fn started(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            start_time: Utc::now(),
            end_time: None,
            status: TaskStatus::InProgress,
            changes: Vec::new(),
        }
    }

    /// Close the task with a final status.
    pub fn finish(&mut self, status: TaskStatus) {
        self.status = status;
        self.end_time = Some(Utc::now());
    }
}

/// The state of a goal-directed agent session.
///
/// Created when agent mode starts and destroyed when the session ends.
/// `current_task` is rotated into `completed_tasks` once per loop iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub goal: String,
    pub current_task: Option<TaskState>,
    pub completed_tasks: Vec<TaskState>,
    pub start_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl AgentState {
    pub fn new(goal: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            goal: goal.into(),
            current_task: None,
            completed_tasks: Vec::new(),
            start_time: now,
            last_activity: now,
        }
    }

    /// Finish the current task (if any) and move it to the completed list,
    /// then install `next` as the new current task.
    ///
    /// A task already carrying a final status (rejected, failed) keeps it;
    /// `status` only applies to tasks still in progress.
    pub fn rotate_task(&mut self, status: TaskStatus, next: Option<TaskState>) {
        if let Some(mut task) = self.current_task.take() {
            if task.status == TaskStatus::InProgress {
                task.finish(status);
            } else if task.end_time.is_none() {
                task.end_time = Some(Utc::now());
            }
            self.completed_tasks.push(task);
        }
        self.current_task = next;
        self.last_activity = Utc::now();
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }
}

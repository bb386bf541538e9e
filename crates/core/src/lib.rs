//! # oxpilot Core
//!
//! Domain types, traits, and error definitions for the oxpilot coding
//! assistant. This crate has **zero framework dependencies** — it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every subsystem is defined as a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod decision;
pub mod error;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use decision::{AgentState, Change, ChangeStatus, Decision, DecisionPhase, TaskState, TaskStatus};
pub use error::{EngineError, Error, ProviderError, Result, ToolError, TrackerError};
pub use message::{Conversation, Message, Role, MAX_HISTORY};
pub use provider::{CompletionRequest, Provider};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolSummary};

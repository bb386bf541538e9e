//! Session actor and agent loop.
//!
//! A [`Session`] owns all mutable per-session state (conversation, agent
//! state) behind one reader/writer lock and runs each prompt on a single
//! background worker that publishes into an ordered result stream. The
//! [`AgentLoop`] drives goal-directed sessions task by task, blocking on one
//! operator command per iteration.

pub mod agent_loop;
pub mod session;

pub use agent_loop::{AgentCommand, AgentLoop, Operator};
pub use session::Session;

//! Message and Conversation domain types.
//!
//! These are the value objects that flow through the whole system:
//! the user prompts, the conversation history sent to the provider, and the
//! assistant responses appended back in.

use serde::{Deserialize, Serialize};

/// Maximum number of messages kept in a conversation.
///
/// Once exceeded, the oldest entries are evicted first (FIFO). This bounds
/// prompt size regardless of session length.
pub const MAX_HISTORY: usize = 10;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions (phase protocol, workspace context)
    System,
    /// The end user
    User,
    /// The AI assistant
    Assistant,
}

/// A single message in a conversation. Serializes to the exact wire shape
/// expected by the chat-completion endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A bounded, ordered conversation history.
///
/// Invariants:
/// - at most [`MAX_HISTORY`] entries; eviction drops oldest-first
/// - at most one system message: [`Conversation::add_system_message`] purges
///   every prior system entry before appending the new one
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message, evicting the oldest entries once the cap is exceeded.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
        if self.messages.len() > MAX_HISTORY {
            let excess = self.messages.len() - MAX_HISTORY;
            self.messages.drain(..excess);
        }
    }

    /// Append a user/assistant exchange pair.
    pub fn push_exchange(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.push(Message::user(user));
        self.push(Message::assistant(assistant));
    }

    /// Install a system message, replacing any previous one.
    ///
    /// All existing system entries are removed first, so the conversation
    /// never carries two competing instruction sets.
    pub fn add_system_message(&mut self, content: impl Into<String>) {
        self.messages.retain(|m| m.role != Role::System);
        self.push(Message::system(content));
    }

    /// Clear all history.
    pub fn reset(&mut self) {
        self.messages.clear();
    }

    /// The ordered message sequence.
    pub fn snapshot(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = Message::user("Hello, agent!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello, agent!");
    }

    #[test]
    fn message_serialization_roundtrip() {
        let msg = Message::assistant("Test message");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""role":"assistant""#));
        let deserialized: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, msg);
    }

    #[test]
    fn push_evicts_oldest_beyond_cap() {
        let mut conv = Conversation::new();
        for i in 0..15 {
            conv.push(Message::user(format!("message {i}")));
        }
        assert_eq!(conv.len(), MAX_HISTORY);
        // The survivors are the last 10, in original order
        let contents: Vec<_> = conv.snapshot().iter().map(|m| m.content.as_str()).collect();
        let expected: Vec<String> = (5..15).map(|i| format!("message {i}")).collect();
        assert_eq!(contents, expected.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[test]
    fn system_message_purges_predecessors() {
        let mut conv = Conversation::new();
        conv.push(Message::user("hi"));
        for i in 0..4 {
            conv.add_system_message(format!("instructions v{i}"));
        }
        let system_entries: Vec<_> = conv
            .snapshot()
            .iter()
            .filter(|m| m.role == Role::System)
            .collect();
        assert_eq!(system_entries.len(), 1);
        assert_eq!(system_entries[0].content, "instructions v3");
        // The user message is untouched
        assert!(conv.snapshot().iter().any(|m| m.role == Role::User));
    }

    #[test]
    fn exchange_pushes_pair_in_order() {
        let mut conv = Conversation::new();
        conv.push_exchange("question", "answer");
        assert_eq!(conv.len(), 2);
        assert_eq!(conv.snapshot()[0].role, Role::User);
        assert_eq!(conv.snapshot()[1].role, Role::Assistant);
    }

    #[test]
    fn reset_clears_everything() {
        let mut conv = Conversation::new();
        conv.add_system_message("rules");
        conv.push_exchange("a", "b");
        conv.reset();
        assert!(conv.is_empty());
    }
}

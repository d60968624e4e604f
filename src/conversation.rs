//! The conversation store.
//!
//! A [`Conversation`] is the only state that survives from one turn to the
//! next.  It always starts with exactly one system message and only ever
//! grows.

use crate::types::{Message, MessageRole};

/// System prompt used when none is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Ordered, append-only sequence of role-tagged messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    /// Creates a conversation seeded with the given system prompt.
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
        }
    }

    /// Appends a user message.
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content));
    }

    /// Appends an assistant message.
    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(Message::assistant(content));
    }

    /// All messages, oldest first.  This is exactly what gets sent to the model.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The number of messages, including the system message.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Always false: the system message is never removed.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The system prompt that seeded this conversation.
    pub fn system_prompt(&self) -> &str {
        &self.messages[0].content
    }

    /// The most recent message.
    pub fn last(&self) -> &Message {
        // The seed message guarantees at least one element.
        &self.messages[self.messages.len() - 1]
    }

    /// Number of completed user/assistant turns.
    pub fn turns(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.role == MessageRole::Assistant)
            .count()
    }

    /// True when the last message is a user message still waiting for a reply.
    pub fn awaiting_reply(&self) -> bool {
        self.last().role == MessageRole::User
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_PROMPT)
    }
}

use serde::Serialize;

use crate::types::Message;

/// Body of a chat-completion request.
///
/// The message list is borrowed so a request can be built straight from the
/// conversation without cloning it.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatRequest<'a> {
    /// Identifier of the model that should answer.
    pub model: &'a str,

    /// The full conversation, oldest message first.
    pub messages: &'a [Message],

    /// Whether the endpoint should stream the reply.
    pub stream: bool,
}

impl<'a> ChatRequest<'a> {
    /// Create a non-streaming request.
    pub fn new(model: &'a str, messages: &'a [Message]) -> Self {
        Self {
            model,
            messages,
            stream: false,
        }
    }

    /// Returns a copy of this request with streaming switched on or off.
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }
}

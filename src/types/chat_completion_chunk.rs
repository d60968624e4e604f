use serde::Deserialize;

use crate::types::MessageRole;

/// One server-sent chunk of a streaming chat completion.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ChatCompletionChunk {
    /// Identifier shared by every chunk of one response.
    #[serde(default)]
    pub id: Option<String>,

    /// Incremental choices carried by this chunk.
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

/// One incremental choice in a [`ChatCompletionChunk`].
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ChunkChoice {
    /// Position of this choice in the response.
    #[serde(default)]
    pub index: u32,

    /// The new text for this choice.
    #[serde(default)]
    pub delta: Delta,

    /// Set on the final chunk of a choice.
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// The incremental part of a streamed message.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Delta {
    /// Present on the first chunk only.
    #[serde(default)]
    pub role: Option<MessageRole>,

    /// Newly generated text, if any.
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatCompletionChunk {
    /// Returns the text fragment of the first choice, if the chunk carries one.
    pub fn fragment(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.delta.content.as_deref())
    }
}

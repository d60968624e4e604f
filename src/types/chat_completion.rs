use serde::Deserialize;

use crate::types::MessageRole;

/// A complete (non-streaming) chat-completion response.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ChatCompletion {
    /// Identifier assigned by the endpoint.
    #[serde(default)]
    pub id: Option<String>,

    /// The model that produced the answer.
    #[serde(default)]
    pub model: Option<String>,

    /// Candidate answers; termgpt only ever asks for one.
    pub choices: Vec<Choice>,
}

/// One candidate answer in a [`ChatCompletion`].
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Choice {
    /// Position of this choice in the response.
    #[serde(default)]
    pub index: u32,

    /// The generated message.
    pub message: ChoiceMessage,

    /// Why generation stopped.
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// The message inside a [`Choice`]; content may be null for refusals.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ChoiceMessage {
    /// Always `assistant` in practice.
    pub role: MessageRole,

    /// The generated text.
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatCompletion {
    /// Returns the text of the first choice, or the empty string.
    pub fn text(&self) -> &str {
        self.choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .unwrap_or("")
    }
}

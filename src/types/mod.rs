// Public modules
pub mod chat_completion;
pub mod chat_completion_chunk;
pub mod chat_request;
pub mod message;

// Re-exports
pub use chat_completion::{ChatCompletion, Choice, ChoiceMessage};
pub use chat_completion_chunk::{ChatCompletionChunk, ChunkChoice, Delta};
pub use chat_request::ChatRequest;
pub use message::{Message, MessageRole};

//! A terminal chat client for OpenAI-compatible chat-completion endpoints.

// Public modules
pub mod chat;
pub mod client;
pub mod conversation;
pub mod error;
pub mod expand;
pub mod highlight;
pub mod interrupt;
pub mod progress;
pub mod render;
pub mod segment;
pub mod sse;
pub mod types;

// Re-exports
pub use client::{
    API_KEY_ENV, CompletionClient, DEFAULT_API_URL, FragmentStream, OpenAi, Reply, ResponseMode,
};
pub use conversation::{Conversation, DEFAULT_SYSTEM_PROMPT};
pub use error::{Error, Result};
pub use expand::{Expansion, InputExpander};
pub use highlight::{Highlighted, Highlighter, TokenCategory};
pub use interrupt::Interrupt;
pub use progress::ProgressIndicator;
pub use render::{RenderEvent, RenderStatus, Renderer, ResponseRenderer, TerminalRenderer};
pub use segment::{CodeBlock, Segment, Segmentation, reassemble, segment};
pub use types::*;

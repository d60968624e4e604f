//! Interactive chat on top of the completion client.
//!
//! - [`config`]: CLI argument parsing, the YAML config file, and resolved
//!   settings
//! - [`input`]: line sources and multi-line accumulation
//! - [`commands`]: exit directives and slash commands
//! - [`session`]: one conversation and the turn pipeline
//! - [`repl`]: the loop controller

mod commands;
mod config;
mod input;
mod repl;
mod session;

pub use commands::{ChatCommand, UserInput, classify, help_text, is_exit_directive, parse_command};
pub use config::{ChatArgs, ChatConfig, ConfigFile, DEFAULT_MODEL, HISTORY_FILE_NAME};
pub use input::{
    CONTINUATION_PROMPT, InputEvent, InputSource, LineAccumulator, MessageReader, PROMPT,
    RustylineInput, ScriptedInput, Submission,
};
pub use repl::{ChatLoop, ExitReason, FAREWELL, LoopState};
pub use session::{ChatSession, SessionStats, TurnOutcome};

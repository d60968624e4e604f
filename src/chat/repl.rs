//! The read-expand-request-render loop.

use std::fmt;
use std::fs;

use crate::chat::commands::{ChatCommand, UserInput, classify, help_text};
use crate::chat::input::{InputSource, MessageReader, Submission};
use crate::chat::session::{ChatSession, TurnOutcome};
use crate::client::CompletionClient;
use crate::render::Renderer;

/// Notice printed when the loop ends.
pub const FAREWELL: &str = "Exiting...";

/// Where the loop is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    AwaitingInput,
    Expanding,
    Requesting,
    Rendering,
    Exiting(ExitReason),
}

/// Why the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// `quit`, `exit`, or `/quit`.
    Directive,
    /// Input ran out, or a one-shot prompt was answered.
    EndOfInput,
    /// Ctrl-C at the prompt or during a request.
    Interrupted,
    /// The endpoint rate limited us.
    RateLimited,
    /// The terminal could not be read.
    InputError,
}

impl ExitReason {
    /// Process exit status for this reason.
    pub fn exit_code(self) -> i32 {
        match self {
            ExitReason::Directive | ExitReason::EndOfInput | ExitReason::Interrupted => 0,
            ExitReason::RateLimited | ExitReason::InputError => 1,
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            ExitReason::Directive => "exit directive",
            ExitReason::EndOfInput => "end of input",
            ExitReason::Interrupted => "interrupted",
            ExitReason::RateLimited => "rate limited",
            ExitReason::InputError => "input error",
        };
        f.write_str(reason)
    }
}

/// Drives a [`ChatSession`] from an input source until an exit condition.
pub struct ChatLoop<C: CompletionClient, R: Renderer> {
    session: ChatSession<C>,
    renderer: R,
    reader: MessageReader,
    state: LoopState,
}

impl<C: CompletionClient, R: Renderer> ChatLoop<C, R> {
    pub fn new(session: ChatSession<C>, renderer: R) -> Self {
        let config = session.config();
        let reader = MessageReader::new(config.multiline, config.use_color);
        Self {
            session,
            renderer,
            reader,
            state: LoopState::AwaitingInput,
        }
    }

    pub fn session(&self) -> &ChatSession<C> {
        &self.session
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Runs the interactive loop.
    pub async fn run(&mut self, input: &mut dyn InputSource) -> ExitReason {
        loop {
            self.state = LoopState::AwaitingInput;
            self.session.interrupt().reset();
            let submission = match self.reader.read(input) {
                Ok(submission) => submission,
                Err(err) => {
                    self.renderer.print_error(&err.to_string());
                    return self.exit(ExitReason::InputError);
                }
            };
            let text = match submission {
                Submission::Text(text) => text,
                Submission::Exit => return self.exit(ExitReason::Directive),
                Submission::EndOfInput => return self.exit(ExitReason::EndOfInput),
                Submission::Interrupted => return self.exit(ExitReason::Interrupted),
            };
            if let Some(reason) = self.submit(&text).await {
                return self.exit(reason);
            }
        }
    }

    /// Answers a single prompt, then exits.
    pub async fn run_once(&mut self, prompt: &str) -> ExitReason {
        self.session.interrupt().reset();
        let reason = self.submit(prompt).await.unwrap_or(ExitReason::EndOfInput);
        self.exit(reason)
    }

    async fn submit(&mut self, text: &str) -> Option<ExitReason> {
        match classify(text) {
            UserInput::Empty => None,
            UserInput::Exit => Some(ExitReason::Directive),
            UserInput::Command(command) => self.command(command),
            UserInput::Message(message) => self.turn(&message).await,
        }
    }

    async fn turn(&mut self, message: &str) -> Option<ExitReason> {
        match self.session.run_turn(message, &mut self.renderer).await {
            TurnOutcome::Skipped | TurnOutcome::Answered(_) | TurnOutcome::Failed(_) => None,
            TurnOutcome::Interrupted => Some(ExitReason::Interrupted),
            TurnOutcome::RateLimited(err) => {
                let backoff = self.session.config().rate_limit_backoff;
                self.renderer.print_error(&format!(
                    "Rate limit reached: {err}. Waiting {} seconds before exiting.",
                    backoff.as_secs()
                ));
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = self.session.interrupt().triggered() => {
                        tracing::info!("backoff cut short by interrupt");
                    }
                }
                Some(ExitReason::RateLimited)
            }
        }
    }

    fn command(&mut self, command: ChatCommand) -> Option<ExitReason> {
        match command {
            ChatCommand::Quit => return Some(ExitReason::Directive),
            ChatCommand::Help => {
                for line in help_text().lines() {
                    self.renderer.print_info(&format!("    {line}"));
                }
            }
            ChatCommand::Model(model) => {
                self.renderer
                    .print_info(&format!("Model changed to: {model}"));
                self.session.set_model(model);
            }
            ChatCommand::Stream(stream) => {
                self.session.set_stream(stream);
                let mode = if stream { "on" } else { "off" };
                self.renderer.print_info(&format!("Streaming {mode}."));
            }
            ChatCommand::Stats => {
                let stats = self.session.stats();
                self.renderer.print_info(&format!("Model: {}", stats.model));
                self.renderer
                    .print_info(&format!("Messages: {}", stats.message_count));
                self.renderer.print_info(&format!("Turns: {}", stats.turns));
                self.renderer.print_info(&format!(
                    "Requests: {} ({} failed)",
                    stats.requests, stats.failures
                ));
                self.renderer.print_info(&format!(
                    "Streaming: {}",
                    if stats.streaming { "on" } else { "off" }
                ));
            }
            ChatCommand::Invalid(message) => self.renderer.print_error(&message),
        }
        None
    }

    fn exit(&mut self, reason: ExitReason) -> ExitReason {
        tracing::info!(%reason, "leaving chat loop");
        self.state = LoopState::Exiting(reason);
        self.renderer.print_info(FAREWELL);
        let config = self.session.config();
        if config.delete_history_on_exit {
            if let Some(path) = &config.history_path {
                match fs::remove_file(path) {
                    Ok(()) => tracing::debug!(path = %path.display(), "deleted history file"),
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                    Err(err) => {
                        tracing::warn!(path = %path.display(), error = %err, "cannot delete history file")
                    }
                }
            }
        }
        reason
    }
}

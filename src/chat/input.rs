//! Reading user messages, one line or one paragraph at a time.
//!
//! An [`InputSource`] produces raw lines.  [`MessageReader`] feeds them
//! through a [`LineAccumulator`] to produce whole submissions.  In
//! single-line mode every line is a submission; in multi-line mode lines
//! accumulate until a blank line, end of input, or an exit directive.

use std::io;
use std::path::{Path, PathBuf};

use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use crate::chat::commands::{is_exit_directive, parse_command};
use crate::error::{Error, Result};

/// Prompt shown before a new message.
pub const PROMPT: &str = "You: ";

/// Prompt shown for continuation lines in multi-line mode.
pub const CONTINUATION_PROMPT: &str = "...  ";

const ANSI_CYAN: &str = "\x1b[36m";
const ANSI_RESET: &str = "\x1b[0m";

/// One event from an input source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    /// A line of text without its terminator.
    Line(String),
    /// The user pressed Ctrl-C at the prompt.
    Interrupted,
    /// No more input.
    Eof,
}

/// A source of input lines.
pub trait InputSource {
    /// Reads one line, showing `prompt`.
    fn read_line(&mut self, prompt: &str) -> Result<InputEvent>;

    /// Records an accepted, non-blank line for later recall.
    fn record(&mut self, line: &str) {
        _ = line;
    }
}

/// A complete unit of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// Text to classify and possibly send; may be blank.
    Text(String),
    /// An exit directive.
    Exit,
    /// Ctrl-C at the prompt.
    Interrupted,
    /// Input is exhausted.
    EndOfInput,
}

/// Line-accumulation state machine.
#[derive(Debug, Clone, Default)]
pub struct LineAccumulator {
    multiline: bool,
    lines: Vec<String>,
    deferred: Option<Submission>,
}

impl LineAccumulator {
    pub fn new(multiline: bool) -> Self {
        Self {
            multiline,
            ..Self::default()
        }
    }

    /// True while a multi-line message is partly entered.
    pub fn is_pending(&self) -> bool {
        !self.lines.is_empty()
    }

    /// A submission owed from an earlier call, e.g. the exit that followed a
    /// flushed message.
    pub fn take_deferred(&mut self) -> Option<Submission> {
        self.deferred.take()
    }

    /// Feeds one line; returns a submission when one is complete.
    pub fn push(&mut self, line: &str) -> Option<Submission> {
        if is_exit_directive(line) {
            return Some(match self.flush() {
                Some(text) => {
                    self.deferred = Some(Submission::Exit);
                    Submission::Text(text)
                }
                None => Submission::Exit,
            });
        }
        if !self.multiline {
            return Some(Submission::Text(line.to_string()));
        }
        if line.trim().is_empty() {
            return Some(Submission::Text(self.flush().unwrap_or_default()));
        }
        if !self.is_pending() && parse_command(line).is_some() {
            return Some(Submission::Text(line.to_string()));
        }
        self.lines.push(line.to_string());
        None
    }

    /// Ends input; a pending message is submitted before end of input.
    pub fn finish(&mut self) -> Submission {
        match self.flush() {
            Some(text) => {
                self.deferred = Some(Submission::EndOfInput);
                Submission::Text(text)
            }
            None => Submission::EndOfInput,
        }
    }

    /// Drops any partly entered message.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    fn flush(&mut self) -> Option<String> {
        if self.lines.is_empty() {
            return None;
        }
        let text = self.lines.join("\n");
        self.lines.clear();
        Some(text)
    }
}

/// Reads whole submissions from an [`InputSource`].
#[derive(Debug, Clone)]
pub struct MessageReader {
    accumulator: LineAccumulator,
    prompt: String,
    continuation: String,
}

impl MessageReader {
    pub fn new(multiline: bool, use_color: bool) -> Self {
        let (prompt, continuation) = if use_color {
            (
                format!("{ANSI_CYAN}{PROMPT}{ANSI_RESET}"),
                format!("{ANSI_CYAN}{CONTINUATION_PROMPT}{ANSI_RESET}"),
            )
        } else {
            (PROMPT.to_string(), CONTINUATION_PROMPT.to_string())
        };
        Self {
            accumulator: LineAccumulator::new(multiline),
            prompt,
            continuation,
        }
    }

    /// Reads until a submission is complete.
    pub fn read(&mut self, source: &mut dyn InputSource) -> Result<Submission> {
        if let Some(submission) = self.accumulator.take_deferred() {
            return Ok(submission);
        }
        loop {
            let prompt = if self.accumulator.is_pending() {
                &self.continuation
            } else {
                &self.prompt
            };
            match source.read_line(prompt)? {
                InputEvent::Line(line) => {
                    if !line.trim().is_empty() {
                        source.record(&line);
                    }
                    if let Some(submission) = self.accumulator.push(&line) {
                        return Ok(submission);
                    }
                }
                InputEvent::Interrupted => {
                    self.accumulator.clear();
                    return Ok(Submission::Interrupted);
                }
                InputEvent::Eof => return Ok(self.accumulator.finish()),
            }
        }
    }
}

/// Interactive input with line editing and a persistent history file.
pub struct RustylineInput {
    editor: DefaultEditor,
    history_path: Option<PathBuf>,
}

impl RustylineInput {
    /// Creates an editor; when `history_path` is set, earlier entries are
    /// loaded for recall and every accepted line is appended to the file.
    pub fn new(history_path: Option<PathBuf>) -> Result<Self> {
        let mut editor = DefaultEditor::new().map_err(readline_error)?;
        if let Some(path) = &history_path {
            if path.exists() {
                if let Err(err) = editor.load_history(path) {
                    tracing::warn!(path = %path.display(), error = %err, "cannot load history");
                }
            }
        }
        Ok(Self {
            editor,
            history_path,
        })
    }

    pub fn history_path(&self) -> Option<&Path> {
        self.history_path.as_deref()
    }
}

impl InputSource for RustylineInput {
    fn read_line(&mut self, prompt: &str) -> Result<InputEvent> {
        match self.editor.readline(prompt) {
            Ok(line) => Ok(InputEvent::Line(line)),
            Err(ReadlineError::Interrupted) => Ok(InputEvent::Interrupted),
            Err(ReadlineError::Eof) => Ok(InputEvent::Eof),
            Err(err) => Err(readline_error(err)),
        }
    }

    fn record(&mut self, line: &str) {
        let _ = self.editor.add_history_entry(line);
        if let Some(path) = &self.history_path {
            if let Err(err) = self.editor.append_history(path) {
                tracing::warn!(path = %path.display(), error = %err, "cannot write history");
            }
        }
    }
}

/// Lines from memory, for one-shot runs and tests.
#[derive(Debug, Clone, Default)]
pub struct ScriptedInput {
    events: std::collections::VecDeque<InputEvent>,
    recorded: Vec<String>,
}

impl ScriptedInput {
    pub fn new(events: impl IntoIterator<Item = InputEvent>) -> Self {
        Self {
            events: events.into_iter().collect(),
            recorded: Vec::new(),
        }
    }

    /// Plain lines followed by end of input.
    pub fn from_lines<S: Into<String>>(lines: impl IntoIterator<Item = S>) -> Self {
        Self::new(lines.into_iter().map(|line| InputEvent::Line(line.into())))
    }

    /// Lines passed to [`InputSource::record`].
    pub fn recorded(&self) -> &[String] {
        &self.recorded
    }
}

impl InputSource for ScriptedInput {
    fn read_line(&mut self, _prompt: &str) -> Result<InputEvent> {
        Ok(self.events.pop_front().unwrap_or(InputEvent::Eof))
    }

    fn record(&mut self, line: &str) {
        self.recorded.push(line.to_string());
    }
}

fn readline_error(err: ReadlineError) -> Error {
    match err {
        ReadlineError::Io(e) => Error::io("terminal input failed", e),
        other => Error::io("terminal input failed", io::Error::other(other.to_string())),
    }
}

//! Output rendering for model replies.
//!
//! [`Renderer`] is the terminal-facing sink.  [`ResponseRenderer`] turns a
//! segmented reply into [`RenderEvent`]s and plays them into a renderer:
//! prose is typed out one character at a time, code blocks are highlighted
//! and printed whole.

use std::io::{self, Stdout, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::highlight::Highlighter;
use crate::segment::{CodeBlock, Segment};

/// ANSI escape code for bold text.
const ANSI_BOLD: &str = "\x1b[1m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for yellow text (used for the reply label and warnings).
const ANSI_YELLOW: &str = "\x1b[33m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// ANSI escape code for dim text (used for informational notices).
const ANSI_DIM: &str = "\x1b[2m";

/// Label printed before every reply.
pub const DEFAULT_LABEL: &str = "ChatGPT: ";

/// Delay between typed prose characters.
pub const DEFAULT_TYPING_DELAY: Duration = Duration::from_millis(5);

/// Trait for rendering chat output.
///
/// This abstraction allows for different rendering strategies:
/// - Plain text with ANSI styling
/// - Plain text without styling (for piping/redirecting)
/// - In-memory capture for tests
pub trait Renderer: Send {
    /// Print the label that introduces a reply.
    fn print_label(&mut self, label: &str);

    /// Print one character of prose.  Called once per animation step.
    fn print_prose_char(&mut self, ch: char);

    /// Print a whole, already styled, code block.
    fn print_code_block(&mut self, block: &str);

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Print a non-fatal warning.
    fn print_warning(&mut self, warning: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Called when a response is complete.
    ///
    /// Used to ensure proper newlines and cleanup after rendering.
    fn finish_response(&mut self);

    /// Called when rendering is interrupted by the user.
    fn print_interrupted(&mut self);

    /// Returns true if rendering should stop.
    fn should_interrupt(&self) -> bool {
        false
    }
}

/// Renderer writing to stdout (errors and warnings to stderr), with optional
/// ANSI styling.
pub struct TerminalRenderer {
    stdout: Stdout,
    use_color: bool,
    line_start: bool,
    interrupted: Option<Arc<AtomicBool>>,
}

impl TerminalRenderer {
    /// Creates a new TerminalRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new TerminalRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self {
            stdout: io::stdout(),
            use_color,
            line_start: true,
            interrupted: None,
        }
    }

    /// Polls `flag` before every animation step.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupted = Some(flag);
        self
    }

    /// Whether escape sequences are written.
    pub fn use_color(&self) -> bool {
        self.use_color
    }

    fn write(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let _ = self.stdout.write_all(text.as_bytes());
        let _ = self.stdout.flush();
        self.line_start = text.ends_with('\n');
    }

    fn styled(&self, style: &str, text: &str) -> String {
        if self.use_color {
            format!("{style}{text}{ANSI_RESET}")
        } else {
            text.to_string()
        }
    }

    fn break_line(&mut self) {
        if !self.line_start {
            self.write("\n");
        }
    }
}

impl Default for TerminalRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for TerminalRenderer {
    fn print_label(&mut self, label: &str) {
        self.break_line();
        let label = self.styled(&format!("{ANSI_BOLD}{ANSI_YELLOW}"), label);
        self.write(&format!("{label}\n"));
    }

    fn print_prose_char(&mut self, ch: char) {
        let mut buf = [0u8; 4];
        self.write(ch.encode_utf8(&mut buf));
    }

    fn print_code_block(&mut self, block: &str) {
        self.break_line();
        self.write(block);
        self.write("\n");
    }

    fn print_error(&mut self, error: &str) {
        self.break_line();
        eprintln!("{}", self.styled(ANSI_RED, error));
    }

    fn print_warning(&mut self, warning: &str) {
        self.break_line();
        eprintln!("{}", self.styled(ANSI_YELLOW, warning));
    }

    fn print_info(&mut self, info: &str) {
        self.break_line();
        let info = self.styled(ANSI_DIM, info);
        self.write(&format!("{info}\n"));
    }

    fn finish_response(&mut self) {
        if self.use_color {
            self.write(ANSI_RESET);
        }
        self.break_line();
    }

    fn print_interrupted(&mut self) {
        if self.use_color {
            self.write(ANSI_RESET);
        }
        self.break_line();
        self.write("[interrupted]\n");
    }

    fn should_interrupt(&self) -> bool {
        self.interrupted
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

/// One step of reply output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderEvent {
    /// The reply label.
    Label(String),
    /// One animated prose character.
    Char(char),
    /// A whole code block, already styled.
    Block(String),
}

/// How a reply's rendering ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStatus {
    /// Every event was written.
    Completed,
    /// The user interrupted the animation.
    Interrupted,
}

/// Plays segmented replies into a [`Renderer`].
pub struct ResponseRenderer {
    highlighter: Highlighter,
    label: String,
    typing_delay: Duration,
}

impl ResponseRenderer {
    pub fn new(highlighter: Highlighter) -> Self {
        Self {
            highlighter,
            label: DEFAULT_LABEL.to_string(),
            typing_delay: DEFAULT_TYPING_DELAY,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// A zero delay prints prose without pausing.
    pub fn with_typing_delay(mut self, typing_delay: Duration) -> Self {
        self.typing_delay = typing_delay;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn typing_delay(&self) -> Duration {
        self.typing_delay
    }

    /// The events that make up the rendering of `segments`, in order.
    pub fn events(&self, segments: &[Segment]) -> Vec<RenderEvent> {
        let mut events = vec![RenderEvent::Label(self.label.clone())];
        for segment in segments {
            match segment {
                Segment::Prose(prose) => {
                    let prose = prose.trim();
                    if prose.is_empty() {
                        continue;
                    }
                    events.extend(prose.chars().map(RenderEvent::Char));
                    events.push(RenderEvent::Char('\n'));
                }
                Segment::Code(block) => {
                    if let Some(styled) = self.code_block(block) {
                        events.push(RenderEvent::Block(styled));
                    }
                }
            }
        }
        events
    }

    /// Writes `segments` to `out`, stopping early if `out` asks to be
    /// interrupted.
    pub async fn render(&self, segments: &[Segment], out: &mut dyn Renderer) -> RenderStatus {
        for event in self.events(segments) {
            if out.should_interrupt() {
                out.print_interrupted();
                return RenderStatus::Interrupted;
            }
            match event {
                RenderEvent::Label(label) => out.print_label(&label),
                RenderEvent::Block(block) => out.print_code_block(&block),
                RenderEvent::Char(ch) => {
                    out.print_prose_char(ch);
                    if !self.typing_delay.is_zero() {
                        tokio::time::sleep(self.typing_delay).await;
                    }
                }
            }
        }
        out.finish_response();
        RenderStatus::Completed
    }

    fn code_block(&self, block: &CodeBlock) -> Option<String> {
        let code = trim_code(&block.body);
        if code.is_empty() {
            return None;
        }
        let highlighted = self.highlighter.highlight_or_plain(code, block.language());
        tracing::trace!(syntax = ?highlighted.syntax, "highlighted code block");
        Some(highlighted.text)
    }
}

/// Drops leading blank lines and trailing whitespace; indentation of the
/// first code line is kept.
fn trim_code(body: &str) -> &str {
    let body = body.trim_end();
    let mut start = 0;
    for line in body.split_inclusive('\n') {
        if !line.trim().is_empty() {
            break;
        }
        start += line.len();
    }
    &body[start..]
}

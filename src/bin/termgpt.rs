//! Chat with an OpenAI-compatible model from the terminal.
//!
//! # Usage
//!
//! ```bash
//! # Interactive chat
//! termgpt
//!
//! # One question, then exit; words naming files are inlined
//! termgpt explain main.rs
//! termgpt --prompt "What does this do? script.sh"
//!
//! # Pick a model, wait for whole replies, and skip the typing effect
//! termgpt --model gpt-4o --no-stream --no-animation
//! ```
//!
//! Type `quit` or `exit` (or press Ctrl-C) to leave.  `TERMGPT_LOG=debug`
//! writes diagnostics to stderr.

use std::io::{self, IsTerminal};
use std::process::ExitCode;

use arrrg::CommandLine;
use tracing_subscriber::EnvFilter;

use termgpt::chat::{ChatArgs, ChatConfig, ChatLoop, ChatSession, RustylineInput};
use termgpt::{Interrupt, OpenAi, TerminalRenderer};

const ANSI_BOLD_RED: &str = "\x1b[1;31m";
const ANSI_RESET: &str = "\x1b[0m";

#[tokio::main]
async fn main() -> ExitCode {
    let filter =
        EnvFilter::try_from_env("TERMGPT_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let (args, free) = ChatArgs::from_command_line_relaxed("termgpt [OPTIONS] [PROMPT ...]");
    let mut config = match ChatConfig::from_args(&args) {
        Ok(config) => config,
        Err(err) => return fail(&err.to_string(), io::stderr().is_terminal()),
    };
    if !io::stdout().is_terminal() {
        config = config.for_plain_output();
    }
    let prompt = args.initial_prompt(&free);

    let client = match OpenAi::with_options(None, config.base_url.clone(), Some(config.timeout)) {
        Ok(client) => client,
        Err(err) => return fail(&err.to_string(), config.use_color),
    };

    let interrupt = Interrupt::new();
    if let Err(err) = interrupt.install_ctrlc_handler() {
        tracing::warn!(error = %err, "cannot install Ctrl-C handler");
    }

    let renderer = TerminalRenderer::with_color(config.use_color).with_interrupt(interrupt.flag());
    let history_path = config.history_path.clone();
    let use_color = config.use_color;
    let session = ChatSession::new(client, config).with_interrupt(interrupt);
    let mut chat = ChatLoop::new(session, renderer);

    let reason = match prompt {
        Some(prompt) => chat.run_once(&prompt).await,
        None => {
            let mut input = match RustylineInput::new(history_path) {
                Ok(input) => input,
                Err(err) => return fail(&err.to_string(), use_color),
            };
            chat.run(&mut input).await
        }
    };
    ExitCode::from(reason.exit_code() as u8)
}

fn fail(message: &str, use_color: bool) -> ExitCode {
    if use_color {
        eprintln!("{ANSI_BOLD_RED}Error:{ANSI_RESET} {message}");
    } else {
        eprintln!("Error: {message}");
    }
    ExitCode::FAILURE
}

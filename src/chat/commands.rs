//! In-band directives and slash commands.
//!
//! A line of user input is either an exit directive (`quit`/`exit`), a slash
//! command that controls the session locally, or a message for the model.
//! Nothing recognized here is ever sent to the endpoint.

/// A parsed chat command.
///
/// These commands control the chat session and are not sent to the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Change the model.
    Model(String),

    /// Switch streaming on or off.
    Stream(bool),

    /// Display help information.
    Help,

    /// Exit the chat application.
    Quit,

    /// Display session statistics (message count, current model, etc.).
    Stats,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// What a line of user input asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserInput {
    /// Nothing but whitespace.
    Empty,
    /// A bare `quit` or `exit`.
    Exit,
    /// A slash command.
    Command(ChatCommand),
    /// Text for the model, untrimmed.
    Message(String),
}

/// True for the bare exit words, ignoring case and surrounding whitespace.
pub fn is_exit_directive(input: &str) -> bool {
    let input = input.trim();
    input.eq_ignore_ascii_case("quit") || input.eq_ignore_ascii_case("exit")
}

/// Classifies one submitted input.
pub fn classify(input: &str) -> UserInput {
    if input.trim().is_empty() {
        UserInput::Empty
    } else if is_exit_directive(input) {
        UserInput::Exit
    } else if let Some(command) = parse_command(input) {
        UserInput::Command(command)
    } else {
        UserInput::Message(input.to_string())
    }
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a valid command,
/// or `None` if it should be treated as a regular message.
///
/// # Examples
///
/// ```
/// # use termgpt::chat::parse_command;
/// assert!(parse_command("/quit").is_some());
/// assert!(parse_command("/model gpt-4o").is_some());
/// assert!(parse_command("Hello there!").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();

    let rest = input.strip_prefix('/')?;
    // A path such as "/etc/hosts.conf" is a message, not a command.
    let mut parts = rest.splitn(2, char::is_whitespace);
    let command = parts.next()?.to_lowercase();
    if command.is_empty() || command.contains('/') {
        return None;
    }
    let argument = parts.next().map(|s| s.trim()).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "model" => match argument {
            Some(model) => ChatCommand::Model(model.to_string()),
            None => ChatCommand::Invalid("/model requires a model name".to_string()),
        },
        "stream" => match argument.and_then(parse_on_off) {
            Some(value) => ChatCommand::Stream(value),
            None => ChatCommand::Invalid("/stream expects 'on' or 'off'".to_string()),
        },
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        "stats" | "status" => ChatCommand::Stats,
        _ => ChatCommand::Invalid(format!("Unknown command: /{command}")),
    };

    Some(result)
}

fn parse_on_off(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "on" | "true" | "yes" => Some(true),
        "off" | "false" | "no" => Some(false),
        _ => None,
    }
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /model <name>          Change the model (e.g., /model gpt-4o)
  /stream on|off         Stream replies or wait for the whole answer
  /stats                 Show session statistics
  /help                  Show this help message
  /quit                  Exit the chat (so do 'quit' and 'exit')

Any word that names a readable file (e.g. notes.txt) is replaced by the
file's contents before the message is sent."#
}

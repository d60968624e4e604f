//! Configuration types for the chat application.
//!
//! Settings are layered: built-in defaults, then the YAML config file, then
//! command-line arguments parsed via `arrrg`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use arrrg_derive::CommandLine;
use serde::Deserialize;

use crate::conversation::DEFAULT_SYSTEM_PROMPT;
use crate::error::{Error, Result};
use crate::render::{DEFAULT_LABEL, DEFAULT_TYPING_DELAY};

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-4";

/// Name of the line-history file in the home directory.
pub const HISTORY_FILE_NAME: &str = ".chatgpt_terminal_history";

const DEFAULT_RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(20);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Command-line arguments for the termgpt tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Send a single prompt and exit.
    #[arrrg(optional, "Send this prompt, print the reply, and exit", "TEXT")]
    pub prompt: Option<String>,

    /// Model to use for chat.
    #[arrrg(optional, "Model to use (default: gpt-4)", "MODEL")]
    pub model: Option<String>,

    /// System prompt to set context for the conversation.
    #[arrrg(optional, "System prompt for the conversation", "PROMPT")]
    pub system: Option<String>,

    /// API root of an OpenAI-compatible endpoint.
    #[arrrg(optional, "API base URL (default: https://api.openai.com/v1/)", "URL")]
    pub base_url: Option<String>,

    /// YAML file with default settings.
    #[arrrg(optional, "YAML config file", "PATH")]
    pub config: Option<String>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,

    /// Wait for whole replies instead of streaming them.
    #[arrrg(flag, "Disable streaming")]
    pub no_stream: bool,

    /// Print prose at once instead of typing it out.
    #[arrrg(flag, "Disable the typing animation")]
    pub no_animation: bool,

    /// A message ends at a blank line instead of at every line.
    #[arrrg(flag, "Multi-line input; submit with an empty line")]
    pub multiline: bool,

    /// Do not read or write the history file.
    #[arrrg(flag, "Disable the line history file")]
    pub no_history: bool,

    /// Delete the history file when the program exits.
    #[arrrg(flag, "Delete the line history file on exit")]
    pub forget_history: bool,
}

impl ChatArgs {
    /// The one-shot prompt: `--prompt`, or else the positional words joined
    /// by spaces.
    pub fn initial_prompt(&self, free: &[String]) -> Option<String> {
        if let Some(prompt) = &self.prompt {
            return Some(prompt.clone());
        }
        if free.is_empty() {
            None
        } else {
            Some(free.join(" "))
        }
    }
}

/// Settings read from a YAML config file.  Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub model: Option<String>,
    pub system: Option<String>,
    pub base_url: Option<String>,
    pub stream: Option<bool>,
    pub color: Option<bool>,
    pub typing_delay_ms: Option<u64>,
    pub progress: Option<bool>,
    pub rate_limit_backoff_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub history_file: Option<PathBuf>,
    pub forget_history: Option<bool>,
    pub multiline: Option<bool>,
    pub label: Option<String>,
}

impl ConfigFile {
    /// Parses a config file from YAML text.
    pub fn parse(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Reads and parses the config file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let yaml = fs::read_to_string(path)
            .map_err(|e| Error::io(format!("cannot read config file {}", path.display()), e))?;
        Self::parse(&yaml).map_err(|e| {
            Error::validation(
                format!("invalid config file {}: {e}", path.display()),
                None,
            )
        })
    }

    /// `$XDG_CONFIG_HOME/termgpt/config.yaml` or the platform equivalent.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("termgpt").join("config.yaml"))
    }
}

/// Configuration for a chat session.
///
/// This struct holds the resolved configuration values after processing
/// the config file and command-line arguments with appropriate defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    /// The model to use for generating responses.
    pub model: String,

    /// The system message that seeds the conversation.
    pub system_prompt: String,

    /// API root; `None` uses the client's default.
    pub base_url: Option<String>,

    /// Whether replies are streamed.
    pub stream: bool,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,

    /// Pause between typed prose characters.
    pub typing_delay: Duration,

    /// Whether the waiting indicator is shown.
    pub show_progress: bool,

    /// How long to wait after a rate-limit response before exiting.
    pub rate_limit_backoff: Duration,

    /// Request timeout.
    pub timeout: Duration,

    /// Line-history file; `None` disables history.
    pub history_path: Option<PathBuf>,

    /// Delete the history file when the program exits.
    pub delete_history_on_exit: bool,

    /// Accumulate lines until a blank line.
    pub multiline: bool,

    /// Label printed before every reply.
    pub label: String,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    ///
    /// Defaults:
    /// - Model: gpt-4
    /// - Streaming: enabled
    /// - Color: enabled
    /// - History: `~/.chatgpt_terminal_history`, kept on exit
    /// - Rate-limit backoff: 20 seconds
    pub fn new() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            base_url: None,
            stream: true,
            use_color: true,
            typing_delay: DEFAULT_TYPING_DELAY,
            show_progress: true,
            rate_limit_backoff: DEFAULT_RATE_LIMIT_BACKOFF,
            timeout: DEFAULT_TIMEOUT,
            history_path: dirs::home_dir().map(|home| home.join(HISTORY_FILE_NAME)),
            delete_history_on_exit: false,
            multiline: false,
            label: DEFAULT_LABEL.to_string(),
        }
    }

    /// Resolves the full configuration from command-line arguments.
    ///
    /// An explicit `--config` file must exist; the default config file is
    /// read only when present.
    pub fn from_args(args: &ChatArgs) -> Result<Self> {
        let file = match &args.config {
            Some(path) => Some(ConfigFile::load(Path::new(path))?),
            None => match ConfigFile::default_path() {
                Some(path) if path.is_file() => {
                    tracing::debug!(path = %path.display(), "loading default config file");
                    Some(ConfigFile::load(&path)?)
                }
                _ => None,
            },
        };
        let config = match file {
            Some(file) => Self::new().apply_file(file),
            None => Self::new(),
        };
        Ok(config.apply_args(args))
    }

    /// Overrides every setting the file specifies.
    pub fn apply_file(mut self, file: ConfigFile) -> Self {
        if let Some(model) = file.model {
            self.model = model;
        }
        if let Some(system) = file.system {
            self.system_prompt = system;
        }
        if file.base_url.is_some() {
            self.base_url = file.base_url;
        }
        if let Some(stream) = file.stream {
            self.stream = stream;
        }
        if let Some(color) = file.color {
            self.use_color = color;
        }
        if let Some(ms) = file.typing_delay_ms {
            self.typing_delay = Duration::from_millis(ms);
        }
        if let Some(progress) = file.progress {
            self.show_progress = progress;
        }
        if let Some(secs) = file.rate_limit_backoff_secs {
            self.rate_limit_backoff = Duration::from_secs(secs);
        }
        if let Some(secs) = file.timeout_secs {
            self.timeout = Duration::from_secs(secs);
        }
        if file.history_file.is_some() {
            self.history_path = file.history_file;
        }
        if let Some(forget) = file.forget_history {
            self.delete_history_on_exit = forget;
        }
        if let Some(multiline) = file.multiline {
            self.multiline = multiline;
        }
        if let Some(label) = file.label {
            self.label = label;
        }
        self
    }

    /// Overrides every setting given on the command line.
    pub fn apply_args(mut self, args: &ChatArgs) -> Self {
        if let Some(model) = &args.model {
            self.model = model.clone();
        }
        if let Some(system) = &args.system {
            self.system_prompt = system.clone();
        }
        if args.base_url.is_some() {
            self.base_url = args.base_url.clone();
        }
        if args.no_color {
            self.use_color = false;
        }
        if args.no_stream {
            self.stream = false;
        }
        if args.no_animation {
            self.typing_delay = Duration::ZERO;
        }
        if args.multiline {
            self.multiline = true;
        }
        if args.no_history {
            self.history_path = None;
        }
        if args.forget_history {
            self.delete_history_on_exit = true;
        }
        self
    }

    /// Sets the model to use.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Enables or disables streaming.
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }

    /// Drops everything that writes escape sequences: color and the progress
    /// animation.  Used when stdout is not a terminal.
    pub fn for_plain_output(mut self) -> Self {
        self.use_color = false;
        self.show_progress = false;
        self
    }

    /// True when the progress animation may draw.  It needs escape
    /// sequences, so it is off whenever color is.
    pub fn progress_enabled(&self) -> bool {
        self.show_progress && self.use_color
    }

    /// Sets the typing delay.
    pub fn with_typing_delay(mut self, delay: Duration) -> Self {
        self.typing_delay = delay;
        self
    }

    /// Shows or hides the waiting indicator.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Sets the rate-limit backoff.
    pub fn with_rate_limit_backoff(mut self, backoff: Duration) -> Self {
        self.rate_limit_backoff = backoff;
        self
    }

    /// Sets the history file.
    pub fn with_history_path(mut self, path: Option<PathBuf>) -> Self {
        self.history_path = path;
        self
    }

    /// Sets whether the history file is deleted on exit.
    pub fn with_delete_history_on_exit(mut self, delete: bool) -> Self {
        self.delete_history_on_exit = delete;
        self
    }

    /// Sets multi-line input mode.
    pub fn with_multiline(mut self, multiline: bool) -> Self {
        self.multiline = multiline;
        self
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_output_disables_color_and_progress() {
        let config = ChatConfig::new().for_plain_output();
        assert!(!config.use_color);
        assert!(!config.show_progress);
        assert!(!config.progress_enabled());
        assert_eq!(config.model, DEFAULT_MODEL);
    }

    #[test]
    fn progress_follows_color() {
        assert!(ChatConfig::new().progress_enabled());
        assert!(!ChatConfig::new().without_color().progress_enabled());
        assert!(!ChatConfig::new().with_progress(false).progress_enabled());
    }

    #[test]
    fn default_config() {
        let config = ChatConfig::new();
        assert_eq!(config.model, "gpt-4");
        assert_eq!(config.system_prompt, "You are a helpful assistant.");
        assert!(config.stream);
        assert!(config.use_color);
        assert!(config.show_progress);
        assert_eq!(config.rate_limit_backoff, Duration::from_secs(20));
        assert_eq!(config.label, "ChatGPT: ");
        assert!(!config.delete_history_on_exit);
        assert!(!config.multiline);
        if let Some(path) = &config.history_path {
            assert!(path.ends_with(HISTORY_FILE_NAME));
        }
    }

    #[test]
    fn args_override_defaults() {
        let args = ChatArgs {
            model: Some("gpt-4o".to_string()),
            system: Some("Be terse.".to_string()),
            no_color: true,
            no_stream: true,
            no_animation: true,
            no_history: true,
            ..ChatArgs::default()
        };
        let config = ChatConfig::new().apply_args(&args);
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.system_prompt, "Be terse.");
        assert!(!config.use_color);
        assert!(!config.stream);
        assert_eq!(config.typing_delay, Duration::ZERO);
        assert!(config.history_path.is_none());
    }

    #[test]
    fn file_then_args_precedence() {
        let file = ConfigFile::parse(
            "model: gpt-3.5-turbo\nstream: false\ntyping_delay_ms: 0\nrate_limit_backoff_secs: 3\nlabel: 'AI: '\n",
        )
        .unwrap();
        let config = ChatConfig::new().apply_file(file);
        assert_eq!(config.model, "gpt-3.5-turbo");
        assert!(!config.stream);
        assert_eq!(config.rate_limit_backoff, Duration::from_secs(3));
        assert_eq!(config.label, "AI: ");

        let args = ChatArgs {
            model: Some("gpt-4o".to_string()),
            ..ChatArgs::default()
        };
        let config = config.apply_args(&args);
        assert_eq!(config.model, "gpt-4o");
        // Unset flags leave file settings alone.
        assert!(!config.stream);
        assert_eq!(config.typing_delay, Duration::ZERO);
    }

    #[test]
    fn config_file_rejects_unknown_keys() {
        assert!(ConfigFile::parse("modle: gpt-4\n").is_err());
        assert_eq!(ConfigFile::parse("").unwrap(), ConfigFile::default());
    }

    #[test]
    fn load_config_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("termgpt.yaml");
        fs::write(&path, "system: You answer in French.\nmultiline: true\n").unwrap();
        let args = ChatArgs {
            config: Some(path.display().to_string()),
            ..ChatArgs::default()
        };
        let config = ChatConfig::from_args(&args).unwrap();
        assert_eq!(config.system_prompt, "You answer in French.");
        assert!(config.multiline);

        let missing = ChatArgs {
            config: Some(dir.path().join("absent.yaml").display().to_string()),
            ..ChatArgs::default()
        };
        assert!(ChatConfig::from_args(&missing).is_err());
    }

    #[test]
    fn initial_prompt_sources() {
        let args = ChatArgs::default();
        assert_eq!(args.initial_prompt(&[]), None);
        assert_eq!(
            args.initial_prompt(&["summarize".to_string(), "notes.txt".to_string()]),
            Some("summarize notes.txt".to_string())
        );
        let args = ChatArgs {
            prompt: Some("hi".to_string()),
            ..ChatArgs::default()
        };
        assert_eq!(args.initial_prompt(&["ignored".to_string()]), Some("hi".to_string()));
    }

    #[test]
    fn config_builder_pattern() {
        let config = ChatConfig::new()
            .with_model("gpt-4o-mini")
            .with_system_prompt("Test prompt")
            .with_stream(false)
            .without_color()
            .with_typing_delay(Duration::from_millis(1))
            .with_progress(false)
            .with_rate_limit_backoff(Duration::from_secs(1))
            .with_history_path(Some(PathBuf::from("history.txt")))
            .with_delete_history_on_exit(true)
            .with_multiline(true);

        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.system_prompt, "Test prompt");
        assert!(!config.stream);
        assert!(!config.use_color);
        assert!(!config.show_progress);
        assert_eq!(config.history_path, Some(PathBuf::from("history.txt")));
        assert!(config.delete_history_on_exit);
        assert!(config.multiline);
    }
}

//! Inline expansion of file references in user input.
//!
//! Any whitespace-delimited word that looks like a file name with an
//! extension and names a readable regular file is replaced by that file's
//! contents, wrapped in markers naming the file.  The scan is a single pass
//! over the input; substituted contents are never scanned again.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::Error;

// A word with a file-extension suffix.
static FILE_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\S+\.\w+$").expect("file shape regex is valid"));

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\S+").expect("word regex is valid"));

const LEADING_PUNCTUATION: &[char] = &['(', '[', '"', '\'', '<', '`'];
const TRAILING_PUNCTUATION: &[char] = &[',', ';', ':', '!', '?', ')', ']', '"', '\'', '>', '.', '`'];

/// The outcome of expanding one input.
#[derive(Debug, Clone, Default)]
pub struct Expansion {
    /// The input with every readable file reference substituted.
    pub text: String,
    /// Files whose contents were inlined, in order of appearance.
    pub files: Vec<PathBuf>,
    /// Files that matched but could not be read.  Their tokens are left as-is.
    pub warnings: Vec<Error>,
}

/// Replaces file references in user input with the files' contents.
#[derive(Debug, Clone)]
pub struct InputExpander {
    base_dir: PathBuf,
}

impl InputExpander {
    /// Resolves relative paths against `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Resolves relative paths against the process's working directory.
    pub fn from_current_dir() -> Self {
        Self::new(".")
    }

    /// The directory relative paths are resolved against.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Expands every file reference in `raw`.
    pub fn expand(&self, raw: &str) -> Expansion {
        let mut expansion = Expansion {
            text: String::with_capacity(raw.len()),
            ..Expansion::default()
        };
        let mut cursor = 0;

        for word in WORD.find_iter(raw) {
            let unquoted = word.as_str().trim_start_matches(LEADING_PUNCTUATION);
            let token = unquoted.trim_end_matches(TRAILING_PUNCTUATION);
            if token.is_empty() || !FILE_SHAPE.is_match(token) {
                continue;
            }
            let path = self.base_dir.join(token);
            if !path.is_file() {
                continue;
            }
            let contents = match fs::read_to_string(&path) {
                Ok(contents) => contents,
                Err(err) => {
                    tracing::debug!(path = %path.display(), error = %err, "cannot expand file reference");
                    expansion.warnings.push(Error::file_expansion(token, &path, err));
                    continue;
                }
            };
            let start = word.start() + (word.as_str().len() - unquoted.len());
            let end = start + token.len();
            expansion.text.push_str(&raw[cursor..start]);
            expansion.text.push_str(&file_block(token, &contents));
            cursor = end;
            tracing::debug!(path = %path.display(), bytes = contents.len(), "expanded file reference");
            expansion.files.push(path);
        }

        expansion.text.push_str(&raw[cursor..]);
        expansion
    }
}

impl Default for InputExpander {
    fn default() -> Self {
        Self::from_current_dir()
    }
}

/// The marked-up replacement for a file reference.
pub fn file_block(name: &str, contents: &str) -> String {
    let newline = if contents.ends_with('\n') { "" } else { "\n" };
    format!("\n[File {name}]\n{contents}{newline}[End of file {name}]\n")
}

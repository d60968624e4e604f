//! Syntax highlighting for fenced code blocks.
//!
//! Grammars come from syntect's bundled syntax definitions.  Rather than a
//! syntect colour theme, every token is classified into a [`TokenCategory`]
//! by its scope and painted with the fixed [`Palette`], so the output only
//! uses the basic ANSI attributes every terminal understands.

use syntect::easy::ScopeRangeIterator;
use syntect::parsing::{ParseState, Scope, ScopeStack, SyntaxReference, SyntaxSet};
use syntect::util::LinesWithEndings;

use crate::error::{Error, Result};

const ANSI_RESET: &str = "\x1b[0m";

/// Lexical category of a highlighted token.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TokenCategory {
    /// Language keywords and storage modifiers.
    Keyword,
    /// String and character literals.
    String,
    /// Numeric literals.
    Number,
    /// Comments, including their delimiters.
    Comment,
    /// Builtin functions, types and language constants.
    Builtin,
    /// Names of functions at definition or call sites.
    Function,
    /// Names of classes, structs and other types being defined.
    Class,
    /// Decorators and annotations.
    Decorator,
    /// Variables and parameters.
    Variable,
    /// Operators.
    Operator,
    /// Everything else.
    Plain,
}

/// Fixed mapping from token category to terminal style.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Palette;

impl Palette {
    /// The escape sequence that starts a token of the given category.
    ///
    /// `Plain` selects the terminal's default foreground, so plain tokens never
    /// inherit a neighbour's color.
    pub const fn style(&self, category: TokenCategory) -> &'static str {
        match category {
            TokenCategory::Keyword => "\x1b[1;32m",
            TokenCategory::String => "\x1b[33m",
            TokenCategory::Number => "\x1b[34m",
            TokenCategory::Comment => "\x1b[2;3m",
            TokenCategory::Builtin => "\x1b[36m",
            TokenCategory::Function => "\x1b[94m",
            TokenCategory::Class => "\x1b[1;4;94m",
            TokenCategory::Decorator => "\x1b[93m",
            TokenCategory::Variable => "\x1b[96m",
            TokenCategory::Operator => "\x1b[37m",
            TokenCategory::Plain => "\x1b[39m",
        }
    }
}

// Categories that apply to everything nested inside them, whatever the inner
// scope says.
const ENCLOSING_RULES: &[(&str, TokenCategory)] = &[
    ("comment", TokenCategory::Comment),
    ("string", TokenCategory::String),
    ("meta.annotation", TokenCategory::Decorator),
    ("meta.decorator", TokenCategory::Decorator),
    ("entity.name.function.decorator", TokenCategory::Decorator),
    ("punctuation.definition.annotation", TokenCategory::Decorator),
    ("storage.type.annotation", TokenCategory::Decorator),
];

// Checked from the innermost scope outwards; first match wins.
const SCOPE_RULES: &[(&str, TokenCategory)] = &[
    ("constant.numeric", TokenCategory::Number),
    ("keyword.operator", TokenCategory::Operator),
    ("keyword", TokenCategory::Keyword),
    ("storage", TokenCategory::Keyword),
    ("support.function", TokenCategory::Builtin),
    ("support.type", TokenCategory::Builtin),
    ("support.class", TokenCategory::Builtin),
    ("support.constant", TokenCategory::Builtin),
    ("variable.language", TokenCategory::Builtin),
    ("constant.language", TokenCategory::Builtin),
    ("entity.name.function", TokenCategory::Function),
    ("variable.function", TokenCategory::Function),
    ("entity.name.class", TokenCategory::Class),
    ("entity.name.struct", TokenCategory::Class),
    ("entity.name.enum", TokenCategory::Class),
    ("entity.name.type", TokenCategory::Class),
    ("entity.other.inherited-class", TokenCategory::Class),
    ("variable", TokenCategory::Variable),
];

// Info-string spellings that syntect does not know by name or extension.
const LANGUAGE_ALIASES: &[(&str, &str)] = &[
    ("python3", "py"),
    ("py3", "py"),
    ("shell", "sh"),
    ("zsh", "sh"),
    ("console", "sh"),
    ("terminal", "sh"),
    ("shell-session", "sh"),
    ("typescript", "js"),
    ("ts", "js"),
    ("tsx", "js"),
    ("jsx", "js"),
    ("node", "js"),
    ("c++", "cpp"),
    ("golang", "go"),
    ("yml", "yaml"),
    ("csharp", "cs"),
    ("c#", "cs"),
    ("plaintext", "txt"),
    ("text", "txt"),
];

// Content markers used to guess a grammar for untagged blocks.
const GUESS_MARKERS: &[(&str, &[&str])] = &[
    (
        "rs",
        &["fn main", "pub fn ", "let mut ", "impl ", "println!", "use std::", "&mut "],
    ),
    (
        "py",
        &["def ", "elif ", "self.", "print(", "__init__", "import numpy", "from "],
    ),
    (
        "js",
        &["function ", "const ", "=> ", "console.log", "===", "require(", "export "],
    ),
    ("go", &["package main", "func ", ":= ", "fmt."]),
    (
        "java",
        &["public class", "public static void", "System.out", "import java"],
    ),
    (
        "cpp",
        &["#include <iostream>", "std::", "cout <<", "template <", "namespace "],
    ),
    ("c", &["#include", "printf(", "int main", "malloc("]),
    (
        "sql",
        &["SELECT ", "INSERT INTO", "CREATE TABLE", "UPDATE ", "WHERE "],
    ),
    ("html", &["<!DOCTYPE", "<html", "<div", "<body"]),
    (
        "sh",
        &["echo ", "sudo ", "export ", "apt ", "cd ", "mkdir ", "fi\n", "done\n"],
    ),
];

/// A highlighted code block ready to print.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Highlighted {
    /// The text, with escape sequences when colour is on.
    pub text: String,
    /// Name of the grammar that was used, if any.
    pub syntax: Option<String>,
}

/// Grammar selection and token colouring for code blocks.
pub struct Highlighter {
    syntaxes: SyntaxSet,
    palette: Palette,
    use_color: bool,
}

impl Highlighter {
    /// Creates a highlighter with the bundled grammars and colour enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a highlighter; with `use_color` false every block is plain.
    pub fn with_color(use_color: bool) -> Self {
        Self {
            syntaxes: SyntaxSet::load_defaults_newlines(),
            palette: Palette,
            use_color,
        }
    }

    /// Looks up a grammar by a declared info-string tag.
    pub fn syntax_for_tag(&self, tag: &str) -> Option<&SyntaxReference> {
        let tag = tag.trim();
        if tag.is_empty() {
            return None;
        }
        // Info strings may carry attributes after the language, e.g. "rust,ignore".
        let name = tag
            .split(|c: char| c.is_whitespace() || c == ',' || c == '{')
            .next()
            .unwrap_or(tag)
            .to_lowercase();
        self.syntaxes.find_syntax_by_token(&name).or_else(|| {
            LANGUAGE_ALIASES
                .iter()
                .find(|(alias, _)| *alias == name)
                .and_then(|(_, token)| self.syntaxes.find_syntax_by_token(token))
        })
    }

    /// Guesses a grammar from the code itself.
    pub fn guess_syntax(&self, code: &str) -> Option<&SyntaxReference> {
        if let Some(syntax) = self.syntaxes.find_syntax_by_first_line(code) {
            return Some(syntax);
        }
        guess_language(code).and_then(|token| self.syntaxes.find_syntax_by_token(token))
    }

    /// The declared grammar when it is recognized, otherwise a guess.
    pub fn resolve(&self, language: Option<&str>, code: &str) -> Option<&SyntaxReference> {
        language
            .and_then(|tag| self.syntax_for_tag(tag))
            .or_else(|| self.guess_syntax(code))
    }

    /// Splits `code` into categorized tokens using `syntax`.
    pub fn categorize(
        &self,
        code: &str,
        syntax: &SyntaxReference,
    ) -> Result<Vec<(TokenCategory, String)>> {
        let mut state = ParseState::new(syntax);
        let mut stack = ScopeStack::new();
        let mut tokens: Vec<(TokenCategory, String)> = Vec::new();
        for line in LinesWithEndings::from(code) {
            let ops = state
                .parse_line(line, &self.syntaxes)
                .map_err(|e| Error::highlighting(format!("{} parser: {e}", syntax.name)))?;
            for (range, op) in ScopeRangeIterator::new(&ops, line) {
                let text = &line[range];
                stack
                    .apply(op)
                    .map_err(|e| Error::highlighting(format!("{} scopes: {e:?}", syntax.name)))?;
                if text.is_empty() {
                    continue;
                }
                let category = categorize_scopes(stack.as_slice());
                match tokens.last_mut() {
                    Some((last, buffered)) if *last == category => buffered.push_str(text),
                    _ => tokens.push((category, text.to_string())),
                }
            }
        }
        Ok(tokens)
    }

    /// Highlights `code`, failing when no grammar can be found or parsing fails.
    pub fn highlight(&self, code: &str, language: Option<&str>) -> Result<Highlighted> {
        let syntax = self.resolve(language, code).ok_or_else(|| {
            Error::highlighting(match language {
                Some(tag) => format!("unknown language {tag:?} and no grammar matches the code"),
                None => "no grammar matches the code".to_string(),
            })
        })?;
        let name = Some(syntax.name.clone());
        if !self.use_color {
            return Ok(Highlighted {
                text: code.to_string(),
                syntax: name,
            });
        }
        let tokens = self.categorize(code, syntax)?;
        Ok(Highlighted {
            text: self.paint(&tokens),
            syntax: name,
        })
    }

    /// Like [`Highlighter::highlight`], but falls back to the unstyled code.
    pub fn highlight_or_plain(&self, code: &str, language: Option<&str>) -> Highlighted {
        match self.highlight(code, language) {
            Ok(highlighted) => highlighted,
            Err(err) => {
                tracing::debug!(error = %err, "printing code block without highlighting");
                Highlighted {
                    text: code.to_string(),
                    syntax: None,
                }
            }
        }
    }

    fn paint(&self, tokens: &[(TokenCategory, String)]) -> String {
        let mut out = String::new();
        for (category, text) in tokens {
            let style = self.palette.style(*category);
            if style.is_empty() || text.trim().is_empty() {
                out.push_str(text);
                continue;
            }
            // Keep escapes off line breaks so a reset never lands on the next line.
            for (idx, line) in text.split('\n').enumerate() {
                if idx > 0 {
                    out.push('\n');
                }
                if !line.is_empty() {
                    out.push_str(style);
                    out.push_str(line);
                    out.push_str(ANSI_RESET);
                }
            }
        }
        out
    }
}

impl Default for Highlighter {
    fn default() -> Self {
        Self::new()
    }
}

fn scope_matches(scope: &str, prefix: &str) -> bool {
    scope == prefix
        || (scope.starts_with(prefix) && scope.as_bytes().get(prefix.len()) == Some(&b'.'))
}

fn categorize_scopes(scopes: &[Scope]) -> TokenCategory {
    let names: Vec<String> = scopes.iter().map(|scope| scope.build_string()).collect();
    for name in &names {
        for (prefix, category) in ENCLOSING_RULES {
            if scope_matches(name, prefix) {
                return *category;
            }
        }
    }
    for name in names.iter().rev() {
        for (prefix, category) in SCOPE_RULES {
            if scope_matches(name, prefix) {
                return *category;
            }
        }
    }
    TokenCategory::Plain
}

/// Picks the language whose markers occur most often in `code`.
pub fn guess_language(code: &str) -> Option<&'static str> {
    let mut best: Option<(&'static str, usize)> = None;
    for (token, markers) in GUESS_MARKERS {
        let score = markers.iter().filter(|m| code.contains(*m)).count();
        if score > 0 && best.is_none_or(|(_, top)| score > top) {
            best = Some((*token, score));
        }
    }
    best.map(|(token, _)| token)
}

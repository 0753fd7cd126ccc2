//! Structured user-facing messages.
//!
//! A `UserMessage` is assembled with chained `with_*` calls and rendered once
//! into a multi-section report:
//!
//! ```text
//! ✘ error: unknown command - bogus
//!  --> command-option:1
//!   | :bogus
//!  reason: ...
//!  • note
//!  = help: ...
//! ```

use owo_colors::{OwoColorize, Style};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ErrorKind, Result};

/// Prefix the query engine puts in front of an encoded `UserMessage` when a
/// statement fails with a structured error.
pub const ERROR_MARKER: &str = "logshell-error:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Ok,
    Info,
    Warning,
    Error,
}

impl Level {
    fn prefix(self) -> &'static str {
        match self {
            Level::Ok => "✔ ",
            Level::Info => "ⓘ info: ",
            Level::Warning => "⚠ warning: ",
            Level::Error => "✘ error: ",
        }
    }

    fn style(self) -> Style {
        match self {
            Level::Ok => Style::new().green().bold(),
            Level::Info => Style::new().cyan().bold(),
            Level::Warning => Style::new().yellow().bold(),
            Level::Error => Style::new().red().bold(),
        }
    }
}

/// Where a statement came from: source name, position and the text itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snippet {
    pub source: String,
    #[serde(default)]
    pub line: i32,
    #[serde(default)]
    pub column: i32,
    #[serde(default)]
    pub content: String,
}

impl Snippet {
    pub fn new(source: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            line: 0,
            column: 0,
            content: content.into(),
        }
    }

    pub fn with_line(mut self, line: i32) -> Self {
        self.line = line;
        self
    }

    pub fn with_column(mut self, column: i32) -> Self {
        self.column = column;
        self
    }

    /// `source:line`, with `:column` appended when a column is known.
    pub fn location(&self) -> String {
        if self.column > 0 {
            format!("{}:{}:{}", self.source, self.line, self.column)
        } else {
            format!("{}:{}", self.source, self.line)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    /// Emit the level prefix (`✘ error: `, ...) before the message.
    pub prefix: bool,
    /// Use ANSI styling.
    pub color: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            prefix: true,
            color: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMessage {
    pub level: Level,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub snippets: Vec<Snippet>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub help: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

impl UserMessage {
    fn with_level(level: Level, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            snippets: Vec::new(),
            reason: String::new(),
            notes: Vec::new(),
            help: String::new(),
            kind: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::with_level(Level::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::with_level(Level::Warning, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::with_level(Level::Info, message)
    }

    pub fn ok(message: impl Into<String>) -> Self {
        Self::with_level(Level::Ok, message)
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into().trim_end().to_string();
        self
    }

    pub fn with_snippet(mut self, snippet: Snippet) -> Self {
        self.snippets.push(snippet);
        self
    }

    pub fn with_snippets(mut self, snippets: impl IntoIterator<Item = Snippet>) -> Self {
        self.snippets.extend(snippets);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = help.into().trim_end().to_string();
        self
    }

    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == Level::Error
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Encoded form carried through the query engine's error channel.
    pub fn to_wire(&self) -> Result<String> {
        Ok(format!("{}{}", ERROR_MARKER, self.to_json()?))
    }

    pub fn render(&self, opts: RenderOptions) -> String {
        let paint = |text: &str, style: Style| -> String {
            if opts.color {
                text.style(style).to_string()
            } else {
                text.to_string()
            }
        };
        let gutter = Style::new().blue().bold();
        let mut out = String::new();

        if opts.prefix {
            out.push_str(&paint(self.level.prefix(), self.level.style()));
        }
        out.push_str(&self.message);

        for snippet in &self.snippets {
            out.push('\n');
            out.push_str(&paint(" --> ", gutter));
            out.push_str(&snippet.location());
            for line in snippet.content.lines() {
                out.push('\n');
                out.push_str(&paint("  | ", gutter));
                out.push_str(line);
            }
        }

        if !self.reason.is_empty() {
            out.push('\n');
            out.push_str(&paint(" reason: ", Style::new().bold()));
            push_indented(&mut out, &self.reason, "         ");
        }

        for note in &self.notes {
            out.push('\n');
            out.push_str(&paint(" • ", gutter));
            push_indented(&mut out, note, "   ");
        }

        if !self.help.is_empty() {
            out.push('\n');
            out.push_str(&paint(" = help: ", Style::new().cyan().bold()));
            push_indented(&mut out, &self.help, "   ");
        }

        out
    }
}

fn push_indented(out: &mut String, text: &str, indent: &str) {
    for (idx, line) in text.lines().enumerate() {
        if idx > 0 {
            out.push('\n');
            out.push_str(indent);
        }
        out.push_str(line);
    }
}

impl fmt::Display for UserMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(RenderOptions::default()))
    }
}

impl std::error::Error for UserMessage {}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> UserMessage {
        UserMessage::error("unknown command - bogus")
            .with_snippet(Snippet::new("startup.lsh", ":bogus").with_line(3))
            .with_reason("no handler is registered under that name  \n")
            .with_note("commands are case-sensitive")
            .with_help("Synopsis\n  :help [command]")
            .with_kind(ErrorKind::UnknownCommand)
    }

    #[test]
    fn test_render_plain() {
        let rendered = sample().render(RenderOptions::default());
        insta::assert_snapshot!(rendered, @r"
        ✘ error: unknown command - bogus
         --> startup.lsh:3
          | :bogus
         reason: no handler is registered under that name
         • commands are case-sensitive
         = help: Synopsis
             :help [command]
        ");
    }

    #[test]
    fn test_render_omits_empty_sections() {
        let msg = UserMessage::info("No rows matched");
        assert_eq!(msg.render(RenderOptions::default()), "ⓘ info: No rows matched");

        let without_prefix = RenderOptions {
            prefix: false,
            color: false,
        };
        assert_eq!(msg.render(without_prefix), "No rows matched");
    }

    #[test]
    fn test_render_color_wraps_prefix() {
        let rendered = UserMessage::error("boom").render(RenderOptions {
            prefix: true,
            color: true,
        });
        assert!(rendered.contains("\u{1b}["));
        assert!(rendered.ends_with("boom"));
    }

    #[test]
    fn test_snippet_location_includes_column_when_known() {
        let snippet = Snippet::new("eval", ";SELECT 1").with_line(2).with_column(7);
        assert_eq!(snippet.location(), "eval:2:7");
        assert_eq!(Snippet::new("command", "").with_line(1).location(), "command:1");
    }

    #[test]
    fn test_builders_trim_reason_and_help() {
        let msg = sample();
        assert_eq!(msg.reason, "no handler is registered under that name");
        assert_eq!(msg.help, "Synopsis\n  :help [command]");
        assert_eq!(msg.notes.len(), 1);
        assert_eq!(msg.kind, Some(ErrorKind::UnknownCommand));
    }

    #[test]
    fn test_wire_form_decodes_back() {
        let msg = sample();
        let wire = msg.to_wire().unwrap();
        assert!(wire.starts_with(ERROR_MARKER));

        let decoded = UserMessage::from_json(&wire[ERROR_MARKER.len()..]).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_from_json_accepts_minimal_message() {
        let decoded =
            UserMessage::from_json(r#"{"level":"warning","message":"careful"}"#).unwrap();
        assert_eq!(decoded.level, Level::Warning);
        assert!(decoded.snippets.is_empty());
        assert!(decoded.kind.is_none());
    }
}

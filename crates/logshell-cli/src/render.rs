use crate::types::OutputFormat;
use is_terminal::IsTerminal;
use logshell_runtime::ResultSet;
use logshell_types::{RenderOptions, UserMessage};
use std::io::{self, Write};

/// Writes statement outcomes: successes to stdout, diagnostics to stderr.
pub struct Renderer {
    format: OutputFormat,
    color: bool,
}

impl Renderer {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            color: io::stderr().is_terminal(),
        }
    }

    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    pub fn message(&self, cmd: &str, msg: &str) -> io::Result<()> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        match self.format {
            OutputFormat::Plain if msg.is_empty() => Ok(()),
            OutputFormat::Plain => writeln!(out, "{}", msg),
            OutputFormat::Json => {
                let line = serde_json::json!({ "command": cmd, "result": msg });
                writeln!(out, "{}", line)
            }
        }
    }

    pub fn error(&self, cmd: &str, err: &UserMessage) -> io::Result<()> {
        match self.format {
            OutputFormat::Plain => {
                let stderr = io::stderr();
                let mut out = stderr.lock();
                writeln!(out, "{}", self.render_error(err))
            }
            OutputFormat::Json => {
                let line = serde_json::json!({ "command": cmd, "error": err });
                let stdout = io::stdout();
                writeln!(stdout.lock(), "{}", line)
            }
        }
    }

    pub fn render_error(&self, err: &UserMessage) -> String {
        err.render(RenderOptions {
            prefix: true,
            color: self.color,
        })
    }

    /// Tab-separated table with a header row; JSON mode emits the rows as
    /// one array.
    pub fn results(&self, results: &ResultSet) -> io::Result<()> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        if self.format == OutputFormat::Json {
            return writeln!(out, "{}", results.to_json());
        }

        let names: Vec<&str> = results.headers.iter().map(|h| h.name.as_str()).collect();
        writeln!(out, "{}", names.join("\t"))?;
        for row in &results.rows {
            let cells: Vec<&str> = row
                .iter()
                .map(|cell| cell.as_deref().unwrap_or("<NULL>"))
                .collect();
            writeln!(out, "{}", cells.join("\t"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logshell_types::{ErrorKind, Snippet};

    #[test]
    fn test_render_error_plain() {
        let renderer = Renderer::new(OutputFormat::Plain).with_color(false);
        let err = UserMessage::error("unknown command - bogus")
            .with_snippet(Snippet::new("command-option", ":bogus").with_line(1))
            .with_kind(ErrorKind::UnknownCommand);

        insta::assert_snapshot!(renderer.render_error(&err), @r"
        ✘ error: unknown command - bogus
         --> command-option:1
          | :bogus
        ");
    }
}

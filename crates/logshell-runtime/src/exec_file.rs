use crate::command::CommandResult;
use crate::context::{ContextStacks, VarScope};
use crate::dispatch::{Dispatcher, Mode};
use crate::script::{ScriptCandidate, ScriptSource};
use crate::vars::split_args;
use logshell_types::ErrorKind;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

const ANSI_COLORS: [&str; 8] = [
    "black", "red", "green", "yellow", "blue", "magenta", "cyan", "white",
];

/// Escape sequences scripts can use to style `:echo` output.
fn ansi_vars() -> VarScope {
    let mut vars = VarScope::new();
    vars.insert("ansi_csi".to_string(), "\x1b[".to_string());
    vars.insert("ansi_norm".to_string(), "\x1b[0m".to_string());
    vars.insert("ansi_bold".to_string(), "\x1b[1m".to_string());
    vars.insert("ansi_underline".to_string(), "\x1b[4m".to_string());
    vars.insert("ansi_reverse".to_string(), "\x1b[7m".to_string());
    for (idx, color) in ANSI_COLORS.iter().enumerate() {
        vars.insert(format!("ansi_{}", color), format!("\x1b[3{}m", idx));
    }
    vars
}

/// A statement waiting for its continuation lines.
struct Pending {
    mode: Mode,
    line_number: usize,
    text: String,
}

impl Dispatcher {
    /// Run a `|` invocation: resolve the script name and execute every
    /// candidate with the arguments bound as `$0..$N`, `$#` and `$__all__`.
    pub fn execute_file(&mut self, path_and_args: &str, multiline: bool) -> CommandResult {
        tracing::info!("executing file: {}", path_and_args);

        let args = split_args(path_and_args, |name| self.ctx.lookup_var(name)).map_err(|e| {
            self.ctx
                .make_error(ErrorKind::ParseFailure, "unable to parse path")
                .with_reason(e.to_string())
        })?;
        let Some(script_name) = args.first().cloned() else {
            return Err(self
                .ctx
                .make_error(ErrorKind::NoCommandGiven, "no script specified"));
        };

        let mut vars = ansi_vars();
        vars.insert("#".to_string(), (args.len() - 1).to_string());
        for (idx, arg) in args.iter().enumerate() {
            vars.insert(idx.to_string(), arg.clone());
        }
        vars.insert("__all__".to_string(), args[1..].join(" "));

        let mut this = self.enter_scope(vars);
        let candidates = this.scripts.resolve(&this.ctx, &script_name)?;

        let mut retval = String::new();
        for candidate in &candidates {
            retval = this.execute_candidate(candidate, multiline)?;
        }
        Ok(retval)
    }

    fn execute_candidate(&mut self, candidate: &ScriptCandidate, multiline: bool) -> CommandResult {
        let source = candidate.display_name();
        match &candidate.source {
            ScriptSource::Stdin => {
                let stdin = std::io::stdin();
                self.execute_reader(&source, PathBuf::from("."), stdin.lock(), multiline)
            }
            ScriptSource::File(path) => {
                let file = File::open(path).map_err(|e| {
                    self.ctx
                        .make_error(ErrorKind::ScriptNotFound, "unable to open file")
                        .with_reason(e.to_string())
                })?;
                let dir = path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .unwrap_or(Path::new("."))
                    .to_path_buf();
                self.execute_reader(&source, dir, BufReader::new(file), multiline)
            }
        }
    }

    /// Execute the statements read from `reader`. `dir` is pushed on the
    /// path stack and a fresh output frame is active until the end of input.
    ///
    /// Blank lines and `#` comments are skipped. A prefixed line starts a new
    /// statement; other lines continue the pending one when `multiline` is
    /// set and otherwise run on their own as commands. The first failure
    /// stops the file.
    pub fn execute_reader(
        &mut self,
        source: &str,
        dir: PathBuf,
        reader: impl BufRead,
        multiline: bool,
    ) -> CommandResult {
        tracing::info!("executing script: {}", source);

        let mut this = self.enter_path(dir);
        let mut this = this.enter_output("default", None);

        let mut pending: Option<Pending> = None;
        let mut retval = String::new();

        for (idx, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| {
                this.ctx
                    .make_error(ErrorKind::CommandFailed, format!("unable to read {}", source))
                    .with_reason(e.to_string())
            })?;
            let line_number = idx + 1;

            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }

            match line.chars().next().and_then(Mode::from_prefix) {
                Some(mode) => {
                    if let Some(stmt) = pending.take() {
                        retval = this.run_pending(source, stmt)?;
                    }
                    pending = Some(Pending {
                        mode,
                        line_number,
                        text: line[1..].to_string(),
                    });
                }
                None if multiline => match pending.as_mut() {
                    Some(stmt) => {
                        stmt.text.push('\n');
                        stmt.text.push_str(&line);
                    }
                    None => {
                        tracing::debug!("{}:{}: dropping line outside a statement", source, line_number);
                    }
                },
                None => {
                    this.check_interrupt()?;
                    retval = this.execute_statement(source, line_number, Mode::Command, line.trim())?;
                }
            }
        }

        if let Some(stmt) = pending.take() {
            retval = this.run_pending(source, stmt)?;
        }

        Ok(retval)
    }

    fn run_pending(&mut self, source: &str, stmt: Pending) -> CommandResult {
        self.check_interrupt()?;
        self.execute_statement(source, stmt.line_number, stmt.mode, stmt.text.trim())
    }

    fn check_interrupt(&self) -> Result<(), logshell_types::UserMessage> {
        if self.is_interrupted() {
            return Err(self.ctx.make_error(ErrorKind::Interrupted, "interrupted"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{dispatcher, dispatcher_with_log};
    use std::io::Cursor;
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    fn run(d: &mut Dispatcher, script: &str, multiline: bool) -> CommandResult {
        d.execute_reader("test.lsh", PathBuf::from("."), Cursor::new(script.to_string()), multiline)
    }

    #[test]
    fn test_statements_run_in_order() {
        let mut d = dispatcher();
        let out = run(&mut d, ":echo one\n\n# comment\n:echo two\n", true).unwrap();
        assert_eq!(out, "two");

        let dir = TempDir::new().unwrap();
        let trace = dir.path().join("trace.txt");
        let script = format!(
            ":redirect-to {}\n:echo one\n# comment\n\n:echo two\n",
            trace.display()
        );
        assert_eq!(run(&mut d, &script, true).unwrap(), "");
        assert_eq!(std::fs::read_to_string(&trace).unwrap(), "one\ntwo\n");
        assert_eq!(d.ctx().output_depth(), 1);
    }

    #[test]
    fn test_multiline_continuation() {
        let mut d = dispatcher();
        let out = run(&mut d, ";SELECT 1 AS a,\n  2 AS b\n", true).unwrap();
        assert_eq!(out, "a=1; b=2");

        let out = run(&mut d, ":echo one\n:echo two\nthree\n", true).unwrap();
        assert_eq!(out, "two\nthree");
    }

    #[test]
    fn test_unprefixed_line_runs_immediately_without_multiline() {
        let mut d = dispatcher();
        let script = ";SELECT ifnull($marker, 'unset') AS seen\neval ;SELECT 'set' AS marker\n";
        assert_eq!(run(&mut d, script, false).unwrap(), "set");
    }

    #[test]
    fn test_failure_stops_file_with_statement_provenance() {
        let mut d = dispatcher();
        let err = run(&mut d, ";SELECT 'x' AS first\n:bogus\n;SELECT 'y' AS second\n", true)
            .unwrap_err();

        assert_eq!(err.kind, Some(ErrorKind::UnknownCommand));
        assert_eq!(err.snippets[0].location(), "test.lsh:2");
        assert_eq!(err.snippets[0].content, ":bogus");
        assert_eq!(d.ctx().local_vars().get("first").map(String::as_str), Some("x"));
        assert!(d.ctx().local_vars().get("second").is_none());
        assert_eq!(d.ctx().source_depth(), 1);
        assert_eq!(d.ctx().path_depth(), 1);
        assert_eq!(d.ctx().output_depth(), 1);
    }

    #[test]
    fn test_interrupt_stops_between_statements() {
        let mut d = dispatcher();
        d.interrupt_flag().store(true, Ordering::SeqCst);
        let err = run(&mut d, ":echo one\n", true).unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::Interrupted));
        d.clear_interrupt();
        assert_eq!(run(&mut d, ":echo one\n", true).unwrap(), "one");
    }

    #[test]
    fn test_script_arguments_and_isolated_scope() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("args.lsh");
        std::fs::write(&script, ";SELECT 'inner' AS seen\n:echo $1/$#/$__all__\n").unwrap();

        let mut d = dispatcher();
        d.ctx_mut().set_local_var("caller", "kept");
        d.ctx_mut().set_global_var("who", "web 1");
        let out = d
            .execute_file(&format!("{} \"$who\" two", script.display()), true)
            .unwrap();

        assert_eq!(out, "web 1/2/web 1 two");
        assert_eq!(d.ctx().scope_depth(), 1);
        assert!(d.ctx().local_vars().get("seen").is_none());
        assert_eq!(d.ctx().local_vars().get("caller").map(String::as_str), Some("kept"));
    }

    #[test]
    fn test_nested_script_resolves_relative_to_parent() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("inner.lsh"), ":echo inner $1\n").unwrap();
        let outer = dir.path().join("outer.lsh");
        std::fs::write(&outer, "|inner.lsh from-outer\n").unwrap();

        let (mut d, log) = dispatcher_with_log();
        let out = d.execute_any(&format!("|{}", outer.display())).unwrap();
        assert_eq!(out, "inner from-outer");
        assert_eq!(d.ctx().path_depth(), 1);
        assert_eq!(log.rescans(), 0);
    }

    #[test]
    fn test_execute_file_errors() {
        let mut d = dispatcher();
        let err = d.execute_file("", true).unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::NoCommandGiven));
        assert_eq!(err.message, "no script specified");

        let err = d.execute_file("\"unterminated", true).unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::ParseFailure));
        assert_eq!(d.ctx().scope_depth(), 1);
    }

    #[test]
    fn test_ansi_vars_available_to_scripts() {
        let vars = ansi_vars();
        assert_eq!(vars.get("ansi_red").map(String::as_str), Some("\x1b[31m"));
        assert_eq!(vars.get("ansi_norm").map(String::as_str), Some("\x1b[0m"));
    }
}

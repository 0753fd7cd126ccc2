//! The `:` commands available in every session.

use crate::command::{Command, CommandMap, CommandResult, args_text};
use crate::config::expand_tilde;
use crate::context::{ContextStacks, shared_sink};
use crate::dispatch::Dispatcher;
use crate::vars::expand_vars;
use logshell_types::{ErrorKind, HelpText, Snippet, UserMessage};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::process::{Command as Process, Stdio};

pub fn register(commands: &mut CommandMap) {
    commands.insert(Command::new(
        HelpText::command("echo", "Echo the given message to the screen or the output file")
            .with_optional_parameter("-n", "Do not print a line-feed at the end")
            .with_parameter("msg", "The message to display")
            .with_example(":echo Hello, World!"),
        com_echo,
    ));
    commands.insert(Command::new(
        HelpText::command("eval", "Evaluate the given command/query after doing environment variable substitution")
            .with_parameter("command", "The command or query to perform substitution on")
            .with_example(":eval :echo $HOME"),
        com_eval,
    ));
    commands.insert(Command::new(
        HelpText::command("redirect-to", "Redirect the output of commands to the given file")
            .with_optional_parameter("path", "The path to the file to write; '-' for standard output")
            .with_example(":redirect-to /tmp/report.txt"),
        com_redirect_to,
    ));
    commands.insert(Command::new(
        HelpText::command("write-csv-to", "Write the results of the last query as CSV")
            .with_parameter("path", "The path to the file to write; '-' for standard output")
            .with_example(":write-csv-to /tmp/results.csv"),
        com_write_csv_to,
    ));
    commands.insert(Command::new(
        HelpText::command("write-json-to", "Write the results of the last query as a JSON array")
            .with_parameter("path", "The path to the file to write; '-' for standard output")
            .with_example(":write-json-to -"),
        com_write_json_to,
    ));
    commands.insert(Command::new(
        HelpText::command("sh", "Execute the given command-line and capture its output")
            .with_parameter("cmdline", "The command-line to execute")
            .with_example(":sh uptime"),
        com_sh,
    ));
    commands.insert(Command::new(
        HelpText::command("help", "Show the help text for a command")
            .with_optional_parameter("command", "The command to describe")
            .with_example(":help echo"),
        com_help,
    ));
}

fn expand(d: &Dispatcher, text: &str) -> CommandResult {
    expand_vars(text, |name| d.ctx.lookup_var(name)).map_err(|e| {
        d.ctx
            .make_error(ErrorKind::ParseFailure, "unable to expand variables")
            .with_reason(e.to_string())
    })
}

fn com_echo(d: &mut Dispatcher, cmdline: &str, args: &[String]) -> CommandResult {
    let mut text = args_text(cmdline);
    let mut newline = true;
    if args.get(1).is_some_and(|a| a == "-n") {
        newline = false;
        text = args_text(text);
    }
    let msg = expand(d, text)?;

    if !d.ctx.is_dry_run() {
        let wrote = d.ctx.write_output(&msg, newline).map_err(|e| {
            d.ctx
                .make_error(ErrorKind::CommandFailed, "unable to write to output")
                .with_reason(e.to_string())
        })?;
        if wrote {
            return Ok(String::new());
        }
    }
    Ok(msg)
}

fn com_eval(d: &mut Dispatcher, cmdline: &str, _args: &[String]) -> CommandResult {
    let text = args_text(cmdline);
    if text.is_empty() {
        return Err(d
            .ctx
            .make_error(ErrorKind::NoCommandGiven, "expecting a command or query to evaluate"));
    }
    let expanded = expand(d, text)?;
    if d.ctx.is_dry_run() {
        return Ok(expanded);
    }

    let mut this = d.enter_source(Snippet::new("eval", expanded.clone()).with_line(1));
    this.execute_any(&expanded)
}

/// Open `path` for writing; `-` is standard output.
fn open_target(d: &Dispatcher, path: &str) -> Result<Box<dyn Write + Send>, UserMessage> {
    if path == "-" {
        return Ok(Box::new(std::io::stdout()));
    }
    let file = File::create(expand_tilde(path)).map_err(|e| {
        d.ctx
            .make_error(ErrorKind::CommandFailed, format!("unable to open file for writing: {}", path))
            .with_reason(e.to_string())
    })?;
    Ok(Box::new(BufWriter::new(file)))
}

fn com_redirect_to(d: &mut Dispatcher, cmdline: &str, _args: &[String]) -> CommandResult {
    let path = expand(d, args_text(cmdline))?;
    let path = path.trim();

    if path.is_empty() {
        if !d.ctx.is_dry_run() {
            d.ctx.clear_output();
        }
        return Ok("info: redirecting output to screen".to_string());
    }
    if d.ctx.is_dry_run() {
        return Ok(String::new());
    }

    let target = open_target(d, path)?;
    let name = if path == "-" { "stdout" } else { path };
    d.ctx.set_output(name, shared_sink(target));
    Ok(format!("info: redirecting output to -- {}", name))
}

fn write_results(
    d: &mut Dispatcher,
    cmdline: &str,
    write: fn(&crate::results::ResultSet, &mut dyn Write) -> std::io::Result<()>,
) -> CommandResult {
    let path = expand(d, args_text(cmdline))?;
    let path = path.trim();
    if path.is_empty() {
        return Err(d
            .ctx
            .make_error(ErrorKind::CommandFailed, "expecting a path to write to"));
    }
    if d.results().headers.is_empty() {
        return Err(d
            .ctx
            .make_error(ErrorKind::CommandFailed, "no query results to write"));
    }
    if d.ctx.is_dry_run() {
        return Ok(String::new());
    }

    let mut out = open_target(d, path)?;
    let written = write(d.results(), &mut out).and_then(|_| out.flush());
    written.map_err(|e| {
        d.ctx
            .make_error(ErrorKind::CommandFailed, format!("unable to write to {}", path))
            .with_reason(e.to_string())
    })?;
    Ok(String::new())
}

fn com_write_csv_to(d: &mut Dispatcher, cmdline: &str, _args: &[String]) -> CommandResult {
    write_results(d, cmdline, |results, out| {
        results.write_csv(out).map_err(std::io::Error::other)
    })
}

fn com_write_json_to(d: &mut Dispatcher, cmdline: &str, _args: &[String]) -> CommandResult {
    write_results(d, cmdline, |results, out| {
        serde_json::to_writer_pretty(&mut *out, &results.to_json())?;
        writeln!(out)
    })
}

fn com_sh(d: &mut Dispatcher, cmdline: &str, _args: &[String]) -> CommandResult {
    let command = args_text(cmdline);
    if command.is_empty() {
        return Err(d
            .ctx
            .make_error(ErrorKind::NoCommandGiven, "expecting a command-line to execute"));
    }
    if d.ctx.is_dry_run() {
        return Ok(String::new());
    }

    let mut child = Process::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .spawn()
        .map_err(|e| {
            d.ctx
                .make_error(ErrorKind::CommandFailed, format!("unable to execute -- {}", command))
                .with_reason(e.to_string())
        })?;
    tracing::info!("started child process {} for: {}", child.id(), command);

    let Some(stdout) = child.stdout.take() else {
        return Err(d
            .ctx
            .make_error(ErrorKind::CommandFailed, "child process has no output pipe"));
    };
    let handle = d.pipe_callback(command, Box::new(stdout)).map_err(|e| {
        d.ctx
            .make_error(ErrorKind::CommandFailed, "unable to capture command output")
            .with_reason(e.to_string())
    })?;
    d.captures.push(handle.with_child(child));
    Ok(String::new())
}

fn com_help(d: &mut Dispatcher, cmdline: &str, _args: &[String]) -> CommandResult {
    let topic = args_text(cmdline).trim();
    if topic.is_empty() {
        let lines: Vec<String> = d
            .commands
            .iter()
            .chain(d.sql_commands.iter())
            .map(|cmd| format!("{}  {}", cmd.help.synopsis(), cmd.help.summary))
            .collect();
        return Ok(lines.join("\n"));
    }

    let name = topic.trim_start_matches([':', ';']);
    d.commands
        .get(name)
        .or_else(|| d.sql_commands.get(name))
        .map(|cmd| cmd.help.format_for_term())
        .ok_or_else(|| {
            d.ctx
                .make_error(ErrorKind::UnknownCommand, format!("unknown command - {}", name))
        })
}

use crate::dispatch::Dispatcher;
use logshell_types::{HelpText, UserMessage};
use std::collections::BTreeMap;

pub type CommandResult = Result<String, UserMessage>;

/// Handler signature: the dispatcher, the raw command line (name included)
/// and its whitespace-separated words.
pub type CommandFn = fn(&mut Dispatcher, &str, &[String]) -> CommandResult;

#[derive(Clone)]
pub struct Command {
    pub help: HelpText,
    pub func: CommandFn,
}

impl Command {
    pub fn new(help: HelpText, func: CommandFn) -> Self {
        Self { help, func }
    }

    /// Name the command is looked up by, e.g. `echo` or `.tables`.
    pub fn name(&self) -> &str {
        &self.help.name
    }
}

#[derive(Clone, Default)]
pub struct CommandMap {
    commands: BTreeMap<String, Command>,
}

impl CommandMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, command: Command) {
        self.commands.insert(command.name().to_string(), command);
    }

    pub fn get(&self, name: &str) -> Option<&Command> {
        self.commands.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Command> {
        self.commands.values()
    }
}

/// The text after the command name, with leading whitespace removed.
pub fn args_text(cmdline: &str) -> &str {
    cmdline
        .trim_start()
        .split_once(char::is_whitespace)
        .map(|(_, rest)| rest.trim_start())
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_text() {
        assert_eq!(args_text("echo  hello   world "), "hello   world ");
        assert_eq!(args_text("  redirect-to"), "");
        assert_eq!(args_text("sh\tls -l"), "ls -l");
    }
}

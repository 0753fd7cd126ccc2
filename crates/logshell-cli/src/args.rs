use crate::types::{LogLevel, OutputFormat};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "logshell")]
#[command(about = "Load log files, then query and script them", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Data directory holding config.toml and scripts/ [default: $LOGSHELL_PATH or the XDG config dir]
    #[arg(long)]
    pub data_dir: Option<String>,

    #[arg(long, default_value = "plain")]
    pub format: OutputFormat,

    /// Used when RUST_LOG is not set
    #[arg(long, default_value = "warn")]
    pub log_level: LogLevel,

    /// Execute a mode-prefixed line (`:cmd`, `/regex`, `;SQL`, `|script`)
    #[arg(short = 'c', value_name = "CMD")]
    pub commands: Vec<String>,

    /// Execute a script file
    #[arg(short = 'f', value_name = "SCRIPT")]
    pub scripts: Vec<String>,

    /// Run without the interactive prompt
    #[arg(short = 'n', long)]
    pub headless: bool,

    /// Reject statements that modify the database
    #[arg(short = 'r', long)]
    pub read_only: bool,

    /// Log files or directories to load
    #[arg(value_name = "FILES")]
    pub files: Vec<PathBuf>,
}

impl Cli {
    /// Startup batch: `-c` lines followed by `-f` scripts.
    pub fn init_commands(&self) -> Vec<String> {
        self.commands
            .iter()
            .cloned()
            .chain(self.scripts.iter().map(|s| format!("|{}", s)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_commands_order() {
        let cli = Cli::parse_from([
            "logshell", "-c", ";SELECT 1", "-f", "report.lsh", "-c", ":echo hi", "app.log",
        ]);
        assert_eq!(
            cli.init_commands(),
            vec![";SELECT 1", ":echo hi", "|report.lsh"]
        );
        assert_eq!(cli.files, vec![PathBuf::from("app.log")]);
        assert!(!cli.headless);
    }
}

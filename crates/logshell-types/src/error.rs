use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type for logshell-types operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the types layer
#[derive(Debug)]
pub enum Error {
    /// A serialized diagnostic could not be decoded
    Decode(serde_json::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Decode(err) => write!(f, "Decode error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Decode(err) => Some(err),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Decode(err)
    }
}

/// Classification attached to error-level diagnostics produced while
/// dispatching a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnknownCommand,
    NoCommandGiven,
    ParseFailure,
    ReadOnlyViolation,
    EngineError,
    StructuredEngineError,
    ScriptNotFound,
    StdinAlreadyConsumed,
    /// A command handler rejected its arguments or failed while running.
    CommandFailed,
    /// The session stopped looping between two statements.
    Interrupted,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::UnknownCommand => "unknown command",
            ErrorKind::NoCommandGiven => "no command given",
            ErrorKind::ParseFailure => "parse failure",
            ErrorKind::ReadOnlyViolation => "read-only violation",
            ErrorKind::EngineError => "engine error",
            ErrorKind::StructuredEngineError => "structured engine error",
            ErrorKind::ScriptNotFound => "script not found",
            ErrorKind::StdinAlreadyConsumed => "stdin already consumed",
            ErrorKind::CommandFailed => "command failed",
            ErrorKind::Interrupted => "interrupted",
        };
        f.write_str(name)
    }
}

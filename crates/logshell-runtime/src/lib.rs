pub mod builtins;
pub mod capture;
pub mod command;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod exec_file;
pub mod host;
pub mod query;
pub mod results;
pub mod script;
pub mod sql_commands;
pub mod vars;

#[cfg(test)]
mod testing;

pub use capture::CaptureHandle;
pub use command::{Command, CommandFn, CommandMap, CommandResult};
pub use config::{Config, resolve_workspace_path};
pub use context::{
    ContextStacks, Deferred, ExecutionContext, OutputTarget, Permissions, SharedSink, VarScope,
    shared_sink,
};
pub use dispatch::{BatchResult, Dispatcher, Mode};
pub use error::{Error, Result};
pub use host::{HostServices, NullHost};
pub use query::{MSG_FORMAT_STMT, QueryOutput};
pub use results::{ColumnHeader, ResultSet, RowCallback};
pub use script::{ScriptCandidate, ScriptResolver, ScriptSource};

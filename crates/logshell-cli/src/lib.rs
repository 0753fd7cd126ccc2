// Command-line front end: loads the named log files into an in-memory
// store, then feeds `-c`/`-f` lines, piped stdin, or an interactive prompt
// through the dispatcher.

mod args;
mod commands;
mod host;
mod render;
pub mod types;

pub use args::Cli;
pub use commands::run;
pub use host::CliHost;
pub use render::Renderer;

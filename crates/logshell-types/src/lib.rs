pub mod console;
pub mod error;
pub mod help;
pub mod value;

pub use console::{ERROR_MARKER, Level, RenderOptions, Snippet, UserMessage};
pub use error::{Error, ErrorKind, Result};
pub use help::{HelpContext, HelpParam, HelpText};
pub use value::{LineValue, Value};

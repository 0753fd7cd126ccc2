// SQLite log store
// Raw lines stay in memory; all_logs is rebuilt incrementally from them

mod error;
mod format;
mod schema;
mod store;

// Public API
pub use error::{Error, Result};
pub use format::message_format;
pub use schema::{SCHEMA_VERSION, init_schema};
pub use store::{LogLine, LogStore, VirtualInput};

use logshell_index::{LogStore, VirtualInput};
use logshell_runtime::HostServices;
use rusqlite::Connection;
use std::io::{Read, Write};
use terminal_size::{Height, Width};

/// Host backed by the in-memory log store. Searches print matching lines
/// to standard output.
pub struct CliHost {
    store: LogStore,
}

impl CliHost {
    pub fn new(store: LogStore) -> Self {
        Self { store }
    }
}

impl HostServices for CliHost {
    fn execute_search(&mut self, pattern: &str) {
        self.rescan_inputs();
        let hits = match self.store.search(pattern) {
            Ok(hits) => hits,
            Err(err) => {
                tracing::warn!("invalid search pattern {}: {}", pattern, err);
                eprintln!("⚠ warning: invalid search pattern -- {}", err);
                return;
            }
        };

        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        for hit in hits {
            if writeln!(out, "{}:{}: {}", hit.path, hit.file_line, hit.body).is_err() {
                break;
            }
        }
    }

    fn rescan_inputs(&mut self) {
        match self.store.rescan() {
            Ok(0) => {}
            Ok(count) => tracing::debug!("read {} new lines", count),
            Err(err) => tracing::warn!("rescan failed: {}", err),
        }
    }

    fn rebuild_indexes(&mut self, db: &Connection) {
        if let Err(err) = self.store.rebuild(db) {
            tracing::error!("index rebuild failed: {}", err);
        }
    }

    fn terminal_size(&self) -> Option<(u16, u16)> {
        terminal_size::terminal_size().map(|(Width(cols), Height(lines))| (lines, cols))
    }

    fn add_virtual_input(&mut self, name: &str, reader: Box<dyn Read + Send>) {
        match VirtualInput::spawn(name, reader) {
            Ok(input) => self.store.add_virtual(input),
            Err(err) => tracing::error!("unable to read {}: {}", name, err),
        }
    }
}

use rusqlite::Connection;
use std::io::Read;

/// Services the surrounding application provides to the dispatcher.
///
/// The engine never reaches for session-wide globals; everything it needs
/// from the log store or the terminal goes through this trait.
pub trait HostServices {
    /// Name of the view searches apply to.
    fn active_view(&self) -> &str {
        "log"
    }

    /// Hand a search pattern to the active view. Errors are the host's to
    /// report; the dispatcher does not wait for results.
    fn execute_search(&mut self, pattern: &str);

    /// Pick up data appended to the inputs since the last call.
    fn rescan_inputs(&mut self);

    /// Bring the query tables up to date with the inputs.
    fn rebuild_indexes(&mut self, db: &Connection);

    /// Terminal size as (lines, columns), if there is a terminal.
    fn terminal_size(&self) -> Option<(u16, u16)> {
        None
    }

    /// Register a stream as a new input, e.g. captured command output.
    fn add_virtual_input(&mut self, name: &str, reader: Box<dyn Read + Send>);
}

/// Host for contexts without a log view; searches and refreshes do nothing
/// and virtual inputs are drained and discarded.
#[derive(Debug, Default)]
pub struct NullHost;

impl HostServices for NullHost {
    fn execute_search(&mut self, pattern: &str) {
        tracing::debug!("no view to search for: {}", pattern);
    }

    fn rescan_inputs(&mut self) {}

    fn rebuild_indexes(&mut self, _db: &Connection) {}

    fn add_virtual_input(&mut self, name: &str, mut reader: Box<dyn Read + Send>) {
        tracing::debug!("discarding virtual input: {}", name);
        let _ = std::io::copy(&mut reader, &mut std::io::sink());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_host_defaults() {
        let mut host = NullHost;
        assert_eq!(host.active_view(), "log");
        assert_eq!(host.terminal_size(), None);
        host.add_virtual_input("[0] Output of true", Box::new(std::io::Cursor::new("x\n")));
    }
}

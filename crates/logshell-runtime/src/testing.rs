//! Dispatcher fixtures for unit tests.

use crate::dispatch::Dispatcher;
use crate::host::HostServices;
use crate::script::ScriptResolver;
use rusqlite::Connection;
use std::io::Read;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Calls {
    searches: Vec<String>,
    rescans: usize,
    rebuilds: usize,
    virtual_inputs: Vec<String>,
}

/// What a [`RecordingHost`] was asked to do.
#[derive(Clone, Default)]
pub struct HostLog(Arc<Mutex<Calls>>);

impl HostLog {
    pub fn searches(&self) -> Vec<String> {
        self.0.lock().unwrap().searches.clone()
    }

    pub fn rescans(&self) -> usize {
        self.0.lock().unwrap().rescans
    }

    pub fn rebuilds(&self) -> usize {
        self.0.lock().unwrap().rebuilds
    }

    pub fn virtual_inputs(&self) -> Vec<String> {
        self.0.lock().unwrap().virtual_inputs.clone()
    }
}

pub struct RecordingHost {
    log: HostLog,
}

impl HostServices for RecordingHost {
    fn execute_search(&mut self, pattern: &str) {
        self.log.0.lock().unwrap().searches.push(pattern.to_string());
    }

    fn rescan_inputs(&mut self) {
        self.log.0.lock().unwrap().rescans += 1;
    }

    fn rebuild_indexes(&mut self, _db: &Connection) {
        self.log.0.lock().unwrap().rebuilds += 1;
    }

    fn terminal_size(&self) -> Option<(u16, u16)> {
        Some((24, 80))
    }

    fn add_virtual_input(&mut self, name: &str, mut reader: Box<dyn Read + Send>) {
        let mut sink = Vec::new();
        reader.read_to_end(&mut sink).unwrap();
        self.log.0.lock().unwrap().virtual_inputs.push(name.to_string());
    }
}

pub fn dispatcher_with_log() -> (Dispatcher, HostLog) {
    let log = HostLog::default();
    let host = RecordingHost { log: log.clone() };
    let mut d = Dispatcher::in_memory(Box::new(host)).unwrap();
    d.set_script_resolver(
        ScriptResolver::new(Vec::new()).with_stdin_latch(Arc::new(AtomicBool::new(false))),
    );
    (d, log)
}

pub fn dispatcher() -> Dispatcher {
    dispatcher_with_log().0
}

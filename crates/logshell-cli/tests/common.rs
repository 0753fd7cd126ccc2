//! Common test utilities shared across integration tests.
//!
//! Note: Clippy cannot track usage across integration test files,
//! hence the `allow(dead_code)` annotation.
#![cfg(test)]
#![allow(dead_code)]

use assert_cmd::Command;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub const SAMPLE_LOG: &str = "\
2024-03-01T10:00:00 INFO service started on port 8080
2024-03-01T10:00:05 ERROR connection refused by 10.0.0.7
2024-03-01T10:00:09 INFO retry succeeded after 2 attempts
2024-03-01T10:01:00 ERROR connection refused by 10.0.0.9
";

pub struct TestFixture {
    _temp_dir: TempDir,
    data_dir: PathBuf,
    log_dir: PathBuf,
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl TestFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let data_dir = temp_dir.path().join(".logshell");
        let log_dir = temp_dir.path().join("logs");

        fs::create_dir_all(data_dir.join("scripts")).expect("Failed to create data dir");
        fs::create_dir_all(&log_dir).expect("Failed to create log dir");

        Self {
            _temp_dir: temp_dir,
            data_dir,
            log_dir,
        }
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    pub fn write_log(&self, name: &str, content: &str) -> PathBuf {
        let path = self.log_dir.join(name);
        fs::write(&path, content).expect("Failed to write log");
        path
    }

    /// Script installed in the data directory's `scripts/` folder.
    pub fn write_script(&self, name: &str, content: &str) -> PathBuf {
        let path = self.data_dir.join("scripts").join(name);
        fs::write(&path, content).expect("Failed to write script");
        path
    }

    pub fn write_config(&self, content: &str) {
        fs::write(self.data_dir.join("config.toml"), content).expect("Failed to write config");
    }

    /// Headless invocation in the default plain format.
    pub fn command(&self) -> Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("logshell");
        cmd.env_remove("RUST_LOG")
            .arg("--data-dir")
            .arg(self.data_dir())
            .arg("-n");
        cmd
    }
}

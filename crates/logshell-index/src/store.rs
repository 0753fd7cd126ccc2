use regex::Regex;
use rusqlite::{Connection, params};
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use walkdir::WalkDir;

use crate::{Result, format::message_format};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub path: String,
    /// 1-based line number within its input.
    pub file_line: usize,
    pub body: String,
}

/// An input fed by a background reader, e.g. the output of a subprocess.
pub struct VirtualInput {
    name: String,
    buffer: Arc<Mutex<Vec<String>>>,
    handle: Option<JoinHandle<()>>,
}

impl VirtualInput {
    pub fn spawn(name: impl Into<String>, source: Box<dyn Read + Send>) -> Result<Self> {
        let name = name.into();
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buffer);
        let thread_name = name.clone();

        let handle = std::thread::Builder::new()
            .name("virtual-input".to_string())
            .spawn(move || {
                let reader = BufReader::new(source);
                for line in reader.lines() {
                    match line {
                        Ok(line) => {
                            if let Ok(mut lines) = sink.lock() {
                                lines.push(line);
                            }
                        }
                        Err(err) => {
                            tracing::warn!("virtual input {} stopped: {}", thread_name, err);
                            break;
                        }
                    }
                }
            })?;

        Ok(Self {
            name,
            buffer,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True once the reader has hit end of input.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }

    fn drain(&mut self) -> Vec<String> {
        match self.buffer.lock() {
            Ok(mut lines) => std::mem::take(&mut *lines),
            Err(_) => Vec::new(),
        }
    }
}

struct FileInput {
    path: PathBuf,
    offset: u64,
    lines_read: usize,
}

/// In-memory record of every ingested line plus the bookkeeping needed to
/// append new data to `all_logs`.
#[derive(Default)]
pub struct LogStore {
    files: Vec<FileInput>,
    virtuals: Vec<(VirtualInput, usize)>,
    lines: Vec<LogLine>,
    /// Number of `lines` already copied into `all_logs`.
    indexed: usize,
}

impl LogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file, or every file below a directory.
    pub fn add_path(&mut self, path: &Path) -> Result<usize> {
        if path.is_dir() {
            let mut added = 0;
            for entry in WalkDir::new(path)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                self.add_file(entry.path())?;
                added += 1;
            }
            Ok(added)
        } else {
            self.add_file(path)?;
            Ok(1)
        }
    }

    fn add_file(&mut self, path: &Path) -> Result<()> {
        // Fail early on unreadable files instead of at the next rescan
        File::open(path)?;

        if self.files.iter().any(|f| f.path == path) {
            return Ok(());
        }

        tracing::info!("opening input: {}", path.display());
        self.files.push(FileInput {
            path: path.to_path_buf(),
            offset: 0,
            lines_read: 0,
        });
        Ok(())
    }

    pub fn add_virtual(&mut self, input: VirtualInput) {
        tracing::info!("opening virtual input: {}", input.name());
        self.virtuals.push((input, 0));
    }

    pub fn input_names(&self) -> Vec<String> {
        self.files
            .iter()
            .map(|f| f.path.display().to_string())
            .chain(self.virtuals.iter().map(|(v, _)| v.name().to_string()))
            .collect()
    }

    pub fn lines(&self) -> &[LogLine] {
        &self.lines
    }

    /// Pull in data appended to the inputs since the last rescan. Returns the
    /// number of new lines. An input that cannot be read is skipped with a
    /// warning; invalid UTF-8 is replaced rather than rejected.
    pub fn rescan(&mut self) -> Result<usize> {
        let before = self.lines.len();

        for input in &mut self.files {
            let path = input.path.display().to_string();
            let appended = match read_appended(input) {
                Ok(appended) => appended,
                Err(err) => {
                    tracing::warn!("unable to read {}: {}", path, err);
                    continue;
                }
            };
            for body in appended {
                input.lines_read += 1;
                self.lines.push(LogLine {
                    path: path.clone(),
                    file_line: input.lines_read,
                    body,
                });
            }
        }

        for (input, lines_read) in &mut self.virtuals {
            for body in input.drain() {
                *lines_read += 1;
                self.lines.push(LogLine {
                    path: input.name().to_string(),
                    file_line: *lines_read,
                    body,
                });
            }
        }

        Ok(self.lines.len() - before)
    }

    /// Copy lines past the watermark into `all_logs`.
    pub fn rebuild(&mut self, conn: &Connection) -> Result<usize> {
        let pending = &self.lines[self.indexed..];
        if pending.is_empty() {
            return Ok(0);
        }

        let tx = conn.unchecked_transaction()?;
        {
            let mut file_stmt = tx.prepare_cached(
                r#"
                INSERT INTO log_files (path, is_virtual, line_count)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(path) DO UPDATE SET line_count = MAX(line_count, ?3)
                "#,
            )?;
            let mut line_stmt = tx.prepare_cached(
                r#"
                INSERT INTO all_logs (log_path, log_file_line, log_body, log_msg_format)
                VALUES (?1, ?2, ?3, ?4)
                "#,
            )?;

            for line in pending {
                let is_virtual = self.virtuals.iter().any(|(v, _)| v.name() == line.path);
                file_stmt.execute(params![&line.path, is_virtual, line.file_line as i64])?;
                line_stmt.execute(params![
                    &line.path,
                    line.file_line as i64,
                    &line.body,
                    message_format(&line.body)
                ])?;
            }
        }
        tx.commit()?;

        let count = pending.len();
        self.indexed = self.lines.len();
        tracing::debug!("indexed {} new lines", count);
        Ok(count)
    }

    pub fn search(&self, pattern: &str) -> Result<Vec<&LogLine>> {
        let re = Regex::new(pattern)?;
        Ok(self.lines.iter().filter(|l| re.is_match(&l.body)).collect())
    }
}

/// Read the complete lines appended to a file since `input.offset`. A file
/// that shrank is treated as rotated and read again from the start.
fn read_appended(input: &mut FileInput) -> Result<Vec<String>> {
    let mut file = File::open(&input.path)?;
    let len = file.metadata()?.len();
    if len < input.offset {
        input.offset = 0;
        input.lines_read = 0;
    }
    if len == input.offset {
        return Ok(Vec::new());
    }

    file.seek(SeekFrom::Start(input.offset))?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;

    // Leave a trailing partial line for the next rescan
    let complete = match data.iter().rposition(|&b| b == b'\n') {
        Some(idx) => &data[..=idx],
        None => return Ok(Vec::new()),
    };
    input.offset += complete.len() as u64;

    Ok(String::from_utf8_lossy(complete)
        .lines()
        .map(|l| l.to_string())
        .collect())
}

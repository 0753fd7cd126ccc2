use crate::context::ExecutionContext;
use logshell_types::{ErrorKind, UserMessage};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use walkdir::WalkDir;

pub const SCRIPT_EXTENSION: &str = "lsh";

static HEADER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^#\s*@(synopsis|description)\s*:\s*(.*?)\s*$").expect("valid header regex")
});

/// Process standard input can only be read once.
static STDIN_CONSUMED: Lazy<Arc<AtomicBool>> = Lazy::new(|| Arc::new(AtomicBool::new(false)));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptSource {
    Stdin,
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptCandidate {
    pub source: ScriptSource,
    pub synopsis: String,
    pub description: String,
}

impl ScriptCandidate {
    pub fn stdin() -> Self {
        Self {
            source: ScriptSource::Stdin,
            synopsis: String::new(),
            description: String::new(),
        }
    }

    /// Candidate for a file, with metadata read from its leading comments.
    pub fn from_file(path: &Path) -> Self {
        let mut candidate = Self {
            source: ScriptSource::File(path.to_path_buf()),
            synopsis: String::new(),
            description: String::new(),
        };
        if let Ok(file) = std::fs::File::open(path) {
            candidate.read_header(BufReader::new(file));
        }
        candidate
    }

    fn read_header(&mut self, reader: impl BufRead) {
        for line in reader.lines().map_while(|l| l.ok()) {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if !line.starts_with('#') {
                break;
            }
            if let Some(caps) = HEADER_RE.captures(line) {
                let value = caps[2].to_string();
                match &caps[1] {
                    "synopsis" => self.synopsis = value,
                    _ => self.description = value,
                }
            }
        }
    }

    /// Name used in provenance frames.
    pub fn display_name(&self) -> String {
        match &self.source {
            ScriptSource::Stdin => "-".to_string(),
            ScriptSource::File(path) => path.display().to_string(),
        }
    }
}

/// Maps script names to the files that implement them.
pub struct ScriptResolver {
    search_dirs: Vec<PathBuf>,
    stdin_latch: Arc<AtomicBool>,
}

impl Default for ScriptResolver {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl ScriptResolver {
    pub fn new(search_dirs: Vec<PathBuf>) -> Self {
        Self {
            search_dirs,
            stdin_latch: Arc::clone(&STDIN_CONSUMED),
        }
    }

    /// Use a private latch instead of the process-wide one.
    pub fn with_stdin_latch(mut self, latch: Arc<AtomicBool>) -> Self {
        self.stdin_latch = latch;
        self
    }

    pub fn search_dirs(&self) -> &[PathBuf] {
        &self.search_dirs
    }

    pub fn set_search_dirs(&mut self, dirs: Vec<PathBuf>) {
        self.search_dirs = dirs;
    }

    /// Every `.lsh` file below the search directories, keyed by file stem,
    /// in directory order then path order.
    pub fn index(&self) -> BTreeMap<String, Vec<ScriptCandidate>> {
        let mut index: BTreeMap<String, Vec<ScriptCandidate>> = BTreeMap::new();
        for dir in &self.search_dirs {
            if !dir.is_dir() {
                continue;
            }
            for entry in WalkDir::new(dir)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some(SCRIPT_EXTENSION) {
                    continue;
                }
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    index
                        .entry(stem.to_string())
                        .or_default()
                        .push(ScriptCandidate::from_file(path));
                }
            }
        }
        index
    }

    pub fn resolve(
        &self,
        ctx: &ExecutionContext,
        name: &str,
    ) -> Result<Vec<ScriptCandidate>, UserMessage> {
        if name == "-" || name == "/dev/stdin" {
            if self.stdin_latch.swap(true, Ordering::SeqCst) {
                return Err(ctx.make_error(
                    ErrorKind::StdinAlreadyConsumed,
                    "stdin has already been consumed",
                ));
            }
            return Ok(vec![ScriptCandidate::stdin()]);
        }

        if let Some(found) = self.index().remove(name) {
            tracing::debug!("resolved script {} from index: {} file(s)", name, found.len());
            return Ok(found);
        }

        let mut open_error = "file not found".to_string();
        match std::fs::File::open(name) {
            Ok(_) if Path::new(name).is_file() => {
                return Ok(vec![ScriptCandidate::from_file(Path::new(name))]);
            }
            Ok(_) => {}
            Err(err) if err.kind() != std::io::ErrorKind::NotFound => {
                open_error = err.to_string();
            }
            Err(_) => {
                let relative = Path::new(name);
                if !relative.is_absolute() {
                    let path = ctx.current_dir().join(relative);
                    match std::fs::metadata(&path) {
                        Ok(meta) if meta.is_file() => {
                            return Ok(vec![ScriptCandidate::from_file(&path)]);
                        }
                        Ok(_) => {}
                        Err(err) if err.kind() != std::io::ErrorKind::NotFound => {
                            open_error = err.to_string();
                        }
                        Err(_) => {}
                    }
                }
            }
        }

        Err(ctx.make_error(
            ErrorKind::ScriptNotFound,
            format!("unknown script -- {} -- {}", name, open_error),
        ))
    }
}

use crate::context::ExecutionContext;
use crate::vars::expand_vars;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Columns that identify rows rather than measure something; numeric columns
/// with these names are never treated as graphable.
pub const DEFAULT_KEY_COLUMNS: &[&str] = &["log_line", "log_file_line", "log_part", "log_idx", "rowid"];

/// Resolve the workspace data directory path based on priority:
/// 1. Explicit path (with tilde expansion)
/// 2. LOGSHELL_PATH environment variable (with tilde expansion)
/// 3. XDG config directory (recommended default)
/// 4. ~/.logshell (fallback for systems without XDG)
pub fn resolve_workspace_path(explicit_path: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = explicit_path {
        return Ok(expand_tilde(path));
    }

    if let Ok(env_path) = std::env::var("LOGSHELL_PATH") {
        return Ok(expand_tilde(&env_path));
    }

    if let Some(config_dir) = dirs::config_dir() {
        return Ok(config_dir.join("logshell"));
    }

    if let Some(home) = std::env::var_os("HOME") {
        return Ok(PathBuf::from(home).join(".logshell"));
    }

    Err(Error::Config(
        "Could not determine workspace path: no HOME directory or XDG config directory found"
            .to_string(),
    ))
}

/// Expand tilde (~) in paths to the user's home directory
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return PathBuf::from(home).join(stripped);
    }
    PathBuf::from(path)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Session-wide variables; values may reference earlier globals and the
    /// environment with `$NAME`.
    #[serde(default)]
    pub global_vars: BTreeMap<String, String>,

    /// Directories scanned for `.lsh` scripts.
    #[serde(default)]
    pub script_dirs: Vec<PathBuf>,

    #[serde(default = "default_key_columns")]
    pub key_columns: Vec<String>,

    #[serde(default)]
    pub read_only: bool,
}

fn default_key_columns() -> Vec<String> {
    DEFAULT_KEY_COLUMNS.iter().map(|s| s.to_string()).collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            global_vars: BTreeMap::new(),
            script_dirs: Vec::new(),
            key_columns: default_key_columns(),
            read_only: false,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::default_path()?;
        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn default_path() -> Result<PathBuf> {
        Ok(resolve_workspace_path(None)?.join("config.toml"))
    }

    /// Configured script directories plus `<data_dir>/scripts`.
    pub fn script_search_dirs(&self, data_dir: &Path) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = self
            .script_dirs
            .iter()
            .map(|p| expand_tilde(&p.to_string_lossy()))
            .collect();
        let default_dir = data_dir.join("scripts");
        if !dirs.contains(&default_dir) {
            dirs.push(default_dir);
        }
        dirs
    }

    /// Evaluate `global_vars` in name order and install them in the
    /// context's global scope. Values that fail to expand are skipped.
    pub fn install_globals(&self, ctx: &mut ExecutionContext) {
        for (name, raw) in &self.global_vars {
            let expanded = expand_vars(raw, |var| {
                ctx.global_var(var)
                    .map(|v| v.to_string())
                    .or_else(|| std::env::var(var).ok())
            });

            match expanded {
                Ok(value) => ctx.set_global_var(name.clone(), value),
                Err(err) => {
                    tracing::error!("Unable to evaluate global variable {}: {}", name, err);
                }
            }
        }
    }
}

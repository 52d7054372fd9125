use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::{IntrospectError, Result};

pub const ENV_WORK_DIR: &str = "SIM_INTROSPECT_WORK_DIR";
pub const ENV_TOOLCHAIN_PATH: &str = "SIM_INTROSPECT_TOOLCHAIN_PATH";
pub const ENV_INTERPRETER: &str = "SIM_INTROSPECT_INTERPRETER";
pub const ENV_TIMEOUT_SECS: &str = "SIM_INTROSPECT_TIMEOUT_SECS";

/// Relative location of the simulator toolchain, prefixed onto the child's PATH.
pub const DEFAULT_TOOLCHAIN_PATH: &str = "../../../../";
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Settings for transforming and running simulation scripts.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct PipelineConfig {
    /// Directory holding generated scripts and documents; the child runs here.
    pub work_dir: PathBuf,
    pub toolchain_path: String,
    /// Command line used to run the script, e.g. `python2 -u`. When unset the
    /// script is executed directly through its shebang.
    pub interpreter: Option<String>,
    /// Zero disables the timeout.
    pub timeout_secs: u64,
    pub keep_files: bool,
    pub log_file: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("."),
            toolchain_path: DEFAULT_TOOLCHAIN_PATH.to_string(),
            interpreter: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            keep_files: false,
            log_file: None,
        }
    }
}

impl PipelineConfig {
    /// Defaults, then the optional JSON file, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| IntrospectError::io(path, e))?;
        serde_json::from_str(&text).map_err(|e| {
            IntrospectError::Config(format!("invalid config '{}': {}", path.display(), e))
        })
    }

    /// Apply overrides from a variable lookup (the process environment in production).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_WORK_DIR) {
            self.work_dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup(ENV_TOOLCHAIN_PATH) {
            self.toolchain_path = path;
        }
        if let Some(interp) = lookup(ENV_INTERPRETER) {
            self.interpreter = Some(interp).filter(|s| !s.trim().is_empty());
        }
        if let Some(secs) = lookup(ENV_TIMEOUT_SECS) {
            self.timeout_secs = secs.trim().parse().map_err(|_| {
                IntrospectError::Config(format!(
                    "{ENV_TIMEOUT_SECS} must be a number, got '{secs}'"
                ))
            })?;
        }
        debug!(config = ?self, "Resolved pipeline configuration");
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    /// Interpreter command line split with shell quoting rules.
    pub fn interpreter_argv(&self) -> Result<Option<Vec<String>>> {
        let Some(line) = self.interpreter.as_deref() else {
            return Ok(None);
        };
        match shlex::split(line) {
            Some(argv) if !argv.is_empty() => Ok(Some(argv)),
            _ => Err(IntrospectError::Config(format!(
                "cannot parse interpreter command line: {line}"
            ))),
        }
    }
}

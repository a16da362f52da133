//! Runtime configuration.
//!
//! Resolution order, later steps winning:
//! 1. built-in defaults ([`Config::default`])
//! 2. the TOML file named by `NKEN_CONFIG`, else `./nken.toml` when present
//! 3. `NKEN_*` environment variable overrides

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::chain::SplitMode;
use crate::error::ConfigError;

/// Config file looked up in the working directory when `NKEN_CONFIG` is unset.
pub const DEFAULT_CONFIG_FILE: &str = "nken.toml";

pub const CONFIG_PATH_VAR: &str = "NKEN_CONFIG";
pub const HANDLERS_DIR_VAR: &str = "NKEN_HANDLERS_DIR";
pub const HANDLER_EXT_VAR: &str = "NKEN_HANDLER_EXT";
pub const INTERPRETER_VAR: &str = "NKEN_INTERPRETER";
pub const FALLBACK_VAR: &str = "NKEN_FALLBACK";
pub const TIMEOUT_VAR: &str = "NKEN_TIMEOUT_SECS";
pub const LEGACY_SPLIT_VAR: &str = "NKEN_LEGACY_SPLIT";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory holding `<name>.<extension>` handler files.
    pub handlers_dir: PathBuf,
    /// Extension of handler files, without the dot.
    pub extension: String,
    /// Program handler files are run with; `None` or empty runs the file directly.
    pub interpreter: Option<String>,
    /// Command run when the chain is empty.
    pub fallback: String,
    /// Per-invocation time limit in seconds. `None` waits forever.
    pub timeout_secs: Option<u64>,
    /// Reproduce the old front-end's handling of tokens with an embedded `;`.
    pub legacy_split: bool,
    /// Tool locations exported to handlers as `NKEN_<NAME>`.
    pub toolchain: BTreeMap<String, PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            handlers_dir: PathBuf::from("nkentools/commands"),
            extension: "py".to_string(),
            interpreter: Some(default_interpreter().to_string()),
            fallback: "help".to_string(),
            timeout_secs: None,
            legacy_split: false,
            toolchain: BTreeMap::new(),
        }
    }
}

fn default_interpreter() -> &'static str {
    if cfg!(windows) { "py" } else { "python3" }
}

impl Config {
    /// Load from the process environment: config file, then variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// [`Config::load`] with an explicit variable lookup.
    pub fn load_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = match lookup(CONFIG_PATH_VAR) {
            Some(path) if !path.trim().is_empty() => Self::from_file(Path::new(&path))?,
            _ => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.is_file() {
                    Self::from_file(path)?
                } else {
                    tracing::debug!("no config file, using defaults");
                    Self::default()
                }
            }
        };
        config.apply_overrides(lookup)?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&text).map_err(|reason| ConfigError::Parse {
            path: path.to_path_buf(),
            reason,
        })?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    fn from_toml(text: &str) -> Result<Self, String> {
        toml::from_str(text).map_err(|err| err.to_string())
    }

    /// Apply `NKEN_*` overrides. Unset or blank variables leave the value alone.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(dir) = get(HANDLERS_DIR_VAR) {
            self.handlers_dir = PathBuf::from(dir);
        }
        if let Some(ext) = get(HANDLER_EXT_VAR) {
            self.extension = ext.trim_start_matches('.').to_string();
        }
        // Set-but-empty clears the interpreter, so it is read without the blank filter.
        if let Some(interpreter) = lookup(INTERPRETER_VAR) {
            self.interpreter = Some(interpreter).filter(|program| !program.trim().is_empty());
        }
        if let Some(fallback) = get(FALLBACK_VAR) {
            self.fallback = fallback;
        }
        if let Some(secs) = get(TIMEOUT_VAR) {
            let parsed = secs.trim().parse::<u64>().map_err(|err| ConfigError::InvalidValue {
                key: TIMEOUT_VAR.to_string(),
                value: secs.clone(),
                reason: err.to_string(),
            })?;
            self.timeout_secs = (parsed > 0).then_some(parsed);
        }
        if let Some(flag) = get(LEGACY_SPLIT_VAR) {
            self.legacy_split = parse_flag(&flag).ok_or_else(|| ConfigError::InvalidValue {
                key: LEGACY_SPLIT_VAR.to_string(),
                value: flag.clone(),
                reason: "expected true/false, 1/0, yes/no or on/off".to_string(),
            })?;
        }
        Ok(())
    }

    pub fn split_mode(&self) -> SplitMode {
        if self.legacy_split {
            SplitMode::Legacy
        } else {
            SplitMode::Strict
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

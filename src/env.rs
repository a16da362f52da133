use std::collections::{BTreeMap, HashMap};
use std::env as stdenv;
use std::path::{Path, PathBuf};

/// Prefix of the variables under which toolchain locations are exported to handlers.
pub const TOOLCHAIN_VAR_PREFIX: &str = "NKEN_";

/// Process environment handed to every handler of a chain.
///
/// The environment contains:
/// - `vars`: variables visible to external handlers, including exported toolchain paths.
/// - `current_dir`: the working directory handlers are started in.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Key-value store of environment variables (e.g., PATH, HOME, NKEN_JDK).
    pub vars: HashMap<String, String>,
    /// Working directory for handler execution.
    pub current_dir: PathBuf,
}

impl Environment {
    /// Capture the current process state.
    ///
    /// Copies variables from `std::env::vars()` and the working directory from
    /// `std::env::current_dir()`, falling back to `.` when it cannot be read.
    pub fn new() -> Self {
        let vars = stdenv::vars().collect();
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self { vars, current_dir }
    }

    /// An environment with no variables, rooted at `current_dir`.
    pub fn empty(current_dir: impl Into<PathBuf>) -> Self {
        Self {
            vars: HashMap::new(),
            current_dir: current_dir.into(),
        }
    }

    /// Get the value of a variable, looking at `self.vars` first and the process second.
    pub fn get_var(&self, key: &str) -> Option<String> {
        self.vars
            .get(key)
            .cloned()
            .or_else(|| stdenv::var(key).ok())
    }

    /// Set or override a variable in `self.vars`.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    /// Export each toolchain entry as `NKEN_<NAME>`.
    ///
    /// Names are upper-cased and `-` becomes `_`; a leading `~/` in the path is
    /// expanded against `HOME`.
    pub fn export_toolchain(&mut self, toolchain: &BTreeMap<String, PathBuf>) {
        for (name, path) in toolchain {
            let key = toolchain_var(name);
            let value = self.expand_home(path);
            tracing::debug!(%key, path = %value.display(), "exporting toolchain location");
            self.set_var(key, value.to_string_lossy());
        }
    }

    fn expand_home(&self, path: &Path) -> PathBuf {
        match (path.strip_prefix("~"), self.get_var("HOME")) {
            (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
            _ => path.to_path_buf(),
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

/// Variable name under which the toolchain entry `name` is exported.
pub fn toolchain_var(name: &str) -> String {
    format!(
        "{TOOLCHAIN_VAR_PREFIX}{}",
        name.to_ascii_uppercase().replace('-', "_")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_set_and_get_var() {
        let mut env = Environment::empty(stdenv::current_dir().unwrap());

        // initially absent
        assert_eq!(env.get_var("SOME_RANDOM_ENV_VAR_12345"), None);

        env.set_var("KEY", "VALUE");

        assert_eq!(env.get_var("KEY"), Some("VALUE".to_string()));
    }

    #[test]
    fn test_env_reads_from_process_env() {
        let env = Environment::new();
        assert!(env.get_var("PATH").is_some());
    }

    #[test]
    fn toolchain_names_become_prefixed_variables() {
        assert_eq!(toolchain_var("jdk"), "NKEN_JDK");
        assert_eq!(toolchain_var("android-sdk"), "NKEN_ANDROID_SDK");
    }

    #[test]
    fn toolchain_export_expands_home() {
        let mut env = Environment::empty("/work");
        env.set_var("HOME", "/home/dev");

        let mut toolchain = BTreeMap::new();
        toolchain.insert("android-sdk".to_string(), PathBuf::from("~/Android/Sdk"));
        toolchain.insert("jdk".to_string(), PathBuf::from("/opt/jdk-17"));
        env.export_toolchain(&toolchain);

        assert_eq!(
            env.get_var("NKEN_ANDROID_SDK"),
            Some(PathBuf::from("/home/dev/Android/Sdk").to_string_lossy().into_owned())
        );
        assert_eq!(env.get_var("NKEN_JDK"), Some("/opt/jdk-17".to_string()));
    }
}
